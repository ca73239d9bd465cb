/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via replica's
//! [config](crate::replica::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
//! printed onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least two values. The first two values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveProposal](crate::events::ReceiveProposalEvent) is printed:
//!
//! ```text
//! ReceiveProposal, 1701329264, fNGCJyk, 7.2, tTmU4YM
//! ```
//!
//! In the snippet:
//! - The third value is the first seven characters of the Base64 encoding of the proposal's id.
//! - The fourth value is the height of the proposal, as `block_num.phase_counter`.
//! - The fifth value is the first seven characters of the Base64 encoding of the proposed block's id.

use std::time::SystemTime;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};

use crate::events::*;
use crate::hotstuff::types::QuorumCertificate;

// Names of each event in PascalCase for printing:
pub const INSERT_PROPOSAL: &str = "InsertProposal";
pub const COMMIT_PROPOSAL: &str = "CommitProposal";
pub const PRUNE_PROPOSAL: &str = "PruneProposal";
pub const UPDATE_HIGH_QC: &str = "UpdateHighQC";
pub const UPDATE_LOCK: &str = "UpdateLock";
pub const UPDATE_EXEC: &str = "UpdateExec";
pub const FINALITY_VIOLATION: &str = "FinalityViolation";
pub const EQUIVOCATION: &str = "Equivocation";

pub const PROPOSE: &str = "Propose";
pub const VOTE: &str = "Vote";
pub const NEW_VIEW: &str = "NewView";
pub const NEW_BLOCK: &str = "NewBlock";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_VOTE: &str = "ReceiveVote";
pub const RECEIVE_NEW_VIEW: &str = "ReceiveNewView";
pub const RECEIVE_NEW_BLOCK: &str = "ReceiveNewBlock";

pub const COLLECT_QC: &str = "CollectQC";
pub const ROTATE_LEADER: &str = "RotateLeader";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type.
    fn get_logger() -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |insert_proposal_event: &InsertProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                INSERT_PROPOSAL,
                secs_since_unix_epoch(insert_proposal_event.timestamp),
                first_seven_base64_chars(&insert_proposal_event.proposal.proposal_id.bytes()),
                insert_proposal_event.proposal.height(),
                first_seven_base64_chars(&insert_proposal_event.proposal.block_id.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |commit_proposal_event: &CommitProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                COMMIT_PROPOSAL,
                secs_since_unix_epoch(commit_proposal_event.timestamp),
                first_seven_base64_chars(&commit_proposal_event.proposal.bytes()),
                commit_proposal_event.height,
                first_seven_base64_chars(&commit_proposal_event.block.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for PruneProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |prune_proposal_event: &PruneProposalEvent| {
            log::info!(
                "{}, {}, {}, {}",
                PRUNE_PROPOSAL,
                secs_since_unix_epoch(prune_proposal_event.timestamp),
                first_seven_base64_chars(&prune_proposal_event.proposal.bytes()),
                prune_proposal_event.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateHighQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_high_qc_event: &UpdateHighQCEvent| {
            log::info!(
                "{}, {}, {}",
                UPDATE_HIGH_QC,
                secs_since_unix_epoch(update_high_qc_event.timestamp),
                qc_info(&update_high_qc_event.high_qc)
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateLockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_lock_event: &UpdateLockEvent| {
            log::info!(
                "{}, {}, {}",
                UPDATE_LOCK,
                secs_since_unix_epoch(update_lock_event.timestamp),
                first_seven_base64_chars(&update_lock_event.b_lock.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateExecEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |update_exec_event: &UpdateExecEvent| {
            log::info!(
                "{}, {}, {}, {}",
                UPDATE_EXEC,
                secs_since_unix_epoch(update_exec_event.timestamp),
                first_seven_base64_chars(&update_exec_event.b_exec.bytes()),
                first_seven_base64_chars(&update_exec_event.block.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for FinalityViolationEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |finality_violation_event: &FinalityViolationEvent| {
            log::error!(
                "{}, {}, {}, {}",
                FINALITY_VIOLATION,
                secs_since_unix_epoch(finality_violation_event.timestamp),
                first_seven_base64_chars(&finality_violation_event.proposal.bytes()),
                first_seven_base64_chars(&finality_violation_event.b_exec.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for EquivocationEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |equivocation_event: &EquivocationEvent| {
            log::warn!(
                "{}, {}, {}, {}, {}",
                EQUIVOCATION,
                secs_since_unix_epoch(equivocation_event.timestamp),
                equivocation_event.height,
                first_seven_base64_chars(&equivocation_event.existing.bytes()),
                first_seven_base64_chars(&equivocation_event.proposal.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                first_seven_base64_chars(&propose_event.proposal.proposal_id.bytes()),
                propose_event.proposal.height(),
                first_seven_base64_chars(&propose_event.proposal.block_id.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for VoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |vote_event: &VoteEvent| {
            log::info!(
                "{}, {}, {}, {}",
                VOTE,
                secs_since_unix_epoch(vote_event.timestamp),
                first_seven_base64_chars(&vote_event.vote.finalizer),
                first_seven_base64_chars(&vote_event.vote.proposal_id.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for NewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |new_view_event: &NewViewEvent| {
            log::info!(
                "{}, {}, {}",
                NEW_VIEW,
                secs_since_unix_epoch(new_view_event.timestamp),
                optional_qc_info(new_view_event.new_view.high_qc.as_ref())
            )
        };
        Box::new(logger)
    }
}

impl Logger for NewBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |new_block_event: &NewBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                NEW_BLOCK,
                secs_since_unix_epoch(new_block_event.timestamp),
                first_seven_base64_chars(&new_block_event.new_block.block_id.bytes()),
                new_block_event.new_block.block_id.block_num()
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                first_seven_base64_chars(&receive_proposal_event.proposal.proposal_id.bytes()),
                receive_proposal_event.proposal.height(),
                first_seven_base64_chars(&receive_proposal_event.proposal.block_id.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveVoteEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_vote_event: &ReceiveVoteEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_VOTE,
                secs_since_unix_epoch(receive_vote_event.timestamp),
                first_seven_base64_chars(&receive_vote_event.vote.finalizer),
                first_seven_base64_chars(&receive_vote_event.vote.proposal_id.bytes())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveNewViewEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_new_view_event: &ReceiveNewViewEvent| {
            log::info!(
                "{}, {}, {}",
                RECEIVE_NEW_VIEW,
                secs_since_unix_epoch(receive_new_view_event.timestamp),
                optional_qc_info(receive_new_view_event.new_view.high_qc.as_ref())
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveNewBlockEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |receive_new_block_event: &ReceiveNewBlockEvent| {
            log::info!(
                "{}, {}, {}, {}",
                RECEIVE_NEW_BLOCK,
                secs_since_unix_epoch(receive_new_block_event.timestamp),
                first_seven_base64_chars(&receive_new_block_event.new_block.block_id.bytes()),
                receive_new_block_event.new_block.block_id.block_num()
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectQCEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |collect_qc_event: &CollectQCEvent| {
            log::info!(
                "{}, {}, {}",
                COLLECT_QC,
                secs_since_unix_epoch(collect_qc_event.timestamp),
                qc_info(&collect_qc_event.quorum_certificate)
            )
        };
        Box::new(logger)
    }
}

impl Logger for RotateLeaderEvent {
    fn get_logger() -> Box<dyn Fn(&Self) + Send> {
        let logger = |rotate_leader_event: &RotateLeaderEvent| {
            log::info!(
                "{}, {}, {}, {}",
                ROTATE_LEADER,
                secs_since_unix_epoch(rotate_leader_event.timestamp),
                first_seven_base64_chars(&rotate_leader_event.leader.to_bytes()),
                first_seven_base64_chars(&rotate_leader_event.next_leader.to_bytes())
            )
        };
        Box::new(logger)
    }
}

fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

fn qc_info(qc: &QuorumCertificate) -> String {
    format!(
        "{}, no. of signatures: {}",
        first_seven_base64_chars(&qc.proposal_id.bytes()),
        qc.active_agg_sig.len()
    )
}

fn optional_qc_info(qc: Option<&QuorumCertificate>) -> String {
    match qc {
        Some(qc) => qc_info(qc),
        None => String::from("None"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_inputs_are_not_truncated() {
        assert_eq!(first_seven_base64_chars(&[0xff]), "/w");
        assert_eq!(first_seven_base64_chars(&[0u8; 32]), "AAAAAAA");
    }
}
