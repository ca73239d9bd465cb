/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of events published by the round driver for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Handlers for each kind of
//! event are registered on the [`ReplicaSpec`](crate::replica::ReplicaSpec), and run on a dedicated
//! event bus thread, so a slow handler never holds up consensus.

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::hotstuff::{
    messages::{NewBlock, NewView, Proposal, Vote},
    types::QuorumCertificate,
};
use crate::types::{
    crypto_primitives::VerifyingKey,
    data_types::{BlockId, ProposalHeight, ProposalId},
};

pub enum Event {
    // Events that change the proposal store or the cursors.
    InsertProposal(InsertProposalEvent),
    CommitProposal(CommitProposalEvent),
    PruneProposal(PruneProposalEvent),
    UpdateHighQC(UpdateHighQCEvent),
    UpdateLock(UpdateLockEvent),
    UpdateExec(UpdateExecEvent),
    FinalityViolation(FinalityViolationEvent),
    Equivocation(EquivocationEvent),
    // Events that involve sending a message.
    Propose(ProposeEvent),
    Vote(VoteEvent),
    NewView(NewViewEvent),
    NewBlock(NewBlockEvent),
    // Events that involve receiving a message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveVote(ReceiveVoteEvent),
    ReceiveNewView(ReceiveNewViewEvent),
    ReceiveNewBlock(ReceiveNewBlockEvent),
    // Round progress events.
    CollectQC(CollectQCEvent),
    RotateLeader(RotateLeaderEvent),
}

impl Event {
    /// Send `event` to the event bus, if there is one. Publishing after the event bus has shut down is a
    /// no-op.
    pub(crate) fn publish(event_publisher: &Option<Sender<Event>>, event: Event) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(event);
        }
    }
}

/// A proposal was stored in the proposal store.
pub struct InsertProposalEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

/// A proposal became irreversible. Commit events are published in height order without gaps.
pub struct CommitProposalEvent {
    pub timestamp: SystemTime,
    pub proposal: ProposalId,
    pub block: BlockId,
    pub height: ProposalHeight,
}

pub struct PruneProposalEvent {
    pub timestamp: SystemTime,
    pub proposal: ProposalId,
    pub height: ProposalHeight,
}

pub struct UpdateHighQCEvent {
    pub timestamp: SystemTime,
    pub high_qc: QuorumCertificate,
}

pub struct UpdateLockEvent {
    pub timestamp: SystemTime,
    pub b_lock: ProposalId,
}

pub struct UpdateExecEvent {
    pub timestamp: SystemTime,
    pub b_exec: ProposalId,
    pub block: BlockId,
}

/// A decided 3-chain conflicts with a proposal that was already executed.
pub struct FinalityViolationEvent {
    pub timestamp: SystemTime,
    pub proposal: ProposalId,
    pub b_exec: ProposalId,
}

/// A second, distinct proposal was received at a height that already had one.
pub struct EquivocationEvent {
    pub timestamp: SystemTime,
    pub height: ProposalHeight,
    pub existing: ProposalId,
    pub proposal: ProposalId,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

pub struct VoteEvent {
    pub timestamp: SystemTime,
    pub vote: Vote,
}

pub struct NewViewEvent {
    pub timestamp: SystemTime,
    pub new_view: NewView,
}

pub struct NewBlockEvent {
    pub timestamp: SystemTime,
    pub new_block: NewBlock,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

pub struct ReceiveVoteEvent {
    pub timestamp: SystemTime,
    pub vote: Vote,
}

pub struct ReceiveNewViewEvent {
    pub timestamp: SystemTime,
    pub new_view: NewView,
}

pub struct ReceiveNewBlockEvent {
    pub timestamp: SystemTime,
    pub new_block: NewBlock,
}

/// The leader collected a quorum certificate for its in-flight proposal.
pub struct CollectQCEvent {
    pub timestamp: SystemTime,
    pub quorum_certificate: QuorumCertificate,
}

pub struct RotateLeaderEvent {
    pub timestamp: SystemTime,
    pub leader: VerifyingKey,
    pub next_leader: VerifyingKey,
}
