/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! State updates that follow from accepting a proposal: advancing the high QC, the lock, and the
//! executed proposal, and committing and pruning proposals.
//!
//! # Three-chain commit rule
//!
//! Let `b2` be the proposal certified by an accepted proposal's justify, `b1` the proposal certified by
//! `b2`'s justify, and `b` the proposal certified by `b1`'s justify. Then:
//! - Once `b1` is known, the replica locks on `b1` if it is higher than the current lock.
//! - Once `b` is known and `b2 -> b1 -> b` is a chain of direct parents, `b` and every uncommitted
//!   ancestor of `b` are committed, lowest first, and every proposal below `b` is pruned.

use std::time::SystemTime;

use crate::events::*;
use crate::hotstuff::{
    messages::Proposal,
    quorum::{is_quorum_met, Schedule},
    types::QuorumCertificate,
};

use super::{ChainState, ChainStateError};

impl ChainState {
    /// Advance the high QC, the lock, and the executed proposal after accepting `proposal`.
    ///
    /// Fails if a cursor refers to a proposal that is not in the store.
    pub(crate) fn update(&mut self, proposal: &Proposal, schedule: &Schedule) -> Result<(), ChainStateError> {
        let Some(justify) = &proposal.justify else {
            log::debug!("Proposal {} has no justify.", proposal.proposal_id);
            return Ok(());
        };

        let b_lock_height = self.height_of(self.b_lock.as_ref())?;

        self.update_high_qc(justify, schedule);

        let chain: Vec<Proposal> = self
            .proposals
            .qc_chain(&justify.proposal_id, 3)
            .into_iter()
            .cloned()
            .collect();

        let [b2, b1, rest @ ..] = chain.as_slice() else {
            return Ok(());
        };

        if b_lock_height.map_or(true, |b_lock_height| b1.height() > b_lock_height) {
            self.b_lock = Some(b1.proposal_id);
            Event::publish(
                &self.event_publisher,
                Event::UpdateLock(UpdateLockEvent {
                    timestamp: SystemTime::now(),
                    b_lock: b1.proposal_id,
                }),
            );
        }

        let [b] = rest else {
            return Ok(());
        };

        if b2.parent_id != Some(b1.proposal_id) || b1.parent_id != Some(b.proposal_id) {
            log::warn!(
                "Could not verify direct parent relationship between {}, {}, and {}.",
                b2.proposal_id,
                b1.proposal_id,
                b.proposal_id
            );
            return Ok(());
        }

        if self.b_exec == Some(b.proposal_id) {
            return Ok(());
        }

        if let Some(b_exec_height) = self.height_of(self.b_exec.as_ref())? {
            if b_exec_height >= b.height() {
                log::error!(
                    "Finality violation detected at height {}. Proposal {} conflicts with {:?}.",
                    b.height(),
                    b.proposal_id,
                    self.b_exec
                );
                self.b_finality_violation = Some(b.proposal_id);
                if let Some(b_exec) = self.b_exec {
                    Event::publish(
                        &self.event_publisher,
                        Event::FinalityViolation(FinalityViolationEvent {
                            timestamp: SystemTime::now(),
                            proposal: b.proposal_id,
                            b_exec,
                        }),
                    );
                }
                return Ok(());
            }
        }

        self.commit(b)?;

        self.b_exec = Some(b.proposal_id);
        self.block_exec = Some(b.block_id);
        Event::publish(
            &self.event_publisher,
            Event::UpdateExec(UpdateExecEvent {
                timestamp: SystemTime::now(),
                b_exec: b.proposal_id,
                block: b.block_id,
            }),
        );

        let cutoff = b.height().prev();
        if cutoff < b.height() {
            self.garbage_collect(cutoff);
        }

        Ok(())
    }

    /// Replace the high QC with `qc` if `qc` certifies a stored proposal that is higher than the one the
    /// current high QC certifies, and `qc` carries a quorum under `schedule`.
    ///
    /// On success, also moves the leaf to the certified proposal. Returns whether the high QC changed.
    pub(crate) fn update_high_qc(&mut self, qc: &QuorumCertificate, schedule: &Schedule) -> bool {
        let Some(new_proposal) = self.proposals.get(&qc.proposal_id) else {
            log::debug!("Certificate for unknown proposal {} ignored.", qc.proposal_id);
            return false;
        };

        if let Some(high_qc) = &self.high_qc {
            if high_qc.proposal_id == qc.proposal_id {
                return false;
            }
            let Some(old_proposal) = self.proposals.get(&high_qc.proposal_id) else {
                log::warn!("High QC proposal {} is missing from the store.", high_qc.proposal_id);
                return false;
            };
            if new_proposal.height() <= old_proposal.height() {
                return false;
            }
        }

        if !is_quorum_met(qc, schedule, new_proposal) {
            log::debug!("Certificate for {} does not carry a quorum.", qc.proposal_id);
            return false;
        }

        let mut high_qc = qc.clone();
        high_qc.quorum_met = true;
        self.b_leaf = Some(high_qc.proposal_id);
        self.high_qc = Some(high_qc.clone());

        Event::publish(
            &self.event_publisher,
            Event::UpdateHighQC(UpdateHighQCEvent {
                timestamp: SystemTime::now(),
                high_qc,
            }),
        );
        true
    }

    /// Commit `proposal` and every ancestor of it that is higher than the executed proposal, lowest
    /// first, publishing a [`CommitProposalEvent`] for each.
    ///
    /// Committing a proposal that is not higher than the executed proposal does nothing.
    pub(crate) fn commit(&mut self, proposal: &Proposal) -> Result<(), ChainStateError> {
        let b_exec_height = self.height_of(self.b_exec.as_ref())?;

        let mut to_commit = Vec::new();
        let mut cursor = Some(proposal);
        while let Some(p) = cursor {
            if b_exec_height.is_some_and(|b_exec_height| p.height() <= b_exec_height) {
                break;
            }
            to_commit.push((p.proposal_id, p.block_id, p.height()));
            cursor = self
                .proposals
                .find_by_id(p.parent_id.as_ref())
                .filter(|parent| parent.height() < p.height());
        }

        if to_commit.is_empty() {
            log::debug!("Proposal {} is already committed.", proposal.proposal_id);
            return Ok(());
        }

        for (proposal, block, height) in to_commit.into_iter().rev() {
            log::debug!("Committing proposal {} at height {}.", proposal, height);
            Event::publish(
                &self.event_publisher,
                Event::CommitProposal(CommitProposalEvent {
                    timestamp: SystemTime::now(),
                    proposal,
                    block,
                    height,
                }),
            );
        }

        Ok(())
    }
}
