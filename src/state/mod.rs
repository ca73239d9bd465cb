/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The state a round driver keeps track of to make and verify progress along the chain of proposals.
//!
//! ## State variables
//!
//! [`ChainState`] structures its state into separate 'variables':
//! - **Proposals** ([`ProposalStore`]): every proposal that has been accepted and not yet garbage
//!   collected.
//! - **High QC**: the quorum certificate with the greatest proposal height that this replica has seen and
//!   verified.
//! - **Leaf** (`b_leaf`): the proposal that the next proposal built by this replica will extend.
//! - **Lock** (`b_lock`): the proposal this replica is locked on. A replica only votes for proposals that
//!   extend its lock, or whose justify is higher than its lock.
//! - **Exec** (`b_exec`, `block_exec`): the last committed proposal, and its block.
//! - **Finality violation** (`b_finality_violation`): set if a decided 3-chain ever conflicted with an
//!   already executed proposal.
//! - **Voted height** (`v_height`): the height of the last proposal this replica voted for.
//!
//! The rules that decide how these variables change live in [`safety`] (whether to vote) and in
//! [`commit`] (what to lock, commit, and prune).

use std::fmt::{self, Display, Formatter};
use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::events::*;
use crate::hotstuff::{messages::Proposal, types::QuorumCertificate};
use crate::types::data_types::{BlockId, ProposalHeight, ProposalId};

pub mod commit;

pub mod finalizer_state;

pub mod proposal_store;

pub mod safety;

use proposal_store::ProposalStore;

pub struct ChainState {
    pub(crate) proposals: ProposalStore,
    pub(crate) high_qc: Option<QuorumCertificate>,
    pub(crate) b_leaf: Option<ProposalId>,
    pub(crate) b_lock: Option<ProposalId>,
    pub(crate) b_exec: Option<ProposalId>,
    pub(crate) b_finality_violation: Option<ProposalId>,
    pub(crate) block_exec: Option<BlockId>,
    pub(crate) v_height: Option<ProposalHeight>,
    pub(crate) event_publisher: Option<Sender<Event>>,
}

impl ChainState {
    /// Create an empty chain state: no proposals, and every cursor unset.
    pub fn new(event_publisher: Option<Sender<Event>>) -> Self {
        Self {
            proposals: ProposalStore::new(),
            high_qc: None,
            b_leaf: None,
            b_lock: None,
            b_exec: None,
            b_finality_violation: None,
            block_exec: None,
            v_height: None,
            event_publisher,
        }
    }

    pub fn proposals(&self) -> &ProposalStore {
        &self.proposals
    }

    pub fn get_proposal(&self, proposal_id: &ProposalId) -> Option<&Proposal> {
        self.proposals.get(proposal_id)
    }

    /// Get the stored proposal identified by `proposal_id`, or fail if it is not in the store.
    pub(crate) fn expect_proposal(&self, proposal_id: &ProposalId) -> Result<&Proposal, ChainStateError> {
        self.proposals
            .get(proposal_id)
            .ok_or(ChainStateError::ProposalExpectedButNotFound {
                proposal: *proposal_id,
            })
    }

    /// Get the height of the stored proposal identified by `proposal_id`, where an absent id has no
    /// height. Fails if the id is present but the proposal is not in the store.
    pub(crate) fn height_of(&self, proposal_id: Option<&ProposalId>) -> Result<Option<ProposalHeight>, ChainStateError> {
        proposal_id
            .map(|id| self.expect_proposal(id).map(|p| p.height()))
            .transpose()
    }

    /// Store `proposal` and publish an [`InsertProposalEvent`]. Returns `false` if the proposal was
    /// already stored.
    pub(crate) fn insert_proposal(&mut self, proposal: &Proposal) -> bool {
        if !self.proposals.insert(proposal.clone()) {
            return false;
        }

        Event::publish(
            &self.event_publisher,
            Event::InsertProposal(InsertProposalEvent {
                timestamp: SystemTime::now(),
                proposal: proposal.clone(),
            }),
        );
        true
    }

    /// Prune every proposal at or below `cutoff`, publishing a [`PruneProposalEvent`] for each.
    pub(crate) fn garbage_collect(&mut self, cutoff: ProposalHeight) {
        for proposal in self.proposals.garbage_collect(cutoff) {
            Event::publish(
                &self.event_publisher,
                Event::PruneProposal(PruneProposalEvent {
                    timestamp: SystemTime::now(),
                    proposal: proposal.proposal_id,
                    height: proposal.height(),
                }),
            );
        }
    }

    pub fn high_qc(&self) -> Option<&QuorumCertificate> {
        self.high_qc.as_ref()
    }

    pub fn b_leaf(&self) -> Option<ProposalId> {
        self.b_leaf
    }

    pub fn b_lock(&self) -> Option<ProposalId> {
        self.b_lock
    }

    pub fn b_exec(&self) -> Option<ProposalId> {
        self.b_exec
    }

    pub fn b_finality_violation(&self) -> Option<ProposalId> {
        self.b_finality_violation
    }

    pub fn block_exec(&self) -> Option<BlockId> {
        self.block_exec
    }

    pub fn v_height(&self) -> Option<ProposalHeight> {
        self.v_height
    }
}

/// Error when reading or updating the chain state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStateError {
    /// A cursor or a justify refers to a proposal that is not in the proposal store.
    ProposalExpectedButNotFound { proposal: ProposalId },
}

impl Display for ChainStateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChainStateError::ProposalExpectedButNotFound { proposal } => {
                write!(f, "expected proposal {} not found in the proposal store", proposal)
            }
        }
    }
}

impl std::error::Error for ChainStateError {}
