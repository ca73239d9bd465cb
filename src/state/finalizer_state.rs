/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Point-in-time snapshot of everything a round driver knows.
//!
//! A [`FinalizerState`] can be taken from a running replica with
//! [`QcChainHandle::state`](crate::replica::QcChainHandle::state), serialized with Borsh, and handed
//! back to a new replica as its initial state through
//! [`ReplicaSpec::initial_state`](crate::replica::ReplicaSpec).

use std::sync::mpsc::Sender;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::events::Event;
use crate::hotstuff::{messages::Proposal, types::QuorumCertificate};
use crate::types::data_types::{BlockId, ProposalHeight, ProposalId};

use super::{proposal_store::ProposalStore, ChainState};

#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FinalizerState {
    pub chained_mode: bool,
    pub b_leaf: Option<ProposalId>,
    pub b_lock: Option<ProposalId>,
    pub b_exec: Option<ProposalId>,
    pub b_finality_violation: Option<ProposalId>,
    pub block_exec: Option<BlockId>,
    pub pending_proposal_block: Option<BlockId>,
    pub v_height: Option<ProposalHeight>,
    pub high_qc: Option<QuorumCertificate>,
    pub current_qc: Option<QuorumCertificate>,
    /// Every stored proposal, lowest height first.
    pub proposals: Vec<Proposal>,
}

impl FinalizerState {
    pub fn get_proposal(&self, proposal_id: &ProposalId) -> Option<&Proposal> {
        self.proposals.iter().find(|p| p.proposal_id == *proposal_id)
    }
}

impl ChainState {
    pub(crate) fn snapshot(
        &self,
        chained_mode: bool,
        pending_proposal_block: Option<BlockId>,
        current_qc: Option<QuorumCertificate>,
    ) -> FinalizerState {
        FinalizerState {
            chained_mode,
            b_leaf: self.b_leaf,
            b_lock: self.b_lock,
            b_exec: self.b_exec,
            b_finality_violation: self.b_finality_violation,
            block_exec: self.block_exec,
            pending_proposal_block,
            v_height: self.v_height,
            high_qc: self.high_qc.clone(),
            current_qc,
            proposals: self.proposals.iter_by_height().cloned().collect(),
        }
    }

    /// Rebuild a chain state from `state`. No events are published for the restored proposals.
    ///
    /// A high QC is only ever stored after it has been verified, so its quorum latch is set again on
    /// restore.
    pub(crate) fn from_snapshot(state: &FinalizerState, event_publisher: Option<Sender<Event>>) -> Self {
        let high_qc = state.high_qc.clone().map(|mut qc| {
            qc.quorum_met = true;
            qc
        });

        Self {
            proposals: ProposalStore::from_proposals(state.proposals.iter().cloned()),
            high_qc,
            b_leaf: state.b_leaf,
            b_lock: state.b_lock,
            b_exec: state.b_exec,
            b_finality_violation: state.b_finality_violation,
            block_exec: state.block_exec,
            v_height: state.v_height,
            event_publisher,
        }
    }
}
