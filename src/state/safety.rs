/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Predicates that decide whether a replica may vote for a proposal.
//!
//! # Voting rule
//!
//! A replica votes for a proposal only if [`is_node_safe`] returns `true`, which is the case when all of
//! the following hold:
//! 1. **Final-on-QC**: the proposal's `final_on_qc` equals the proposal that the chain it extends
//!    implies will become final once it reaches quorum ([`implied_final_on_qc`]).
//! 2. **Monotony**: the proposal is higher than the last proposal this replica voted for.
//! 3. Either **safety** or **liveness**:
//!    - Safety: the proposal [`extends`] the proposal this replica is locked on.
//!    - Liveness: the proposal's justify is higher than the proposal this replica is locked on. This
//!      lets a replica that is locked on a stale fork rejoin the chain that the quorum moved on to.
//!
//! A replica that is not locked on anything (the chain just started) passes both safety and liveness.

use crate::hotstuff::messages::Proposal;
use crate::types::data_types::ProposalId;

use super::{proposal_store::ProposalStore, ChainState, ChainStateError};

/// Returns whether `proposal` satisfies the voting rule given `state`. `proposal` must already be in the
/// proposal store.
///
/// Fails if the locked proposal, or the proposal certified by `proposal.justify`, is not in the store.
pub fn is_node_safe(state: &ChainState, proposal: &Proposal) -> Result<bool, ChainStateError> {
    let store = &state.proposals;
    let justify_id = proposal.justify_id();

    let final_on_qc_check = (justify_id.is_none() && state.b_lock.is_none())
        || implied_final_on_qc(store, proposal.parent_id.as_ref(), justify_id.as_ref())
            == proposal.final_on_qc;

    let monotony_check = state
        .v_height
        .map_or(true, |v_height| proposal.height() > v_height);

    let (safety_check, liveness_check) = match &state.b_lock {
        Some(b_lock) => {
            let safety_check = extends(store, &proposal.proposal_id, b_lock);

            let b_lock_height = state.expect_proposal(b_lock)?.height();
            let liveness_check = match &justify_id {
                Some(justify_id) => state.expect_proposal(justify_id)?.height() > b_lock_height,
                None => false,
            };

            (safety_check, liveness_check)
        }
        None => (true, true),
    };

    let node_is_safe = final_on_qc_check && monotony_check && (liveness_check || safety_check);
    if !node_is_safe {
        log::debug!(
            "Proposal {} is not safe. final_on_qc: {}, monotony: {}, liveness: {}, safety: {}",
            proposal.proposal_id,
            final_on_qc_check,
            monotony_check,
            liveness_check,
            safety_check
        );
    }

    Ok(node_is_safe)
}

/// Returns whether `ancestor` can be reached from `descendant` by following `parent_id` links. A
/// proposal does not extend itself.
///
/// Returns `false` if the walk runs into a proposal that is not in `store`, or into a parent that is not
/// strictly lower than its child, before reaching `ancestor`.
pub fn extends(store: &ProposalStore, descendant: &ProposalId, ancestor: &ProposalId) -> bool {
    let mut cursor = store.get(descendant);
    while let Some(proposal) = cursor {
        cursor = match store.find_by_id(proposal.parent_id.as_ref()) {
            Some(parent) if parent.height() < proposal.height() => Some(parent),
            Some(parent) => {
                log::warn!(
                    "Parent {} of proposal {} is not lower than its child.",
                    parent.proposal_id,
                    proposal.proposal_id
                );
                None
            }
            None => None,
        };
        if cursor.is_some_and(|parent| parent.proposal_id == *ancestor) {
            return true;
        }
    }

    log::debug!("Could not find {} descending from {}.", descendant, ancestor);
    false
}

/// Compute the `final_on_qc` that a proposal with the given parent and justify must carry.
///
/// Let `b2` be the proposal certified by `justify_id` and `b1` the proposal certified by `b2`'s justify.
/// If the proposal directly extends `b2` and `b2` directly extends `b1`, then `b1` becomes final once the
/// proposal reaches quorum. Otherwise the proposal inherits the `final_on_qc` of `b1`'s parent.
///
/// Returns `None` if the justify chain is shorter than two, or if `b1`'s parent is not in `store`.
pub fn implied_final_on_qc(
    store: &ProposalStore,
    parent_id: Option<&ProposalId>,
    justify_id: Option<&ProposalId>,
) -> Option<ProposalId> {
    let chain = store.qc_chain(justify_id?, 2);
    let [b2, b1] = chain.as_slice() else {
        return None;
    };

    if parent_id == Some(&b2.proposal_id) && b2.parent_id == Some(b1.proposal_id) {
        Some(b1.proposal_id)
    } else {
        match store.find_by_id(b1.parent_id.as_ref()) {
            Some(p) => p.final_on_qc,
            None => {
                log::debug!("Expected proposal {:?} not found while computing final_on_qc.", b1.parent_id);
                None
            }
        }
    }
}
