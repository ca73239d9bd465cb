/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that decide whether a quorum certificate proves that a weighted quorum of finalizers
//! endorsed a proposal.
//!
//! Both functions are pure: they read a [`Schedule`] snapshot taken from the pacemaker and never
//! mutate the certificate they are given. Callers latch the result into
//! [`QuorumCertificate::quorum_met`](super::types::QuorumCertificate::quorum_met) themselves.

use crate::pacemaker::Pacemaker;
use crate::types::{
    crypto_primitives::{AggregateSignature, AggregateVerifyingKey},
    data_types::TotalPower,
    finalizers::{FinalizerBitset, FinalizerSet},
};

use super::{messages::Proposal, types::QuorumCertificate};

/// The finalizer schedule and quorum threshold in force at the time of a call.
#[derive(Clone, Debug, PartialEq)]
pub struct Schedule {
    pub finalizers: FinalizerSet,
    pub quorum_threshold: TotalPower,
}

impl Schedule {
    pub fn new(finalizers: FinalizerSet, quorum_threshold: TotalPower) -> Self {
        Self {
            finalizers,
            quorum_threshold,
        }
    }

    /// Query the current schedule from `pacemaker`.
    pub fn from_pacemaker<P: Pacemaker>(pacemaker: &P) -> Self {
        Self::new(pacemaker.get_finalizers(), pacemaker.get_quorum_threshold())
    }
}

/// Returns whether `agg_sig` proves that the finalizers listed in `finalizers` form a quorum under
/// `schedule` and all signed `proposal`.
///
/// ## Conditional checks
///
/// `evaluate_quorum` returns `true` in case all of the following predicates are `true`:
/// 1. Every position set in `finalizers` refers to a finalizer in the schedule.
/// 2. The summed power of the listed finalizers is at least the schedule's quorum threshold.
/// 3. `agg_sig` verifies, over the digest recomputed from `proposal`'s content, under the aggregate of
///    the listed finalizers' keys in schedule order.
///
/// No signature is checked unless 1 and 2 hold.
pub fn evaluate_quorum(
    schedule: &Schedule,
    finalizers: &FinalizerBitset,
    agg_sig: &AggregateSignature,
    proposal: &Proposal,
) -> bool {
    let mut power = TotalPower::new(0);
    let mut keys = Vec::with_capacity(finalizers.count());
    for pos in finalizers.positions() {
        /* 1 */
        let Some(finalizer) = schedule.finalizers.get(pos) else {
            log::debug!("Quorum certificate lists position {} outside of a schedule of {} finalizers.", pos, schedule.finalizers.len());
            return false;
        };
        if let Some(finalizer_power) = schedule.finalizers.power(finalizer) {
            power += finalizer_power;
        }
        keys.push(*finalizer);
    }

    /* 2 */
    if power < schedule.quorum_threshold {
        return false;
    }

    /* 3 */
    let digest = Proposal::digest(
        &proposal.block_id,
        proposal.phase_counter,
        proposal.final_on_qc.as_ref(),
    );
    AggregateVerifyingKey::aggregate(keys).verify(&digest.bytes(), agg_sig)
}

/// Memoizing wrapper around [`evaluate_quorum`]: a certificate whose latch is already set is trusted
/// without verifying it again.
pub fn is_quorum_met(qc: &QuorumCertificate, schedule: &Schedule, proposal: &Proposal) -> bool {
    qc.quorum_met || evaluate_quorum(schedule, &qc.active_finalizers, &qc.active_agg_sig, proposal)
}
