/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of types specific to the HotStuff protocol.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    crypto_primitives::AggregateSignature,
    data_types::{ProposalId, SignatureBytes},
    finalizers::FinalizerBitset,
};

/// Aggregate signature plus voter set proving that a quorum of finalizers endorsed a specific proposal.
///
/// ## Quorum latch
///
/// `quorum_met` starts out `false` and flips to `true` once the certificate has been verified to carry
/// a quorum. It never flips back. The latch is local knowledge: it is skipped when a certificate is
/// serialized, so a certificate received from a peer over the wire is always verified before it is
/// trusted.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct QuorumCertificate {
    /// The proposal this certificate certifies.
    pub proposal_id: ProposalId,

    /// Positions, in the finalizer schedule, of the finalizers whose signatures are included.
    pub active_finalizers: FinalizerBitset,

    /// Aggregate of the signatures of the finalizers listed in `active_finalizers`.
    pub active_agg_sig: AggregateSignature,

    #[borsh_skip]
    pub(crate) quorum_met: bool,
}

impl QuorumCertificate {
    /// Create an empty certificate for `proposal_id` that no finalizer has contributed to yet.
    pub fn new(proposal_id: ProposalId) -> Self {
        Self {
            proposal_id,
            active_finalizers: FinalizerBitset::new(),
            active_agg_sig: AggregateSignature::new(),
            quorum_met: false,
        }
    }

    /// Whether this certificate is already known to carry a quorum.
    pub fn quorum_met(&self) -> bool {
        self.quorum_met
    }

    /// Add the `signature` of the finalizer at `pos` in the schedule to this certificate.
    ///
    /// Returns `false` and leaves the certificate unchanged if that finalizer has already contributed.
    pub fn aggregate(&mut self, pos: usize, signature: SignatureBytes) -> bool {
        if self.active_finalizers.is_set(pos) {
            return false;
        }

        let rank = self.active_finalizers.rank(pos);
        self.active_agg_sig.aggregate(rank, signature);
        self.active_finalizers.set(pos);
        true
    }
}
