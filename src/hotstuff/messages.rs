/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between replicas as part of the chained HotStuff
//! protocol.
//!
//! The byte-level format of these messages is Borsh. The transport that carries them is the
//! [`Pacemaker`](crate::pacemaker::Pacemaker)'s concern.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    crypto_primitives::{verify_signature, CryptoHasher, Digest, Keypair, VerifyingKey},
    data_types::*,
};

use super::types::QuorumCertificate;

/// Any of the four messages exchanged by round drivers.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum HotStuffMessage {
    Proposal(Proposal),
    Vote(Vote),
    NewView(NewView),
    NewBlock(NewBlock),
}

/// The unit of agreement: a block candidate at a particular phase.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub proposal_id: ProposalId,
    pub block_id: BlockId,
    /// The chain tip this proposal was built on. `None` for the first proposal after genesis.
    pub parent_id: Option<ProposalId>,
    pub phase_counter: PhaseCounter,
    /// The certificate that justified creating this proposal. `None` for the first proposal after
    /// genesis or after an activation boundary.
    pub justify: Option<QuorumCertificate>,
    /// The proposal that becomes irreversible once this proposal reaches quorum.
    pub final_on_qc: Option<ProposalId>,
}

impl Proposal {
    /// Create a proposal, deriving its `proposal_id` from its content.
    pub fn new(
        block_id: BlockId,
        parent_id: Option<ProposalId>,
        phase_counter: PhaseCounter,
        justify: Option<QuorumCertificate>,
        final_on_qc: Option<ProposalId>,
    ) -> Self {
        Self {
            proposal_id: Self::digest(&block_id, phase_counter, final_on_qc.as_ref()),
            block_id,
            parent_id,
            phase_counter,
            justify,
            final_on_qc,
        }
    }

    /// Compute the digest that finalizers sign for a proposal with the given content:
    /// `sha256(sha256(block_id ‖ phase_counter) ‖ final_on_qc)`.
    ///
    /// An absent `final_on_qc` contributes 32 zero bytes.
    pub fn digest(
        block_id: &BlockId,
        phase_counter: PhaseCounter,
        final_on_qc: Option<&ProposalId>,
    ) -> ProposalId {
        let mut hasher = CryptoHasher::new();
        hasher.update(block_id.bytes());
        hasher.update([phase_counter.int()]);
        let inner: [u8; 32] = hasher.finalize().into();

        let mut hasher = CryptoHasher::new();
        hasher.update(inner);
        hasher.update(final_on_qc.map(|id| id.bytes()).unwrap_or([0u8; 32]));
        ProposalId::new(CryptoHash::new(hasher.finalize().into()))
    }

    /// Check that `proposal_id` is the digest of this proposal's content.
    pub fn is_correct(&self) -> bool {
        self.proposal_id
            == Self::digest(&self.block_id, self.phase_counter, self.final_on_qc.as_ref())
    }

    pub fn block_num(&self) -> BlockNumber {
        self.block_id.block_num()
    }

    pub fn height(&self) -> ProposalHeight {
        ProposalHeight::new(self.block_num(), self.phase_counter)
    }

    /// The id of the proposal certified by `justify`, if any.
    pub fn justify_id(&self) -> Option<ProposalId> {
        self.justify.as_ref().map(|qc| qc.proposal_id)
    }
}

/// A single finalizer's signature over a proposal's digest.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    pub proposal_id: ProposalId,
    pub finalizer: VerifyingKeyBytes,
    pub signature: SignatureBytes,
}

impl Vote {
    pub(crate) fn new(me: &Keypair, proposal_id: ProposalId) -> Self {
        Self {
            proposal_id,
            finalizer: me.public().to_bytes(),
            signature: me.sign(&proposal_id.bytes()),
        }
    }

    /// Get the verifying key of the finalizer that cast this vote, if `finalizer` holds a valid key.
    pub fn finalizer_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.finalizer).ok()
    }

    /// Check that `signature` is the finalizer's signature over `proposal_id`.
    pub fn is_correct(&self) -> bool {
        match self.finalizer_key() {
            Some(finalizer) => {
                verify_signature(&finalizer, &self.proposal_id.bytes(), &self.signature)
            }
            None => false,
        }
    }
}

/// Carries the sender's high QC to the next leader when leadership rotates.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewView {
    pub high_qc: Option<QuorumCertificate>,
}

/// Announces a block candidate from a proposer that is not the leader, so that the leader can build a
/// proposal on it.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewBlock {
    pub block_id: BlockId,
    pub justify: Option<QuorumCertificate>,
}
