/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.
//!
//! The definitions and re-exports in this module provide three categories of cryptographic primitives:
//! 1. **Cryptographic Hashes**: provided by the [`sha2`] crate.
//! 2. **Digital Signatures**: provided by the [`ed25519_dalek`] crate.
//! 3. **Aggregate Signatures**: [`AggregateSignature`] and [`AggregateVerifyingKey`], built on top of 2.
//!
//! ## Aggregation over Ed25519
//!
//! Ed25519 signatures do not compress into a single group element the way pairing-based signatures
//! do. An `AggregateSignature` is therefore the ordered sequence of the individual signatures it
//! combines, and an `AggregateVerifyingKey` is the ordered sequence of the verifying keys of the
//! signers. Verification pairs the two sequences up position by position, so the order in which keys
//! are combined must be the order in which signatures were combined.

use borsh::{BorshDeserialize, BorshSerialize};

use super::data_types::SignatureBytes;

// re-exports below.
pub use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, SignatureError, Signer, SigningKey, Verifier, VerifyingKey};

/// A facade around [`SigningKey`] that implements method for [`sign`](Self::sign)-ing messages as well
/// as a getter for the [`public`](Self::public) key associated with the signing key.
#[derive(Clone)]
pub(crate) struct Keypair(pub(crate) SigningKey);

impl Keypair {
    /// Create a `Keypair` that wraps over `signing_key`.
    pub(crate) fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign an arbitrary `message` with the `Keypair`.
    pub(crate) fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    /// Get the `VerifyingKey` of this `Keypair`.
    pub(crate) fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }
}

/// Check that `signature` is a valid signature by `signer` over `message`.
pub(crate) fn verify_signature(
    signer: &VerifyingKey,
    message: &[u8],
    signature: &SignatureBytes,
) -> bool {
    signer
        .verify(message, &Signature::from_bytes(&signature.bytes()))
        .is_ok()
}

/// Running combination of the signatures of several signers over the same message.
///
/// The signatures are kept in the order of their signers' positions in the finalizer schedule. See the
/// [module-level docs](self#aggregation-over-ed25519).
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct AggregateSignature(Vec<SignatureBytes>);

impl AggregateSignature {
    /// Create an `AggregateSignature` that combines no signatures yet.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create an `AggregateSignature` that consists of the single `signature`.
    pub fn from_signature(signature: SignatureBytes) -> Self {
        Self(vec![signature])
    }

    /// Combine `signature` into this aggregate, placing it at `rank` among the signatures already combined.
    ///
    /// `rank` is clamped to the number of signatures already combined.
    pub(crate) fn aggregate(&mut self, rank: usize, signature: SignatureBytes) {
        let rank = rank.min(self.0.len());
        self.0.insert(rank, signature);
    }

    /// Get how many signatures this aggregate combines.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this aggregate combines no signatures.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate through the combined signatures in order.
    pub fn iter(&self) -> std::slice::Iter<'_, SignatureBytes> {
        self.0.iter()
    }
}

/// Combination of the verifying keys of several signers, used to verify an [`AggregateSignature`].
pub struct AggregateVerifyingKey(Vec<VerifyingKey>);

impl AggregateVerifyingKey {
    /// Combine `keys` in the order they are yielded.
    pub fn aggregate(keys: impl IntoIterator<Item = VerifyingKey>) -> Self {
        Self(keys.into_iter().collect())
    }

    /// Get how many keys were combined.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Verify `signature` over `message`.
    ///
    /// Returns `false` if the aggregate is empty, if it does not combine exactly as many signatures as
    /// this key combines keys, or if any combined signature does not verify under its key.
    pub fn verify(&self, message: &[u8], signature: &AggregateSignature) -> bool {
        if self.0.is_empty() || self.0.len() != signature.len() {
            return false;
        }

        self.0
            .iter()
            .zip(signature.iter())
            .all(|(key, sig)| verify_signature(key, message, sig))
    }
}

#[cfg(test)]
mod tests {
    use rand_core::OsRng;

    use super::*;

    fn keypairs(n: usize) -> Vec<Keypair> {
        let mut csprg = OsRng {};
        (0..n)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect()
    }

    #[test]
    fn aggregate_verifies_only_in_combination_order() {
        let keypairs = keypairs(3);
        let message = b"proposal digest";

        let mut agg_sig = AggregateSignature::new();
        agg_sig.aggregate(0, keypairs[2].sign(message));
        agg_sig.aggregate(0, keypairs[0].sign(message));
        agg_sig.aggregate(1, keypairs[1].sign(message));

        let in_order = AggregateVerifyingKey::aggregate(keypairs.iter().map(|kp| kp.public()));
        assert!(in_order.verify(message, &agg_sig));

        let reversed = AggregateVerifyingKey::aggregate(keypairs.iter().rev().map(|kp| kp.public()));
        assert!(!reversed.verify(message, &agg_sig));

        assert!(!in_order.verify(b"another digest", &agg_sig));
    }

    #[test]
    fn aggregate_rejects_mismatched_lengths_and_empty_sets() {
        let keypairs = keypairs(2);
        let message = b"proposal digest";

        let agg_sig = AggregateSignature::from_signature(keypairs[0].sign(message));
        let two_keys = AggregateVerifyingKey::aggregate(keypairs.iter().map(|kp| kp.public()));
        assert!(!two_keys.verify(message, &agg_sig));

        let no_keys = AggregateVerifyingKey::aggregate(Vec::new());
        assert!(!no_keys.verify(message, &AggregateSignature::new()));
    }
}
