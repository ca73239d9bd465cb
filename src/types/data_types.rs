/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    ops::AddAssign,
};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};

/// 32-byte cryptographic hash.
///
/// Within this crate, `CryptoHash`-es are always SHA256 hashes: they are the inner values of both
/// [`ProposalId`]s and [`BlockId`]s.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

/// Formats as Base64 without padding, the same encoding the event logs use.
impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD_NO_PAD.encode(self.0))
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Content-derived identity of a [`Proposal`](crate::hotstuff::messages::Proposal).
///
/// A proposal's id is the digest its finalizers sign, so two proposals with the same id are identical.
/// See [`Proposal::digest`](crate::hotstuff::messages::Proposal::digest).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct ProposalId(CryptoHash);

impl ProposalId {
    /// Create a new `ProposalId` wrapping `hash`.
    pub const fn new(hash: CryptoHash) -> Self {
        Self(hash)
    }

    /// Get the inner `CryptoHash` of this `ProposalId`.
    pub const fn hash(&self) -> CryptoHash {
        self.0
    }

    /// Get the bytes of the inner hash.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0.bytes()
    }
}

impl Display for ProposalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for ProposalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Identity of a block candidate.
///
/// The first four bytes of a `BlockId` hold the number of the block in big-endian order. The remaining
/// 28 bytes are opaque to this crate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct BlockId(CryptoHash);

impl BlockId {
    /// Create a new `BlockId` wrapping `hash`.
    pub const fn new(hash: CryptoHash) -> Self {
        Self(hash)
    }

    /// Create a `BlockId` for block number `block_num` whose remaining 28 bytes are the last 28 bytes of
    /// `tail`.
    pub fn from_parts(block_num: BlockNumber, tail: [u8; 32]) -> Self {
        let mut bytes = tail;
        bytes[0..4].copy_from_slice(&block_num.int().to_be_bytes());
        Self(CryptoHash::new(bytes))
    }

    /// Get the block number encoded in the first four bytes of this `BlockId`.
    pub fn block_num(&self) -> BlockNumber {
        let bytes = self.0.bytes();
        BlockNumber::new(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Get the inner `CryptoHash` of this `BlockId`.
    pub const fn hash(&self) -> CryptoHash {
        self.0
    }

    /// Get the bytes of the inner hash.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0.bytes()
    }
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for BlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Number of a block, as encoded in its [`BlockId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct BlockNumber(u32);

impl BlockNumber {
    /// Create a new `BlockNumber` wrapping `int`.
    pub const fn new(int: u32) -> Self {
        Self(int)
    }

    /// Get the inner `u32` value of this `BlockNumber`.
    pub const fn int(&self) -> u32 {
        self.0
    }
}

impl Display for BlockNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Sub-round of a block height. Takes the values 0 (prepare), 1 (precommit), 2 (commit), and 3
/// (decide) in event-driven mode, and is always 0 in chained mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct PhaseCounter(u8);

impl PhaseCounter {
    /// The phase in which every block is first proposed.
    pub const PREPARE: PhaseCounter = PhaseCounter(0);

    /// The last phase of a block in event-driven mode.
    pub const DECIDE: PhaseCounter = PhaseCounter(3);

    /// Create a new `PhaseCounter` wrapping `int`.
    pub const fn new(int: u8) -> Self {
        Self(int)
    }

    /// Get the inner `u8` value of this `PhaseCounter`.
    pub const fn int(&self) -> u8 {
        self.0
    }

    /// Get the phase that follows this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for PhaseCounter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Position of a proposal in the total order of proposals: `(block_num << 32) | phase_counter`.
///
/// Comparing two `ProposalHeight`s compares block numbers first, and phase counters second.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize)]
pub struct ProposalHeight(u64);

impl ProposalHeight {
    /// Compute the height of a proposal for `block_num` in phase `phase_counter`.
    pub const fn new(block_num: BlockNumber, phase_counter: PhaseCounter) -> Self {
        Self(((block_num.int() as u64) << 32) | phase_counter.int() as u64)
    }

    /// Create a `ProposalHeight` directly from its packed `u64` representation.
    pub const fn from_int(int: u64) -> Self {
        Self(int)
    }

    /// Get the packed `u64` value of this `ProposalHeight`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the block number part of this `ProposalHeight`.
    pub const fn block_num(&self) -> BlockNumber {
        BlockNumber::new((self.0 >> 32) as u32)
    }

    /// Get the phase counter part of this `ProposalHeight`.
    pub const fn phase_counter(&self) -> PhaseCounter {
        PhaseCounter::new((self.0 & 0xff) as u8)
    }

    /// Get the height immediately below this one, saturating at zero.
    pub const fn prev(&self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl Display for ProposalHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.block_num(), self.phase_counter())
    }
}

impl Debug for ProposalHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Weight of a specific finalizer's votes in consensus decisions.
///
/// The higher the power, the more weight the finalizer's votes have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Power(u64);

impl Power {
    /// Create a new `Power` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `Power`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

/// Sum of the [`Power`]s of a group of finalizers. Also used to express quorum thresholds.
///
/// The inner type that this newtype wraps around is `u128`, which is bigger than inner `u64` that
/// `Power` wraps around. This is so that summing up large `Power`s do not cause `TotalPower`'s inner
/// value to overflow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct TotalPower(u128);

impl TotalPower {
    /// Create a new `TotalPower` wrapping `int`.
    pub const fn new(int: u128) -> Self {
        Self(int)
    }

    /// Get the inner `u128` value of this `TotalPower`.
    pub const fn int(&self) -> u128 {
        self.0
    }
}

impl AddAssign<Power> for TotalPower {
    fn add_assign(&mut self, rhs: Power) {
        self.0.add_assign(rhs.0 as u128)
    }
}

impl Display for TotalPower {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Ed25519 digital signature.
///
/// These are produced using the [`ed25519_dalek`] crate, whose main definitions are re-exported from the
/// [`crypto_primitives`](super::crypto_primitives) module.
#[derive(Clone, Copy, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SignatureBytes").field(&&self.0[..8]).finish()
    }
}

/// Serializable form of an Ed25519 verifying key, used to carry finalizer identities in messages.
pub type VerifyingKeyBytes = [u8; 32];
