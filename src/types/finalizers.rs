/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that store information about the finalizer schedule and about which finalizers contributed to a
//! quorum certificate.

use borsh::{BorshDeserialize, BorshSerialize};
use std::{collections::HashMap, slice};

use super::data_types::{Power, TotalPower};

pub use ed25519_dalek::VerifyingKey;

/// Stores the identities of finalizers and their voting powers.
///
/// ## Ordering of finalizers
///
/// `FinalizerSet` keeps finalizers in the order they were first [`put`](Self::put) into it. This order is
/// the canonical order of the schedule: [`FinalizerBitset`] positions and the order of the signatures in
/// an [`AggregateSignature`](super::crypto_primitives::AggregateSignature) both refer to it.
///
/// ## Limits to total power
///
/// Users must make sure that the total power of the finalizer set does not exceed `u128::MAX/2`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FinalizerSet {
    finalizers: Vec<VerifyingKey>,
    powers: HashMap<VerifyingKey, Power>,
}

impl FinalizerSet {
    /// Create an empty finalizer set.
    pub fn new() -> FinalizerSet {
        Self {
            finalizers: Vec::new(),
            powers: HashMap::new(),
        }
    }

    /// Create a finalizer set in which each of `finalizers` has a power of 1, in the order given.
    pub fn from_keys(finalizers: impl IntoIterator<Item = VerifyingKey>) -> FinalizerSet {
        let mut finalizer_set = FinalizerSet::new();
        for finalizer in finalizers {
            finalizer_set.put(&finalizer, Power::new(1));
        }
        finalizer_set
    }

    /// Put a `finalizer` with the specified `power` at the end of the schedule.
    ///
    /// If `finalizer` already exists in the finalizer set, this function updates its power instead and
    /// keeps its position.
    pub fn put(&mut self, finalizer: &VerifyingKey, power: Power) {
        if !self.contains(finalizer) {
            self.finalizers.push(*finalizer);
        }

        self.powers.insert(*finalizer, power);
    }

    /// Get the power of the specified `finalizer` inside the finalizer set.
    pub fn power(&self, finalizer: &VerifyingKey) -> Option<Power> {
        self.powers.get(finalizer).copied()
    }

    /// Get the sum of the powers of all of the finalizers inside the finalizer set.
    pub fn total_power(&self) -> TotalPower {
        let mut total_power = TotalPower::new(0);
        for power in self.powers.values() {
            total_power += *power
        }
        total_power
    }

    /// Check whether the finalizer set contains `finalizer`.
    pub fn contains(&self, finalizer: &VerifyingKey) -> bool {
        self.powers.contains_key(finalizer)
    }

    /// Get an iterator through finalizers' verifying keys in schedule order.
    pub fn finalizers(&self) -> slice::Iter<VerifyingKey> {
        self.finalizers.iter()
    }

    /// Get the finalizer at `pos` in schedule order.
    pub fn get(&self, pos: usize) -> Option<&VerifyingKey> {
        self.finalizers.get(pos)
    }

    /// Get the number of finalizers currently in the finalizer set.
    pub fn len(&self) -> usize {
        self.finalizers.len()
    }

    /// Check whether the finalizer set is empty (i.e., `self.len() == 0`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the position of `finalizer` in schedule order, if it is actually in the finalizer set.
    pub fn position(&self, finalizer: &VerifyingKey) -> Option<usize> {
        self.finalizers.iter().position(|f| f == finalizer)
    }

    /// Compute the smallest total power strictly greater than two thirds of the total power of the set.
    ///
    /// Pacemakers that derive their quorum threshold from the schedule can use this. The core itself only
    /// uses the threshold the pacemaker reports.
    pub fn supermajority(&self) -> TotalPower {
        TotalPower::new(self.total_power().int().saturating_mul(2) / 3 + 1)
    }
}

/// Which finalizers of a [`FinalizerSet`] contributed to a quorum certificate.
///
/// Position `i` of the bitset refers to the finalizer at position `i` of the schedule.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FinalizerBitset(Vec<bool>);

impl FinalizerBitset {
    /// Create a bitset with no positions set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Check whether position `pos` is set.
    pub fn is_set(&self, pos: usize) -> bool {
        self.0.get(pos).copied().unwrap_or(false)
    }

    /// Set position `pos`, growing the bitset if needed.
    pub fn set(&mut self, pos: usize) {
        if pos >= self.0.len() {
            self.0.resize(pos + 1, false);
        }
        self.0[pos] = true;
    }

    /// Get how many set positions come before `pos`.
    pub fn rank(&self, pos: usize) -> usize {
        self.0.iter().take(pos).filter(|bit| **bit).count()
    }

    /// Get how many positions are set.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|bit| **bit).count()
    }

    /// Iterate through the set positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(pos, bit)| if *bit { Some(pos) } else { None })
    }
}
