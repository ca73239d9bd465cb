/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! In-memory store of the proposals a round driver has accepted, indexed by id and by height.
//!
//! More than one proposal may be stored at the same height (see
//! [`EquivocationEvent`](crate::events::EquivocationEvent)). Proposals at the same height are kept in
//! the order they were inserted.

use std::collections::{BTreeMap, HashMap};

use crate::hotstuff::messages::Proposal;
use crate::types::data_types::{ProposalHeight, ProposalId};

#[derive(Clone, Debug, Default)]
pub struct ProposalStore {
    by_id: HashMap<ProposalId, Proposal>,
    by_height: BTreeMap<ProposalHeight, Vec<ProposalId>>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a list of proposals. Duplicates are ignored.
    pub fn from_proposals(proposals: impl IntoIterator<Item = Proposal>) -> Self {
        let mut store = Self::new();
        for proposal in proposals {
            store.insert(proposal);
        }
        store
    }

    /// Store `proposal`. Returns `false`, and leaves the store unchanged, if a proposal with the same id
    /// is already stored.
    pub fn insert(&mut self, proposal: Proposal) -> bool {
        if self.by_id.contains_key(&proposal.proposal_id) {
            return false;
        }

        self.by_height
            .entry(proposal.height())
            .or_default()
            .push(proposal.proposal_id);
        self.by_id.insert(proposal.proposal_id, proposal);
        true
    }

    pub fn contains(&self, proposal_id: &ProposalId) -> bool {
        self.by_id.contains_key(proposal_id)
    }

    pub fn get(&self, proposal_id: &ProposalId) -> Option<&Proposal> {
        self.by_id.get(proposal_id)
    }

    /// Like [`get`](Self::get), but accepts an absent id, in which case it returns `None`.
    pub fn find_by_id(&self, proposal_id: Option<&ProposalId>) -> Option<&Proposal> {
        proposal_id.and_then(|id| self.get(id))
    }

    /// Get the first proposal stored at `height`.
    pub fn find_by_height(&self, height: ProposalHeight) -> Option<&Proposal> {
        self.proposals_at_height(height).next()
    }

    /// Get every proposal stored at `height`, in insertion order.
    pub fn proposals_at_height(&self, height: ProposalHeight) -> impl Iterator<Item = &Proposal> + '_ {
        self.by_height
            .get(&height)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
    }

    /// Follow `justify` links starting from the proposal identified by `proposal_id`, and return up to
    /// `n` proposals: the starting proposal, the proposal its justify certifies, and so on.
    ///
    /// The walk stops early at the first proposal that has no justify or whose justified proposal is not
    /// in the store.
    pub fn qc_chain(&self, proposal_id: &ProposalId, n: usize) -> Vec<&Proposal> {
        let mut chain = Vec::with_capacity(n);
        let mut cursor = self.get(proposal_id);
        while let Some(proposal) = cursor {
            if chain.len() == n {
                break;
            }
            chain.push(proposal);
            cursor = self.find_by_id(proposal.justify_id().as_ref());
        }
        chain
    }

    /// Remove every proposal whose height is at most `cutoff`, returning the removed proposals in height
    /// order.
    pub fn garbage_collect(&mut self, cutoff: ProposalHeight) -> Vec<Proposal> {
        let retained = match cutoff.int().checked_add(1) {
            Some(above) => self.by_height.split_off(&ProposalHeight::from_int(above)),
            None => BTreeMap::new(),
        };
        let removed = std::mem::replace(&mut self.by_height, retained);

        removed
            .into_values()
            .flatten()
            .filter_map(|id| self.by_id.remove(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterate over every stored proposal, lowest height first.
    pub fn iter_by_height(&self) -> impl Iterator<Item = &Proposal> + '_ {
        self.by_height
            .values()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
    }
}
