/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0.
*/

//! [Trait definition](Pacemaker) for pacemakers: user-provided types that know wall-clock time, the
//! role schedule, and the transport.
//!
//! Specifically, pacemakers tell the round driver four things:
//! 1. **Roles**: who the current [proposer](Pacemaker::get_proposer), [leader](Pacemaker::get_leader),
//!    and [next leader](Pacemaker::get_next_leader) are.
//! 2. **Schedule**: which [finalizers](Pacemaker::get_finalizers) may vote, with what weight, and what
//!    [total weight](Pacemaker::get_quorum_threshold) makes a quorum.
//! 3. **Block**: which [block](Pacemaker::get_current_block_id) to propose this round.
//! 4. **Transport**: how to deliver outbound proposals, votes, new-views, and new-blocks.
//!
//! The pacemaker also drives the round driver: it calls [`on_beat`](crate::replica::QcChainHandle::on_beat)
//! once per round, and hands inbound messages to the `on_hs_*_msg` entry points of the
//! [`QcChainHandle`] it was given through [`register_listener`](Pacemaker::register_listener).
//!
//! Timeouts and leader election policy live entirely in the pacemaker. The round driver never runs a
//! timer of its own.

use crate::hotstuff::messages::{NewBlock, NewView, Proposal, Vote};
use crate::replica::QcChainHandle;
use crate::types::{
    crypto_primitives::VerifyingKey,
    data_types::{BlockId, TotalPower},
    finalizers::FinalizerSet,
};

/// # Sending
///
/// The `send_hs_*` methods are called synchronously from inside the round driver's critical section.
/// They must not call back into the round driver; queue the message and deliver it later instead.
///
/// `id` is the identity of the sending round driver, so that implementations can avoid delivering a
/// message back to its sender (the sender has already processed it).
pub trait Pacemaker: Clone + Send + 'static {
    /// Total finalizer weight that makes a quorum.
    fn get_quorum_threshold(&self) -> TotalPower;

    /// The block to propose this round.
    fn get_current_block_id(&self) -> BlockId;

    fn get_proposer(&self) -> VerifyingKey;

    fn get_leader(&self) -> VerifyingKey;

    fn get_next_leader(&self) -> VerifyingKey;

    /// The weighted finalizer schedule, in canonical order.
    fn get_finalizers(&self) -> FinalizerSet;

    /// Wire the pacemaker to a round driver. Called once, when a [`Replica`](crate::replica::Replica) starts.
    fn register_listener(&mut self, id: VerifyingKey, listener: QcChainHandle<Self>);

    fn send_hs_proposal_msg(&mut self, id: &VerifyingKey, msg: Proposal);

    fn send_hs_vote_msg(&mut self, id: &VerifyingKey, msg: Vote);

    fn send_hs_new_view_msg(&mut self, id: &VerifyingKey, msg: NewView);

    fn send_hs_new_block_msg(&mut self, id: &VerifyingKey, msg: NewBlock);
}
