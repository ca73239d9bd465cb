/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The consensus core of a chained three-phase HotStuff protocol with final-on-QC finality markers.
//!
//! This crate decides, among a weighted set of finalizers, which proposals become irreversible. It knows
//! nothing about wall-clock time, leader election, or transport: a user-provided [`Pacemaker`] tells the
//! round driver who the current proposer and leader are, which block to propose, and carries its messages
//! to other replicas.
//!
//! ## Architecture
//!
//! - [`hotstuff`]: the round driver ([`QcChain`](hotstuff::implementation::QcChain)) and the messages
//!   and quorum certificates it exchanges.
//! - [`state`]: the proposal store, the voting and locking rules, commit, and the snapshot type
//!   [`FinalizerState`](state::finalizer_state::FinalizerState).
//! - [`pacemaker`]: the trait through which the round driver talks to the outside world.
//! - [`replica`]: builder-style configuration, and the [`QcChainHandle`](replica::QcChainHandle) that
//!   the pacemaker calls into.
//! - [`events`]: everything the round driver does is published as an event. Events can be logged, and
//!   user handlers can be registered for them.
//!
//! [`Pacemaker`]: pacemaker::Pacemaker

pub mod events;

pub(crate) mod event_bus;

pub mod hotstuff;

pub(crate) mod logging;

pub mod pacemaker;

pub mod replica;

pub mod state;

pub mod types;
