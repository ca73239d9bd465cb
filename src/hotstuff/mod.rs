/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The chained HotStuff round driver, with final-on-QC.
//!
//! ## Operating modes
//!
//! The round driver runs in one of two modes, chosen by
//! [`Configuration::chained_mode`](crate::replica::Configuration):
//! 1. **Event-driven mode** (the default): every block goes through four phases (prepare, precommit,
//!    commit, decide). The leader proposes phase 0 on the heartbeat, and proposes each following phase
//!    of the same block as soon as it collects a quorum for the previous one.
//! 2. **Chained mode**: every block is proposed once, in phase 0. Only the heartbeat creates new
//!    proposals, and a quorum for one proposal serves as the justify of the next.
//!
//! A round in event-driven mode generally proceeds as follows:
//! 1. The proposer asks the leader to propose a block, with a [`NewBlock`](messages::NewBlock) (or
//!    proposes directly, if it is also the leader).
//! 2. The leader builds a [`Proposal`](messages::Proposal) that extends its leaf and is justified by its
//!    high QC, and sends it.
//! 3. Finalizers store the proposal, vote for it if it is [safe](crate::state::safety), and apply the
//!    [lock and commit updates](crate::state::commit) that its justify triggers.
//! 4. The leader aggregates [`Vote`](messages::Vote)s into a [`QuorumCertificate`](types::QuorumCertificate),
//!    and once it carries a quorum, proposes the next phase.
//! 5. When the pacemaker signals a change of leader, every replica sends its high QC to the next leader
//!    in a [`NewView`](messages::NewView).
//!
//! ## Final-on-QC
//!
//! Every proposal carries the id of the proposal that becomes irreversible once it reaches quorum, and
//! that id is part of what finalizers sign. A finalizer recomputes it from the chain the proposal extends
//! and refuses to vote if the leader got it wrong.

pub mod implementation;

pub mod messages;

pub mod quorum;

pub(crate) mod roles;

pub mod types;
