/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica.
//!
//! A replica is one participant in the protocol. It is identified by an
//! [Ed25519 public key](ed25519_dalek::VerifyingKey), and may hold the signing keys of zero or more
//! finalizers. A replica that holds no finalizer keys follows the protocol without voting.
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [ReplicaSpec],
//! - The function to [start](ReplicaSpec::start) a [Replica] given its specification,
//! - [The handle](QcChainHandle) through which the pacemaker drives the replica,
//! - [The type](Replica) which keeps the replica's event bus alive.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .id(replica_id)
//!     .finalizer_keys(vec![signing_key])
//!     .chained_mode(false)
//!     .log_events(true)
//!     .build();
//!
//! let replica =
//!     ReplicaSpec::builder()
//!     .pacemaker(pacemaker)
//!     .configuration(configuration)
//!     .on_commit_proposal(commit_handler)
//!     .build()
//!     .start();
//! ```
//!
//! Starting a replica registers its [`QcChainHandle`] with the pacemaker through
//! [`Pacemaker::register_listener`]. From then on, the round driver only moves when the pacemaker calls
//! into the handle.
//!
//! ### Required setters
//!
//! - `.pacemaker(...)`
//! - `.configuration(...)`
//!
//! ### Optional setters
//!
//! - `.initial_state(...)`, to resume from a [`FinalizerState`] snapshot.
//! - One `.on_<event>(...)` setter per kind of event in [crate::events], e.g. `.on_commit_proposal(...)`.

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use typed_builder::TypedBuilder;

use crate::event_bus::*;
use crate::events::*;
use crate::hotstuff::{
    implementation::QcChain,
    messages::{NewBlock, NewView, Proposal, Vote},
};
use crate::pacemaker::Pacemaker;
use crate::state::finalizer_state::FinalizerState;
use crate::types::crypto_primitives::{SigningKey, VerifyingKey};
use crate::types::data_types::ProposalId;

/// Stores the user-defined parameters required to start the replica, that is:
/// 1. The replica's identity, used by the pacemaker to route messages and assign roles.
/// 2. The signing keys of the finalizers this replica votes for.
/// 3. The operating mode: event-driven (the default) or chained.
/// 4. The "Log Events" flag. If set to "true", every event is logged.
///
/// ## Log Events
///
/// This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.id(...)`
    - `.finalizer_keys(...)`
    - `.log_events(...)`

    Optional:
    - `.chained_mode(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the replica's identity. Required."))]
    pub id: VerifyingKey,
    #[builder(setter(
        doc = "Set the signing keys of the finalizers this replica votes for. May be empty. Required."
    ))]
    pub finalizer_keys: Vec<SigningKey>,
    #[builder(
        default = false,
        setter(doc = "Run in chained mode, proposing each block once? Defaults to `false`. Optional.")
    )]
    pub chained_mode: bool,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

/// Stores all necessary parameters and trait implementations required to run the [Replica].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.pacemaker(...)`
    - `.configuration(...)`

    Optional:
    - `.initial_state(...)`
    - `.on_insert_proposal(...)`
    - `.on_commit_proposal(...)`
    - `.on_prune_proposal(...)`
    - `.on_update_high_qc(...)`
    - `.on_update_lock(...)`
    - `.on_update_exec(...)`
    - `.on_finality_violation(...)`
    - `.on_equivocation(...)`
    - `.on_propose(...)`
    - `.on_vote(...)`
    - `.on_new_view(...)`
    - `.on_new_block(...)`
    - `.on_receive_proposal(...)`
    - `.on_receive_vote(...)`
    - `.on_receive_new_view(...)`
    - `.on_receive_new_block(...)`
    - `.on_collect_qc(...)`
    - `.on_rotate_leader(...)`
"))]
pub struct ReplicaSpec<P: Pacemaker> {
    // Required parameters
    #[builder(setter(
        doc = "Set the pacemaker that drives the replica. The argument must implement the [Pacemaker] trait. Required."
    ))]
    pacemaker: P,
    #[builder(setter(
        doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."
    ))]
    configuration: Configuration,
    // Optional parameters
    #[builder(
        default,
        setter(
            strip_option,
            doc = "Resume from a snapshot taken with [QcChainHandle::state]. Optional."
        )
    )]
    initial_state: Option<FinalizerState>,
    #[builder(default, setter(transform = |handler: impl Fn(&InsertProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<InsertProposalEvent>),
    doc = "Register a handler closure to be invoked after a proposal is inserted into the proposal store. Optional."))]
    on_insert_proposal: Option<HandlerPtr<InsertProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitProposalEvent>),
    doc = "Register a handler closure to be invoked after a proposal becomes irreversible. Optional."))]
    on_commit_proposal: Option<HandlerPtr<CommitProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&PruneProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<PruneProposalEvent>),
    doc = "Register a handler closure to be invoked after a proposal is garbage collected. Optional."))]
    on_prune_proposal: Option<HandlerPtr<PruneProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateHighQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateHighQCEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its high QC. Optional."))]
    on_update_high_qc: Option<HandlerPtr<UpdateHighQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateLockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateLockEvent>),
    doc = "Register a handler closure to be invoked after the replica locks on a proposal. Optional."))]
    on_update_lock: Option<HandlerPtr<UpdateLockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateExecEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateExecEvent>),
    doc = "Register a handler closure to be invoked after the replica moves its last executed proposal forward. Optional."))]
    on_update_exec: Option<HandlerPtr<UpdateExecEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&FinalityViolationEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<FinalityViolationEvent>),
    doc = "Register a handler closure to be invoked when a quorum forms on a proposal that conflicts with an executed one. Optional."))]
    on_finality_violation: Option<HandlerPtr<FinalityViolationEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&EquivocationEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<EquivocationEvent>),
    doc = "Register a handler closure to be invoked when two proposals share a height. Optional."))]
    on_equivocation: Option<HandlerPtr<EquivocationEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a proposal. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&VoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<VoteEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a vote. Optional."))]
    on_vote: Option<HandlerPtr<VoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a new view message to the next leader. Optional."))]
    on_new_view: Option<HandlerPtr<NewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NewBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NewBlockEvent>),
    doc = "Register a handler closure to be invoked after the replica announces a new block to the leader. Optional."))]
    on_new_block: Option<HandlerPtr<NewBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a proposal. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveVoteEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a vote. Optional."))]
    on_receive_vote: Option<HandlerPtr<ReceiveVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveNewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveNewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a new view message. Optional."))]
    on_receive_new_view: Option<HandlerPtr<ReceiveNewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveNewBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveNewBlockEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a new block announcement. Optional."))]
    on_receive_new_block: Option<HandlerPtr<ReceiveNewBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectQCEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a quorum certificate. Optional."))]
    on_collect_qc: Option<HandlerPtr<CollectQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&RotateLeaderEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<RotateLeaderEvent>),
    doc = "Register a handler closure to be invoked when the replica notices that leadership is about to change. Optional."))]
    on_rotate_leader: Option<HandlerPtr<RotateLeaderEvent>>,
}

impl<P: Pacemaker> ReplicaSpec<P> {
    /// Create the round driver, start the event bus if any handler is registered, and register the
    /// round driver with the pacemaker.
    pub fn start(self) -> Replica<P> {
        let log_events = self.configuration.log_events;

        let event_handlers = EventHandlers::new(
            log_events,
            UserHandlers {
                insert_proposal: self.on_insert_proposal,
                commit_proposal: self.on_commit_proposal,
                prune_proposal: self.on_prune_proposal,
                update_high_qc: self.on_update_high_qc,
                update_lock: self.on_update_lock,
                update_exec: self.on_update_exec,
                finality_violation: self.on_finality_violation,
                equivocation: self.on_equivocation,
                propose: self.on_propose,
                vote: self.on_vote,
                new_view: self.on_new_view,
                new_block: self.on_new_block,
                receive_proposal: self.on_receive_proposal,
                receive_vote: self.on_receive_vote,
                receive_new_view: self.on_receive_new_view,
                receive_new_block: self.on_receive_new_block,
                collect_qc: self.on_collect_qc,
                rotate_leader: self.on_rotate_leader,
            },
        );

        let (event_bus, event_bus_shutdown, event_publisher) = if !event_handlers.is_empty() {
            let (event_publisher, event_subscriber) = mpsc::channel();
            let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
            let event_bus =
                start_event_bus(event_handlers, event_subscriber, event_bus_shutdown_receiver);
            (Some(event_bus), Some(event_bus_shutdown), Some(event_publisher))
        } else {
            (None, None, None)
        };

        let id = self.configuration.id;
        let mut qc_chain = QcChain::new(
            id,
            self.configuration.finalizer_keys,
            self.configuration.chained_mode,
            self.pacemaker.clone(),
            event_publisher,
        );
        if let Some(initial_state) = &self.initial_state {
            qc_chain.restore(initial_state);
        }

        let handle = QcChainHandle {
            qc_chain: Arc::new(Mutex::new(qc_chain)),
        };
        let mut pacemaker = self.pacemaker;
        pacemaker.register_listener(id, handle.clone());

        Replica {
            handle,
            event_bus,
            event_bus_shutdown,
        }
    }
}

/// A running replica. When this value is dropped, the event bus fires the handlers for every event
/// published so far, then shuts down.
///
/// Dropping the `Replica` does not unregister its [`QcChainHandle`] from the pacemaker. The round driver
/// keeps working, but publishes no further events.
pub struct Replica<P: Pacemaker> {
    handle: QcChainHandle<P>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl<P: Pacemaker> Replica<P> {
    pub fn handle(&self) -> &QcChainHandle<P> {
        &self.handle
    }

    /// Take a snapshot of the round driver's state.
    pub fn state(&self) -> FinalizerState {
        self.handle.state()
    }
}

impl<P: Pacemaker> Drop for Replica<P> {
    fn drop(&mut self) {
        if let Some(shutdown) = self.event_bus_shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            if event_bus.join().is_err() {
                log::error!("An event handler panicked on the event bus thread.");
            }
        }
    }
}

/// Shared handle to a running round driver.
///
/// Every method locks the round driver for the duration of the call, so calls from different threads
/// are serialized. The pacemaker must not call into the handle from inside a `send_hs_*` method.
pub struct QcChainHandle<P: Pacemaker> {
    qc_chain: Arc<Mutex<QcChain<P>>>,
}

impl<P: Pacemaker> Clone for QcChainHandle<P> {
    fn clone(&self) -> Self {
        Self {
            qc_chain: self.qc_chain.clone(),
        }
    }
}

impl<P: Pacemaker> QcChainHandle<P> {
    // Poisoned locks are recovered: every handler leaves the round driver in a consistent state.
    fn lock(&self) -> MutexGuard<'_, QcChain<P>> {
        self.qc_chain
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn on_beat(&self) {
        self.lock().on_beat()
    }

    pub fn on_hs_proposal_msg(&self, proposal: Proposal) {
        self.lock().on_hs_proposal_msg(proposal)
    }

    pub fn on_hs_vote_msg(&self, vote: Vote) {
        self.lock().on_hs_vote_msg(vote)
    }

    pub fn on_hs_new_view_msg(&self, new_view: NewView) {
        self.lock().on_hs_new_view_msg(new_view)
    }

    pub fn on_hs_new_block_msg(&self, new_block: NewBlock) {
        self.lock().on_hs_new_block_msg(new_block)
    }

    pub fn state(&self) -> FinalizerState {
        self.lock().state()
    }

    pub fn id(&self) -> VerifyingKey {
        self.lock().id()
    }

    pub fn get_proposal(&self, proposal_id: &ProposalId) -> Option<Proposal> {
        self.lock().get_proposal(proposal_id).cloned()
    }
}
