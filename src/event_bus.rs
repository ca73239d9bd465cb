/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives events published by the round driver and fires the handlers registered for them.

use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::*;
use crate::logging::Logger;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

/// How long the event bus blocks waiting for an event before it checks for the shutdown signal again.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub(crate) struct EventHandlers {
    pub(crate) insert_proposal_handlers: Vec<HandlerPtr<InsertProposalEvent>>,
    pub(crate) commit_proposal_handlers: Vec<HandlerPtr<CommitProposalEvent>>,
    pub(crate) prune_proposal_handlers: Vec<HandlerPtr<PruneProposalEvent>>,
    pub(crate) update_high_qc_handlers: Vec<HandlerPtr<UpdateHighQCEvent>>,
    pub(crate) update_lock_handlers: Vec<HandlerPtr<UpdateLockEvent>>,
    pub(crate) update_exec_handlers: Vec<HandlerPtr<UpdateExecEvent>>,
    pub(crate) finality_violation_handlers: Vec<HandlerPtr<FinalityViolationEvent>>,
    pub(crate) equivocation_handlers: Vec<HandlerPtr<EquivocationEvent>>,
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) vote_handlers: Vec<HandlerPtr<VoteEvent>>,
    pub(crate) new_view_handlers: Vec<HandlerPtr<NewViewEvent>>,
    pub(crate) new_block_handlers: Vec<HandlerPtr<NewBlockEvent>>,
    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_vote_handlers: Vec<HandlerPtr<ReceiveVoteEvent>>,
    pub(crate) receive_new_view_handlers: Vec<HandlerPtr<ReceiveNewViewEvent>>,
    pub(crate) receive_new_block_handlers: Vec<HandlerPtr<ReceiveNewBlockEvent>>,
    pub(crate) collect_qc_handlers: Vec<HandlerPtr<CollectQCEvent>>,
    pub(crate) rotate_leader_handlers: Vec<HandlerPtr<RotateLeaderEvent>>,
}

/// Handlers supplied by the user, one optional handler per kind of event.
#[derive(Default)]
pub(crate) struct UserHandlers {
    pub(crate) insert_proposal: Option<HandlerPtr<InsertProposalEvent>>,
    pub(crate) commit_proposal: Option<HandlerPtr<CommitProposalEvent>>,
    pub(crate) prune_proposal: Option<HandlerPtr<PruneProposalEvent>>,
    pub(crate) update_high_qc: Option<HandlerPtr<UpdateHighQCEvent>>,
    pub(crate) update_lock: Option<HandlerPtr<UpdateLockEvent>>,
    pub(crate) update_exec: Option<HandlerPtr<UpdateExecEvent>>,
    pub(crate) finality_violation: Option<HandlerPtr<FinalityViolationEvent>>,
    pub(crate) equivocation: Option<HandlerPtr<EquivocationEvent>>,
    pub(crate) propose: Option<HandlerPtr<ProposeEvent>>,
    pub(crate) vote: Option<HandlerPtr<VoteEvent>>,
    pub(crate) new_view: Option<HandlerPtr<NewViewEvent>>,
    pub(crate) new_block: Option<HandlerPtr<NewBlockEvent>>,
    pub(crate) receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_vote: Option<HandlerPtr<ReceiveVoteEvent>>,
    pub(crate) receive_new_view: Option<HandlerPtr<ReceiveNewViewEvent>>,
    pub(crate) receive_new_block: Option<HandlerPtr<ReceiveNewBlockEvent>>,
    pub(crate) collect_qc: Option<HandlerPtr<CollectQCEvent>>,
    pub(crate) rotate_leader: Option<HandlerPtr<RotateLeaderEvent>>,
}

/// Collect the logger for an event type (if `log_events`) followed by the user's handler (if any).
fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    if let Some(handler) = user_handler {
        handlers.push(handler);
    }
    handlers
}

impl EventHandlers {
    pub(crate) fn new(log_events: bool, user_handlers: UserHandlers) -> EventHandlers {
        EventHandlers {
            insert_proposal_handlers: handlers(log_events, user_handlers.insert_proposal),
            commit_proposal_handlers: handlers(log_events, user_handlers.commit_proposal),
            prune_proposal_handlers: handlers(log_events, user_handlers.prune_proposal),
            update_high_qc_handlers: handlers(log_events, user_handlers.update_high_qc),
            update_lock_handlers: handlers(log_events, user_handlers.update_lock),
            update_exec_handlers: handlers(log_events, user_handlers.update_exec),
            finality_violation_handlers: handlers(log_events, user_handlers.finality_violation),
            equivocation_handlers: handlers(log_events, user_handlers.equivocation),
            propose_handlers: handlers(log_events, user_handlers.propose),
            vote_handlers: handlers(log_events, user_handlers.vote),
            new_view_handlers: handlers(log_events, user_handlers.new_view),
            new_block_handlers: handlers(log_events, user_handlers.new_block),
            receive_proposal_handlers: handlers(log_events, user_handlers.receive_proposal),
            receive_vote_handlers: handlers(log_events, user_handlers.receive_vote),
            receive_new_view_handlers: handlers(log_events, user_handlers.receive_new_view),
            receive_new_block_handlers: handlers(log_events, user_handlers.receive_new_block),
            collect_qc_handlers: handlers(log_events, user_handlers.collect_qc),
            rotate_leader_handlers: handlers(log_events, user_handlers.rotate_leader),
        }
    }

    /// Check whether no handler at all is registered. If so, the replica runs without an event bus.
    pub(crate) fn is_empty(&self) -> bool {
        self.insert_proposal_handlers.is_empty()
            && self.commit_proposal_handlers.is_empty()
            && self.prune_proposal_handlers.is_empty()
            && self.update_high_qc_handlers.is_empty()
            && self.update_lock_handlers.is_empty()
            && self.update_exec_handlers.is_empty()
            && self.finality_violation_handlers.is_empty()
            && self.equivocation_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.vote_handlers.is_empty()
            && self.new_view_handlers.is_empty()
            && self.new_block_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_vote_handlers.is_empty()
            && self.receive_new_view_handlers.is_empty()
            && self.receive_new_block_handlers.is_empty()
            && self.collect_qc_handlers.is_empty()
            && self.rotate_leader_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::InsertProposal(insert_proposal_event) => self
                .insert_proposal_handlers
                .iter()
                .for_each(|handler| handler(&insert_proposal_event)),

            Event::CommitProposal(commit_proposal_event) => self
                .commit_proposal_handlers
                .iter()
                .for_each(|handler| handler(&commit_proposal_event)),

            Event::PruneProposal(prune_proposal_event) => self
                .prune_proposal_handlers
                .iter()
                .for_each(|handler| handler(&prune_proposal_event)),

            Event::UpdateHighQC(update_high_qc_event) => self
                .update_high_qc_handlers
                .iter()
                .for_each(|handler| handler(&update_high_qc_event)),

            Event::UpdateLock(update_lock_event) => self
                .update_lock_handlers
                .iter()
                .for_each(|handler| handler(&update_lock_event)),

            Event::UpdateExec(update_exec_event) => self
                .update_exec_handlers
                .iter()
                .for_each(|handler| handler(&update_exec_event)),

            Event::FinalityViolation(finality_violation_event) => self
                .finality_violation_handlers
                .iter()
                .for_each(|handler| handler(&finality_violation_event)),

            Event::Equivocation(equivocation_event) => self
                .equivocation_handlers
                .iter()
                .for_each(|handler| handler(&equivocation_event)),

            Event::Propose(propose_event) => self
                .propose_handlers
                .iter()
                .for_each(|handler| handler(&propose_event)),

            Event::Vote(vote_event) => self
                .vote_handlers
                .iter()
                .for_each(|handler| handler(&vote_event)),

            Event::NewView(new_view_event) => self
                .new_view_handlers
                .iter()
                .for_each(|handler| handler(&new_view_event)),

            Event::NewBlock(new_block_event) => self
                .new_block_handlers
                .iter()
                .for_each(|handler| handler(&new_block_event)),

            Event::ReceiveProposal(receive_proposal_event) => self
                .receive_proposal_handlers
                .iter()
                .for_each(|handler| handler(&receive_proposal_event)),

            Event::ReceiveVote(receive_vote_event) => self
                .receive_vote_handlers
                .iter()
                .for_each(|handler| handler(&receive_vote_event)),

            Event::ReceiveNewView(receive_new_view_event) => self
                .receive_new_view_handlers
                .iter()
                .for_each(|handler| handler(&receive_new_view_event)),

            Event::ReceiveNewBlock(receive_new_block_event) => self
                .receive_new_block_handlers
                .iter()
                .for_each(|handler| handler(&receive_new_block_event)),

            Event::CollectQC(collect_qc_event) => self
                .collect_qc_handlers
                .iter()
                .for_each(|handler| handler(&collect_qc_event)),

            Event::RotateLeader(rotate_leader_event) => self
                .rotate_leader_handlers
                .iter()
                .for_each(|handler| handler(&rotate_leader_event)),
        }
    }
}

/// Start the event bus thread.
///
/// On shutdown, the event bus fires the handlers for every event that was published before the shutdown
/// signal, then returns.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                while let Ok(event) = event_subscriber.try_recv() {
                    event_handlers.fire_handlers(event)
                }
                return;
            }
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
