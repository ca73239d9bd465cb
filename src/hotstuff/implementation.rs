/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the round driver.
//!
//! Main type: [`QcChain`].

use std::{
    fmt::{self, Display, Formatter},
    sync::mpsc::Sender,
    time::SystemTime,
};

use crate::{
    events::*,
    hotstuff::{
        messages::{NewBlock, NewView, Proposal, Vote},
        quorum::{is_quorum_met, Schedule},
        roles::{am_i_finalizer, am_i_leader, am_i_proposer},
        types::QuorumCertificate,
    },
    pacemaker::Pacemaker,
    state::{
        finalizer_state::FinalizerState,
        safety::{implied_final_on_qc, is_node_safe},
        ChainState, ChainStateError,
    },
    types::{
        crypto_primitives::{Keypair, SigningKey, VerifyingKey},
        data_types::{BlockId, PhaseCounter, ProposalId},
    },
};

/// A single participant in the chained HotStuff protocol.
///
/// # Usage
///
/// `QcChain` is meant to be used in an "event-oriented" fashion. Its public methods are event handlers
/// that are to be called when specific things happen to the replica:
/// 1. [`on_beat`](Self::on_beat): called by the pacemaker once per round.
/// 2. [`on_hs_proposal_msg`](Self::on_hs_proposal_msg), [`on_hs_vote_msg`](Self::on_hs_vote_msg),
///    [`on_hs_new_view_msg`](Self::on_hs_new_view_msg), and
///    [`on_hs_new_block_msg`](Self::on_hs_new_block_msg): called when a message is received.
///
/// Every handler runs to completion. Errors are logged and swallowed at the handler boundary, so that a
/// single bad message cannot wedge the replica.
///
/// Messages this replica sends to itself (its own proposals and votes) are processed synchronously,
/// through the same code path as messages received from peers.
pub struct QcChain<P: Pacemaker> {
    id: VerifyingKey,
    finalizer_keys: Vec<Keypair>,
    my_keys: Vec<VerifyingKey>,
    chained_mode: bool,
    pacemaker: P,
    state: ChainState,
    current_qc: Option<QuorumCertificate>,
    pending_proposal_block: Option<BlockId>,
    event_publisher: Option<Sender<Event>>,
}

impl<P: Pacemaker> QcChain<P> {
    /// Create a round driver with empty state.
    pub(crate) fn new(
        id: VerifyingKey,
        finalizer_keys: Vec<SigningKey>,
        chained_mode: bool,
        pacemaker: P,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let finalizer_keys: Vec<Keypair> = finalizer_keys.into_iter().map(Keypair::new).collect();
        let my_keys = finalizer_keys.iter().map(|kp| kp.public()).collect();
        Self {
            id,
            finalizer_keys,
            my_keys,
            chained_mode,
            pacemaker,
            state: ChainState::new(event_publisher.clone()),
            current_qc: None,
            pending_proposal_block: None,
            event_publisher,
        }
    }

    /// Replace this round driver's state with `state`. The operating mode stays the one this round
    /// driver was configured with.
    ///
    /// The restored high QC is trusted. The restored in-flight certificate is verified again.
    pub(crate) fn restore(&mut self, state: &FinalizerState) {
        if state.chained_mode != self.chained_mode {
            log::warn!(
                "Restoring a state taken in chained mode {} into a replica configured with chained mode {}.",
                state.chained_mode,
                self.chained_mode
            );
        }
        self.state = ChainState::from_snapshot(state, self.event_publisher.clone());
        self.pending_proposal_block = state.pending_proposal_block;

        // The quorum latch is not serialized. The in-flight certificate is verified again against the
        // current schedule.
        let schedule = Schedule::from_pacemaker(&self.pacemaker);
        let current_qc = state.current_qc.clone().map(|mut qc| {
            if let Some(proposal) = self.state.get_proposal(&qc.proposal_id) {
                qc.quorum_met = is_quorum_met(&qc, &schedule, proposal);
            }
            qc
        });
        self.current_qc = current_qc;
    }

    pub fn id(&self) -> VerifyingKey {
        self.id
    }

    /// Take a snapshot of everything this round driver knows.
    pub fn state(&self) -> FinalizerState {
        self.state.snapshot(
            self.chained_mode,
            self.pending_proposal_block,
            self.current_qc.clone(),
        )
    }

    pub fn get_proposal(&self, proposal_id: &ProposalId) -> Option<&Proposal> {
        self.state.get_proposal(proposal_id)
    }

    /// Start a new round.
    ///
    /// A leader builds a proposal for the pacemaker's current block (or defers it, if its previous
    /// proposal has not reached quorum yet). A proposer that is not the leader announces the block to
    /// the leader with a [`NewBlock`] message. A replica with neither role does nothing.
    pub fn on_beat(&mut self) {
        let am_proposer = am_i_proposer(&self.pacemaker, &self.my_keys);
        let am_leader = am_i_leader(&self.pacemaker, &self.my_keys);
        if !am_proposer && !am_leader {
            return;
        }

        let new_block = NewBlock {
            block_id: self.pacemaker.get_current_block_id(),
            justify: self.state.high_qc.clone(),
        };

        let result = if am_leader {
            self.process_new_block(new_block)
        } else {
            self.send_new_block(new_block);
            Ok(())
        };

        if let Err(e) = result {
            log::error!("on_beat failed: {}", e);
        }
    }

    pub fn on_hs_proposal_msg(&mut self, mut proposal: Proposal) {
        Event::publish(
            &self.event_publisher,
            Event::ReceiveProposal(ReceiveProposalEvent {
                timestamp: SystemTime::now(),
                proposal: proposal.clone(),
            }),
        );

        if let Some(justify) = proposal.justify.as_mut() {
            justify.quorum_met = false;
        }
        if let Err(e) = self.process_proposal(proposal) {
            log::error!("Failed to process proposal: {}", e);
        }
    }

    pub fn on_hs_vote_msg(&mut self, vote: Vote) {
        Event::publish(
            &self.event_publisher,
            Event::ReceiveVote(ReceiveVoteEvent {
                timestamp: SystemTime::now(),
                vote: vote.clone(),
            }),
        );

        if let Err(e) = self.process_vote(vote) {
            log::error!("Failed to process vote: {}", e);
        }
    }

    pub fn on_hs_new_view_msg(&mut self, mut new_view: NewView) {
        Event::publish(
            &self.event_publisher,
            Event::ReceiveNewView(ReceiveNewViewEvent {
                timestamp: SystemTime::now(),
                new_view: new_view.clone(),
            }),
        );

        if let Some(high_qc) = new_view.high_qc.as_mut() {
            high_qc.quorum_met = false;
        }
        self.process_new_view(new_view);
    }

    pub fn on_hs_new_block_msg(&mut self, mut new_block: NewBlock) {
        Event::publish(
            &self.event_publisher,
            Event::ReceiveNewBlock(ReceiveNewBlockEvent {
                timestamp: SystemTime::now(),
                new_block: new_block.clone(),
            }),
        );

        if let Some(justify) = new_block.justify.as_mut() {
            justify.quorum_met = false;
        }
        if let Err(e) = self.process_new_block(new_block) {
            log::error!("Failed to process new block: {}", e);
        }
    }

    /// Store `proposal`, vote for it if it is safe, and apply the state updates it triggers.
    ///
    /// ## Steps
    ///
    /// 1. Drop the proposal if its id does not match its content, if it is justified by a proposal this
    ///    replica does not know, if it is already stored, or if its parent is not lower than itself.
    /// 2. Report every different proposal already stored at the same height as an equivocation.
    /// 3. Store the proposal.
    /// 4. If this replica is a finalizer and the proposal is safe, sign one vote per held key in the
    ///    schedule.
    /// 5. Apply the lock and commit updates that the proposal's justify triggers.
    /// 6. Send the votes, then check for a change of leader.
    fn process_proposal(&mut self, proposal: Proposal) -> Result<(), QcChainError> {
        // 1. Drop malformed, unjustifiable, and duplicate proposals.
        if !proposal.is_correct() {
            log::warn!("Proposal {} does not match its content.", proposal.proposal_id);
            return Ok(());
        }
        if let Some(justify_id) = proposal.justify_id() {
            if !self.state.proposals.contains(&justify_id) {
                log::debug!(
                    "Proposal {} is justified by unknown proposal {}.",
                    proposal.proposal_id,
                    justify_id
                );
                return Ok(());
            }
        }
        if self.state.proposals.contains(&proposal.proposal_id) {
            log::debug!("Proposal {} is already stored.", proposal.proposal_id);
            return Ok(());
        }
        if let Some(parent_id) = &proposal.parent_id {
            if *parent_id == proposal.proposal_id {
                log::warn!("Proposal {} names itself as its parent.", proposal.proposal_id);
                return Ok(());
            }
            if let Some(parent) = self.state.get_proposal(parent_id) {
                if parent.height() >= proposal.height() {
                    log::warn!(
                        "Proposal {} at height {} extends {} at height {}.",
                        proposal.proposal_id,
                        proposal.height(),
                        parent.proposal_id,
                        parent.height()
                    );
                    return Ok(());
                }
            }
        }

        // 2. Report equivocation.
        let conflicting: Vec<ProposalId> = self
            .state
            .proposals
            .proposals_at_height(proposal.height())
            .map(|p| p.proposal_id)
            .collect();
        for existing in conflicting {
            log::warn!(
                "Equivocation at height {}: {} and {}.",
                proposal.height(),
                existing,
                proposal.proposal_id
            );
            Event::publish(
                &self.event_publisher,
                Event::Equivocation(EquivocationEvent {
                    timestamp: SystemTime::now(),
                    height: proposal.height(),
                    existing,
                    proposal: proposal.proposal_id,
                }),
            );
        }

        // 3. Store.
        self.state.insert_proposal(&proposal);

        // 4. Vote.
        let mut votes = Vec::new();
        if am_i_finalizer(&self.pacemaker, &self.my_keys) && is_node_safe(&self.state, &proposal)? {
            let finalizers = self.pacemaker.get_finalizers();
            for keypair in &self.finalizer_keys {
                if finalizers.contains(&keypair.public()) {
                    votes.push(Vote::new(keypair, proposal.proposal_id));
                }
            }
            if !votes.is_empty() {
                self.state.v_height = Some(proposal.height());
            }
        }

        // 5. Update the high QC, the lock, and the executed proposal.
        let schedule = Schedule::from_pacemaker(&self.pacemaker);
        self.state.update(&proposal, &schedule)?;

        // 6. Send votes and check for a change of leader.
        for vote in votes {
            self.send_vote(vote)?;
        }
        self.leader_rotation_check();

        Ok(())
    }

    /// Aggregate `vote` into the certificate for the in-flight proposal, if this replica is the leader.
    ///
    /// When the certificate first reaches quorum, it becomes the new high QC, and in event-driven mode
    /// the leader proposes the next phase right away.
    fn process_vote(&mut self, vote: Vote) -> Result<(), QcChainError> {
        if !am_i_leader(&self.pacemaker, &self.my_keys) {
            return Ok(());
        }

        match &self.current_qc {
            Some(current_qc) if current_qc.proposal_id == vote.proposal_id => {
                if current_qc.quorum_met() {
                    return Ok(());
                }
            }
            _ => return Ok(()),
        }

        let Some(proposal) = self.state.get_proposal(&vote.proposal_id).cloned() else {
            return Ok(());
        };

        let Some(finalizer) = vote.finalizer_key() else {
            log::warn!("Vote for {} carries an invalid finalizer key.", vote.proposal_id);
            return Ok(());
        };
        let schedule = Schedule::from_pacemaker(&self.pacemaker);
        let Some(pos) = schedule.finalizers.position(&finalizer) else {
            log::debug!("Vote for {} from a finalizer outside the schedule.", vote.proposal_id);
            return Ok(());
        };
        if !vote.is_correct() {
            log::warn!("Vote for {} carries an invalid signature.", vote.proposal_id);
            return Ok(());
        }

        let Some(current_qc) = self.current_qc.as_mut() else {
            return Ok(());
        };
        if !current_qc.aggregate(pos, vote.signature) {
            log::debug!("Duplicate vote for {}.", vote.proposal_id);
            return Ok(());
        }
        if !is_quorum_met(current_qc, &schedule, &proposal) {
            return Ok(());
        }

        current_qc.quorum_met = true;
        let quorum_certificate = current_qc.clone();
        Event::publish(
            &self.event_publisher,
            Event::CollectQC(CollectQCEvent {
                timestamp: SystemTime::now(),
                quorum_certificate: quorum_certificate.clone(),
            }),
        );

        self.state.update_high_qc(&quorum_certificate, &schedule);
        self.leader_rotation_check();

        if !self.chained_mode && proposal.phase_counter < PhaseCounter::DECIDE {
            let candidate = match self.pending_proposal_block {
                Some(block_id) => self.new_proposal_candidate(block_id, PhaseCounter::PREPARE),
                None => self.new_proposal_candidate(proposal.block_id, proposal.phase_counter.next()),
            };
            self.propose(candidate)?;
        }

        Ok(())
    }

    fn process_new_view(&mut self, new_view: NewView) {
        if let Some(high_qc) = &new_view.high_qc {
            let schedule = Schedule::from_pacemaker(&self.pacemaker);
            self.state.update_high_qc(high_qc, &schedule);
        }
    }

    /// As the leader, build a proposal for `new_block`, or defer it if the in-flight proposal has not
    /// reached quorum yet.
    fn process_new_block(&mut self, new_block: NewBlock) -> Result<(), QcChainError> {
        if !am_i_leader(&self.pacemaker, &self.my_keys) {
            return Ok(());
        }

        if let Some(justify) = &new_block.justify {
            let schedule = Schedule::from_pacemaker(&self.pacemaker);
            self.state.update_high_qc(justify, &schedule);
        }

        if self.current_qc.as_ref().is_some_and(|qc| !qc.quorum_met()) {
            log::debug!("Deferring block {} until the in-flight proposal reaches quorum.", new_block.block_id);
            self.pending_proposal_block = Some(new_block.block_id);
            return Ok(());
        }

        let candidate = self.new_proposal_candidate(new_block.block_id, PhaseCounter::PREPARE);
        self.propose(candidate)
    }

    /// If the leader is about to change, stop collecting votes and send this replica's high QC to the
    /// next leader.
    fn leader_rotation_check(&mut self) {
        let leader = self.pacemaker.get_leader();
        let next_leader = self.pacemaker.get_next_leader();
        if leader == next_leader {
            return;
        }

        Event::publish(
            &self.event_publisher,
            Event::RotateLeader(RotateLeaderEvent {
                timestamp: SystemTime::now(),
                leader,
                next_leader,
            }),
        );

        self.reset_qc(None);
        self.pending_proposal_block = None;
        self.send_new_view(NewView {
            high_qc: self.state.high_qc.clone(),
        });
    }

    /// Build a proposal for `block_id` in `phase_counter` that extends the leaf and is justified by the
    /// high QC.
    fn new_proposal_candidate(&self, block_id: BlockId, phase_counter: PhaseCounter) -> Proposal {
        let parent_id = self.state.b_leaf;
        let justify = self.state.high_qc.clone();
        let final_on_qc = implied_final_on_qc(
            &self.state.proposals,
            parent_id.as_ref(),
            justify.as_ref().map(|qc| &qc.proposal_id),
        );
        Proposal::new(block_id, parent_id, phase_counter, justify, final_on_qc)
    }

    /// Start collecting votes for `candidate`, make it the leaf, and send it.
    fn propose(&mut self, candidate: Proposal) -> Result<(), QcChainError> {
        self.reset_qc(Some(candidate.proposal_id));
        self.pending_proposal_block = None;
        self.state.b_leaf = Some(candidate.proposal_id);
        self.send_proposal(candidate)
    }

    fn reset_qc(&mut self, proposal_id: Option<ProposalId>) {
        self.current_qc = proposal_id.map(QuorumCertificate::new);
    }

    fn send_proposal(&mut self, proposal: Proposal) -> Result<(), QcChainError> {
        Event::publish(
            &self.event_publisher,
            Event::Propose(ProposeEvent {
                timestamp: SystemTime::now(),
                proposal: proposal.clone(),
            }),
        );
        self.pacemaker.send_hs_proposal_msg(&self.id, proposal.clone());
        self.process_proposal(proposal)
    }

    fn send_vote(&mut self, vote: Vote) -> Result<(), QcChainError> {
        Event::publish(
            &self.event_publisher,
            Event::Vote(VoteEvent {
                timestamp: SystemTime::now(),
                vote: vote.clone(),
            }),
        );
        self.pacemaker.send_hs_vote_msg(&self.id, vote.clone());
        self.process_vote(vote)
    }

    fn send_new_view(&mut self, new_view: NewView) {
        Event::publish(
            &self.event_publisher,
            Event::NewView(NewViewEvent {
                timestamp: SystemTime::now(),
                new_view: new_view.clone(),
            }),
        );
        self.pacemaker.send_hs_new_view_msg(&self.id, new_view);
    }

    fn send_new_block(&mut self, new_block: NewBlock) {
        Event::publish(
            &self.event_publisher,
            Event::NewBlock(NewBlockEvent {
                timestamp: SystemTime::now(),
                new_block: new_block.clone(),
            }),
        );
        self.pacemaker.send_hs_new_block_msg(&self.id, new_block);
    }
}

/// The different ways a call to a method of the `QcChain` struct can fail.
#[derive(Debug)]
pub enum QcChainError {
    ChainStateError(ChainStateError),
}

impl From<ChainStateError> for QcChainError {
    fn from(value: ChainStateError) -> Self {
        QcChainError::ChainStateError(value)
    }
}

impl Display for QcChainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            QcChainError::ChainStateError(e) => write!(f, "chain state error: {}", e),
        }
    }
}

impl std::error::Error for QcChainError {}

#[cfg(test)]
mod tests {
    use std::sync::{
        mpsc::{self, Receiver},
        Arc, Mutex,
    };

    use rand_core::OsRng;

    use super::*;
    use crate::hotstuff::messages::HotStuffMessage;
    use crate::replica::QcChainHandle;
    use crate::types::{
        data_types::{BlockNumber, ProposalHeight, TotalPower},
        finalizers::FinalizerSet,
    };

    struct MockState {
        proposer: VerifyingKey,
        leader: VerifyingKey,
        next_leader: VerifyingKey,
        finalizers: FinalizerSet,
        quorum_threshold: TotalPower,
        current_block_id: BlockId,
        sent: Vec<HotStuffMessage>,
    }

    /// Pacemaker with fixed roles that records outbound messages instead of delivering them.
    #[derive(Clone)]
    struct MockPacemaker(Arc<Mutex<MockState>>);

    impl MockPacemaker {
        fn new(me: VerifyingKey, finalizers: FinalizerSet, quorum_threshold: u128) -> Self {
            MockPacemaker(Arc::new(Mutex::new(MockState {
                proposer: me,
                leader: me,
                next_leader: me,
                finalizers,
                quorum_threshold: TotalPower::new(quorum_threshold),
                current_block_id: block(1),
                sent: Vec::new(),
            })))
        }

        fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
            f(&mut self.0.lock().unwrap())
        }

        fn take_sent(&self) -> Vec<HotStuffMessage> {
            self.with(|s| std::mem::take(&mut s.sent))
        }
    }

    impl Pacemaker for MockPacemaker {
        fn get_quorum_threshold(&self) -> TotalPower {
            self.with(|s| s.quorum_threshold)
        }

        fn get_current_block_id(&self) -> BlockId {
            self.with(|s| s.current_block_id)
        }

        fn get_proposer(&self) -> VerifyingKey {
            self.with(|s| s.proposer)
        }

        fn get_leader(&self) -> VerifyingKey {
            self.with(|s| s.leader)
        }

        fn get_next_leader(&self) -> VerifyingKey {
            self.with(|s| s.next_leader)
        }

        fn get_finalizers(&self) -> FinalizerSet {
            self.with(|s| s.finalizers.clone())
        }

        fn register_listener(&mut self, _id: VerifyingKey, _listener: QcChainHandle<Self>) {}

        fn send_hs_proposal_msg(&mut self, _id: &VerifyingKey, msg: Proposal) {
            self.with(|s| s.sent.push(HotStuffMessage::Proposal(msg)))
        }

        fn send_hs_vote_msg(&mut self, _id: &VerifyingKey, msg: Vote) {
            self.with(|s| s.sent.push(HotStuffMessage::Vote(msg)))
        }

        fn send_hs_new_view_msg(&mut self, _id: &VerifyingKey, msg: NewView) {
            self.with(|s| s.sent.push(HotStuffMessage::NewView(msg)))
        }

        fn send_hs_new_block_msg(&mut self, _id: &VerifyingKey, msg: NewBlock) {
            self.with(|s| s.sent.push(HotStuffMessage::NewBlock(msg)))
        }
    }

    fn block(num: u32) -> BlockId {
        BlockId::from_parts(BlockNumber::new(num), [num as u8; 32])
    }

    fn signing_keys(n: usize) -> Vec<SigningKey> {
        let mut csprg = OsRng {};
        (0..n).map(|_| SigningKey::generate(&mut csprg)).collect()
    }

    /// A round driver holding the first of `n` keys, in a schedule of all `n` keys.
    fn setup(n: usize, quorum_threshold: u128) -> (QcChain<MockPacemaker>, MockPacemaker, Vec<SigningKey>, Receiver<Event>) {
        let keys = signing_keys(n);
        let me = keys[0].verifying_key();
        let finalizers = FinalizerSet::from_keys(keys.iter().map(|k| k.verifying_key()));
        let pacemaker = MockPacemaker::new(me, finalizers, quorum_threshold);
        let (event_publisher, events) = mpsc::channel();
        let qc_chain = QcChain::new(me, vec![keys[0].clone()], false, pacemaker.clone(), Some(event_publisher));
        (qc_chain, pacemaker, keys, events)
    }

    fn proposals(sent: &[HotStuffMessage]) -> Vec<&Proposal> {
        sent.iter()
            .filter_map(|msg| match msg {
                HotStuffMessage::Proposal(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn height(num: u32, phase: u8) -> ProposalHeight {
        ProposalHeight::new(BlockNumber::new(num), PhaseCounter::new(phase))
    }

    #[test]
    fn lone_leader_runs_all_four_phases_on_one_beat() {
        let (mut qc_chain, pacemaker, _, events) = setup(1, 1);

        qc_chain.on_beat();

        let sent = pacemaker.take_sent();
        let phases: Vec<u8> = proposals(&sent).iter().map(|p| p.phase_counter.int()).collect();
        assert_eq!(phases, vec![0, 1, 2, 3]);

        let state = qc_chain.state();
        let height_of = |id: Option<ProposalId>| id.and_then(|id| state.get_proposal(&id)).map(|p| p.height());
        assert_eq!(height_of(state.high_qc.as_ref().map(|qc| qc.proposal_id)), Some(height(1, 3)));
        assert_eq!(height_of(state.b_lock), Some(height(1, 1)));
        assert_eq!(height_of(state.b_exec), Some(height(1, 0)));
        assert_eq!(state.block_exec, Some(block(1)));
        assert_eq!(state.v_height, Some(height(1, 3)));

        let commits = events
            .try_iter()
            .filter(|e| matches!(e, Event::CommitProposal(_)))
            .count();
        assert_eq!(commits, 1);

        pacemaker.with(|s| s.current_block_id = block(2));
        qc_chain.on_beat();

        let state = qc_chain.state();
        let exec = state.b_exec.and_then(|id| state.get_proposal(&id)).map(|p| p.height());
        assert_eq!(exec, Some(height(2, 0)));
        let commits: Vec<ProposalHeight> = events
            .try_iter()
            .filter_map(|e| match e {
                Event::CommitProposal(e) => Some(e.height),
                _ => None,
            })
            .collect();
        assert_eq!(commits, vec![height(1, 1), height(1, 2), height(1, 3), height(2, 0)]);
    }

    #[test]
    fn chained_mode_proposes_once_per_beat() {
        let keys = signing_keys(1);
        let me = keys[0].verifying_key();
        let pacemaker = MockPacemaker::new(me, FinalizerSet::from_keys([me]), 1);
        let mut qc_chain = QcChain::new(me, keys, true, pacemaker.clone(), None);

        for num in 1..=4 {
            pacemaker.with(|s| s.current_block_id = block(num));
            qc_chain.on_beat();
        }

        let sent = pacemaker.take_sent();
        let blocks: Vec<u32> = proposals(&sent).iter().map(|p| p.block_num().int()).collect();
        assert_eq!(blocks, vec![1, 2, 3, 4]);
        assert!(proposals(&sent).iter().all(|p| p.phase_counter == PhaseCounter::PREPARE));

        let state = qc_chain.state();
        assert!(state.chained_mode);
        assert_eq!(state.block_exec, Some(block(1)));
    }

    #[test]
    fn proposer_that_is_not_leader_announces_a_new_block() {
        let (mut qc_chain, pacemaker, keys, _) = setup(2, 2);
        pacemaker.with(|s| s.leader = keys[1].verifying_key());

        qc_chain.on_beat();

        let sent = pacemaker.take_sent();
        assert_eq!(
            sent,
            vec![HotStuffMessage::NewBlock(NewBlock {
                block_id: block(1),
                justify: None
            })]
        );
    }

    #[test]
    fn replica_without_a_role_ignores_the_beat() {
        let (mut qc_chain, pacemaker, keys, _) = setup(2, 2);
        pacemaker.with(|s| {
            s.proposer = keys[1].verifying_key();
            s.leader = keys[1].verifying_key();
            s.next_leader = keys[1].verifying_key();
        });

        qc_chain.on_beat();

        assert!(pacemaker.take_sent().is_empty());
        assert_eq!(qc_chain.state().proposals.len(), 0);
    }

    #[test]
    fn leader_defers_new_block_until_quorum() {
        let (mut qc_chain, pacemaker, keys, _) = setup(2, 2);
        let other = Keypair::new(keys[1].clone());

        qc_chain.on_beat();
        let sent = pacemaker.take_sent();
        let p0 = proposals(&sent)[0].clone();
        assert_eq!(qc_chain.state().current_qc.map(|qc| qc.active_finalizers.count()), Some(1));

        qc_chain.on_hs_new_block_msg(NewBlock {
            block_id: block(2),
            justify: None,
        });
        assert_eq!(qc_chain.state().pending_proposal_block, Some(block(2)));
        assert!(pacemaker.take_sent().is_empty());

        qc_chain.on_hs_vote_msg(Vote::new(&other, p0.proposal_id));

        let sent = pacemaker.take_sent();
        let next = proposals(&sent)[0];
        assert_eq!(next.block_id, block(2));
        assert_eq!(next.phase_counter, PhaseCounter::PREPARE);
        assert_eq!(next.justify_id(), Some(p0.proposal_id));
        assert_eq!(next.parent_id, Some(p0.proposal_id));
        assert_eq!(qc_chain.state().pending_proposal_block, None);
    }

    #[test]
    fn bad_and_duplicate_votes_are_not_counted() {
        let (mut qc_chain, pacemaker, keys, _) = setup(3, 3);
        let other = Keypair::new(keys[1].clone());
        let outsider = Keypair::new(signing_keys(1).remove(0));

        qc_chain.on_beat();
        let sent = pacemaker.take_sent();
        let p0 = proposals(&sent)[0].clone();
        let count = |qc_chain: &QcChain<MockPacemaker>| {
            qc_chain.state().current_qc.map(|qc| qc.active_finalizers.count())
        };
        assert_eq!(count(&qc_chain), Some(1));

        let mut forged = Vote::new(&other, p0.proposal_id);
        forged.signature = Vote::new(&outsider, p0.proposal_id).signature;
        qc_chain.on_hs_vote_msg(forged);
        qc_chain.on_hs_vote_msg(Vote::new(&outsider, p0.proposal_id));
        qc_chain.on_hs_vote_msg(Vote::new(&Keypair::new(keys[0].clone()), p0.proposal_id));
        assert_eq!(count(&qc_chain), Some(1));

        qc_chain.on_hs_vote_msg(Vote::new(&other, p0.proposal_id));
        qc_chain.on_hs_vote_msg(Vote::new(&other, p0.proposal_id));
        assert_eq!(count(&qc_chain), Some(2));
        assert!(qc_chain.state().high_qc.is_none());
    }

    #[test]
    fn leader_change_sends_new_view_and_drops_in_flight_qc() {
        let (mut qc_chain, pacemaker, keys, events) = setup(2, 2);
        pacemaker.with(|s| s.next_leader = keys[1].verifying_key());

        qc_chain.on_beat();

        let sent = pacemaker.take_sent();
        assert!(sent.contains(&HotStuffMessage::NewView(NewView { high_qc: None })));
        assert_eq!(qc_chain.state().current_qc, None);
        assert!(events.try_iter().any(|e| matches!(e, Event::RotateLeader(_))));
    }

    #[test]
    fn unjustifiable_and_tampered_proposals_are_dropped() {
        let (mut qc_chain, _, _, _) = setup(2, 2);
        let unknown = Proposal::new(block(1), None, PhaseCounter::PREPARE, None, None);

        let orphan = Proposal::new(
            block(1),
            Some(unknown.proposal_id),
            PhaseCounter::new(1),
            Some(QuorumCertificate::new(unknown.proposal_id)),
            None,
        );
        qc_chain.on_hs_proposal_msg(orphan);

        let mut tampered = Proposal::new(block(2), None, PhaseCounter::PREPARE, None, None);
        tampered.block_id = block(3);
        qc_chain.on_hs_proposal_msg(tampered);

        assert!(qc_chain.state().proposals.is_empty());
        assert_eq!(qc_chain.state().v_height, None);
    }

    #[test]
    fn proposals_with_looping_parent_links_are_dropped() {
        let (mut qc_chain, pacemaker, _, _) = setup(1, 1);
        qc_chain.on_beat();
        let state = qc_chain.state();
        assert!(state.b_lock.is_some());
        let leaf = state.b_leaf.unwrap();
        let stored = state.proposals.len();

        let mut looped = Proposal::new(block(2), None, PhaseCounter::PREPARE, None, None);
        looped.parent_id = Some(looped.proposal_id);
        qc_chain.on_hs_proposal_msg(looped.clone());

        // Height 1.0, on top of the leaf at 1.3.
        let backwards = Proposal::new(
            BlockId::from_parts(BlockNumber::new(1), [0xee; 32]),
            Some(leaf),
            PhaseCounter::PREPARE,
            None,
            None,
        );
        qc_chain.on_hs_proposal_msg(backwards.clone());

        assert!(qc_chain.get_proposal(&looped.proposal_id).is_none());
        assert!(qc_chain.get_proposal(&backwards.proposal_id).is_none());
        assert_eq!(qc_chain.state().proposals.len(), stored);

        // The replica still makes progress.
        pacemaker.with(|s| s.current_block_id = block(3));
        qc_chain.on_beat();
        let state = qc_chain.state();
        let exec = state.b_exec.and_then(|id| state.get_proposal(&id)).map(|p| p.block_num().int());
        assert_eq!(exec, Some(3));
    }

    #[test]
    fn second_proposal_at_a_height_is_stored_and_reported() {
        let (mut qc_chain, _, _, events) = setup(2, 2);
        let first = Proposal::new(block(5), None, PhaseCounter::PREPARE, None, None);
        let second = Proposal::new(
            BlockId::from_parts(BlockNumber::new(5), [0xee; 32]),
            None,
            PhaseCounter::PREPARE,
            None,
            None,
        );

        qc_chain.on_hs_proposal_msg(first.clone());
        qc_chain.on_hs_proposal_msg(second.clone());
        qc_chain.on_hs_proposal_msg(second.clone());

        assert!(qc_chain.get_proposal(&first.proposal_id).is_some());
        assert!(qc_chain.get_proposal(&second.proposal_id).is_some());
        // Voted for the first only.
        assert_eq!(qc_chain.state().v_height, Some(first.height()));

        let equivocations: Vec<(ProposalId, ProposalId)> = events
            .try_iter()
            .filter_map(|e| match e {
                Event::Equivocation(e) => Some((e.existing, e.proposal)),
                _ => None,
            })
            .collect();
        assert_eq!(equivocations, vec![(first.proposal_id, second.proposal_id)]);
    }
}
