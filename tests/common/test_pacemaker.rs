//! A pacemaker driven by the test thread.
//!
//! Roles, the schedule, and the current block are set explicitly. Messages are queued as they are sent
//! and only delivered when the test calls [`TestPacemaker::dispatch`], which makes every interleaving
//! reproducible.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use ed25519_dalek::VerifyingKey;
use qc_chain::{
    hotstuff::messages::{HotStuffMessage, NewBlock, NewView, Proposal, Vote},
    pacemaker::Pacemaker,
    replica::QcChainHandle,
    types::{
        data_types::{BlockId, BlockNumber, TotalPower},
        finalizers::FinalizerSet,
    },
};
use rand::{rngs::StdRng, seq::SliceRandom};

/// A message waiting for delivery, with the id of the replica that sent it.
pub(crate) type QueuedMessage = (VerifyingKey, HotStuffMessage);

#[derive(Clone)]
pub(crate) struct TestPacemaker(Arc<Mutex<TestPacemakerState>>);

struct TestPacemakerState {
    proposer: VerifyingKey,
    leader: VerifyingKey,
    next_leader: VerifyingKey,
    finalizers: FinalizerSet,
    quorum_threshold: TotalPower,
    current_block_id: BlockId,
    replicas: Vec<(VerifyingKey, QcChainHandle<TestPacemaker>)>,
    deactivated: HashSet<VerifyingKey>,
    pending: Vec<QueuedMessage>,
}

impl TestPacemaker {
    /// Create a pacemaker in which every one of `finalizers` has a power of 1, and the first finalizer is
    /// the proposer, the leader, and the next leader.
    pub(crate) fn new(finalizers: &[VerifyingKey], quorum_threshold: u128) -> TestPacemaker {
        let first = finalizers[0];
        TestPacemaker(Arc::new(Mutex::new(TestPacemakerState {
            proposer: first,
            leader: first,
            next_leader: first,
            finalizers: FinalizerSet::from_keys(finalizers.iter().copied()),
            quorum_threshold: TotalPower::new(quorum_threshold),
            current_block_id: BlockId::from_parts(BlockNumber::new(0), [0; 32]),
            replicas: Vec::new(),
            deactivated: HashSet::new(),
            pending: Vec::new(),
        })))
    }

    fn lock(&self) -> MutexGuard<'_, TestPacemakerState> {
        self.0.lock().unwrap()
    }

    pub(crate) fn set_proposer(&self, proposer: VerifyingKey) {
        self.lock().proposer = proposer;
    }

    pub(crate) fn set_leader(&self, leader: VerifyingKey) {
        self.lock().leader = leader;
    }

    pub(crate) fn set_next_leader(&self, next_leader: VerifyingKey) {
        self.lock().next_leader = next_leader;
    }

    pub(crate) fn set_finalizers(&self, finalizers: FinalizerSet) {
        self.lock().finalizers = finalizers;
    }

    pub(crate) fn set_current_block_id(&self, block_id: BlockId) {
        self.lock().current_block_id = block_id;
    }

    /// Stop delivering messages and beats to `replica`.
    pub(crate) fn deactivate(&self, replica: VerifyingKey) {
        self.lock().deactivated.insert(replica);
    }

    pub(crate) fn activate(&self, replica: VerifyingKey) {
        self.lock().deactivated.remove(&replica);
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Append `messages` to the queue, as if they had been sent through this pacemaker.
    pub(crate) fn pipe(&self, messages: Vec<QueuedMessage>) {
        self.lock().pending.extend(messages);
    }

    /// Put the queued messages in a random order.
    pub(crate) fn shuffle_pending(&self, rng: &mut StdRng) {
        self.lock().pending.shuffle(rng);
    }

    /// Queue a second copy of every queued message.
    pub(crate) fn duplicate_pending(&self) {
        let mut state = self.lock();
        let copies = state.pending.clone();
        state.pending.extend(copies);
    }

    /// Start a round on the proposer, if it is active. A proposer that is not the leader hands its block
    /// to the leader with a new block message.
    pub(crate) fn beat(&self) {
        let proposer = self.lock().proposer;
        let handle = {
            let state = self.lock();
            state
                .replicas
                .iter()
                .find(|(id, _)| *id == proposer && !state.deactivated.contains(id))
                .map(|(_, handle)| handle.clone())
        };
        if let Some(handle) = handle {
            handle.on_beat();
        }
    }

    /// Deliver every queued message to every active replica except its sender. Messages sent while
    /// dispatching stay queued for the next call.
    pub(crate) fn dispatch(&self, memo: &str) -> Vec<QueuedMessage> {
        self.dispatch_matching(memo, |_| true)
    }

    /// Like [`dispatch`](Self::dispatch), but only for messages that satisfy `filter`. The others stay
    /// queued, in order, ahead of messages sent while dispatching.
    pub(crate) fn dispatch_matching(
        &self,
        memo: &str,
        filter: impl Fn(&HotStuffMessage) -> bool,
    ) -> Vec<QueuedMessage> {
        let queue = std::mem::take(&mut self.lock().pending);
        let (dispatched, kept): (Vec<QueuedMessage>, Vec<QueuedMessage>) =
            queue.into_iter().partition(|(_, msg)| filter(msg));

        for (sender, msg) in &dispatched {
            for handle in self.active_replicas(Some(sender)) {
                match msg {
                    HotStuffMessage::Proposal(proposal) => handle.on_hs_proposal_msg(proposal.clone()),
                    HotStuffMessage::Vote(vote) => handle.on_hs_vote_msg(vote.clone()),
                    HotStuffMessage::NewView(new_view) => handle.on_hs_new_view_msg(new_view.clone()),
                    HotStuffMessage::NewBlock(new_block) => handle.on_hs_new_block_msg(new_block.clone()),
                }
            }
        }

        {
            let mut state = self.lock();
            let sent_meanwhile = std::mem::replace(&mut state.pending, kept);
            state.pending.extend(sent_meanwhile);
        }

        log::debug!(" === {}: dispatched {} messages", memo, dispatched.len());
        dispatched
    }

    // Handles are cloned out so that the lock is not held while a replica runs (it calls back into the
    // pacemaker).
    fn active_replicas(&self, except: Option<&VerifyingKey>) -> Vec<QcChainHandle<TestPacemaker>> {
        let state = self.lock();
        state
            .replicas
            .iter()
            .filter(|(id, _)| Some(id) != except && !state.deactivated.contains(id))
            .map(|(_, handle)| handle.clone())
            .collect()
    }

    fn enqueue(&self, sender: &VerifyingKey, msg: HotStuffMessage) {
        self.lock().pending.push((*sender, msg));
    }
}

impl Pacemaker for TestPacemaker {
    fn get_quorum_threshold(&self) -> TotalPower {
        self.lock().quorum_threshold
    }

    fn get_current_block_id(&self) -> BlockId {
        self.lock().current_block_id
    }

    fn get_proposer(&self) -> VerifyingKey {
        self.lock().proposer
    }

    fn get_leader(&self) -> VerifyingKey {
        self.lock().leader
    }

    fn get_next_leader(&self) -> VerifyingKey {
        self.lock().next_leader
    }

    fn get_finalizers(&self) -> FinalizerSet {
        self.lock().finalizers.clone()
    }

    fn register_listener(&mut self, id: VerifyingKey, listener: QcChainHandle<Self>) {
        self.lock().replicas.push((id, listener));
    }

    fn send_hs_proposal_msg(&mut self, id: &VerifyingKey, msg: Proposal) {
        self.enqueue(id, HotStuffMessage::Proposal(msg));
    }

    fn send_hs_vote_msg(&mut self, id: &VerifyingKey, msg: Vote) {
        self.enqueue(id, HotStuffMessage::Vote(msg));
    }

    fn send_hs_new_view_msg(&mut self, id: &VerifyingKey, msg: NewView) {
        self.enqueue(id, HotStuffMessage::NewView(msg));
    }

    fn send_hs_new_block_msg(&mut self, id: &VerifyingKey, msg: NewBlock) {
        self.enqueue(id, HotStuffMessage::NewBlock(msg));
    }
}
