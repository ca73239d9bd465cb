use std::sync::{Arc, Mutex};

use ed25519_dalek::{SigningKey, VerifyingKey};
use qc_chain::{
    events::{CommitProposalEvent, EquivocationEvent, FinalityViolationEvent},
    replica::{Configuration, QcChainHandle, Replica, ReplicaSpec},
    state::finalizer_state::FinalizerState,
    types::data_types::{BlockId, ProposalHeight, ProposalId},
};

use super::{fixtures::signing_keys, test_pacemaker::TestPacemaker};

/// What a node's event handlers saw.
#[derive(Clone, Debug, Default)]
pub(crate) struct Observed {
    /// Committed proposals, in the order their commit events were published.
    pub(crate) commits: Vec<(ProposalId, BlockId, ProposalHeight)>,
    pub(crate) finality_violations: usize,
    pub(crate) equivocations: usize,
}

/// A replica that holds exactly one finalizer key, and whose id is that key's verifying key.
pub(crate) struct Node {
    verifying_key: VerifyingKey,
    observed: Arc<Mutex<Observed>>,
    replica: Replica<TestPacemaker>,
}

impl Node {
    pub(crate) fn new(
        signing_key: SigningKey,
        pacemaker: TestPacemaker,
        chained_mode: bool,
        initial_state: Option<FinalizerState>,
    ) -> Node {
        let verifying_key = signing_key.verifying_key();
        let observed = Arc::new(Mutex::new(Observed::default()));

        let configuration = Configuration::builder()
            .id(verifying_key)
            .finalizer_keys(vec![signing_key])
            .chained_mode(chained_mode)
            .log_events(true)
            .build();

        let on_commit = {
            let observed = observed.clone();
            move |event: &CommitProposalEvent| {
                observed
                    .lock()
                    .unwrap()
                    .commits
                    .push((event.proposal, event.block, event.height))
            }
        };
        let on_finality_violation = {
            let observed = observed.clone();
            move |_: &FinalityViolationEvent| observed.lock().unwrap().finality_violations += 1
        };
        let on_equivocation = {
            let observed = observed.clone();
            move |_: &EquivocationEvent| observed.lock().unwrap().equivocations += 1
        };

        let replica = match initial_state {
            Some(initial_state) => ReplicaSpec::builder()
                .pacemaker(pacemaker)
                .configuration(configuration)
                .initial_state(initial_state)
                .on_commit_proposal(on_commit)
                .on_finality_violation(on_finality_violation)
                .on_equivocation(on_equivocation)
                .build()
                .start(),
            None => ReplicaSpec::builder()
                .pacemaker(pacemaker)
                .configuration(configuration)
                .on_commit_proposal(on_commit)
                .on_finality_violation(on_finality_violation)
                .on_equivocation(on_equivocation)
                .build()
                .start(),
        };

        Node {
            verifying_key,
            observed,
            replica,
        }
    }

    pub(crate) fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    pub(crate) fn state(&self) -> FinalizerState {
        self.replica.state()
    }

    pub(crate) fn handle(&self) -> &QcChainHandle<TestPacemaker> {
        self.replica.handle()
    }

    /// Stop the node's event bus once it has handled every event published so far, and return what
    /// the handlers saw.
    pub(crate) fn shut_down(self) -> Observed {
        let Node {
            observed, replica, ..
        } = self;
        drop(replica);
        let observed = observed.lock().unwrap().clone();
        observed
    }
}

/// Start `n` single-key nodes on one shared pacemaker. The first node is the proposer, the leader, and
/// the next leader.
pub(crate) fn start_cluster(n: usize, quorum_threshold: u128, chained_mode: bool) -> (TestPacemaker, Vec<Node>) {
    let keys = signing_keys(n);
    let states = vec![None; n];
    start_cluster_from(keys, quorum_threshold, chained_mode, states)
}

/// Start one node per key on a fresh pacemaker, each restored from the matching entry of `states`.
pub(crate) fn start_cluster_from(
    keys: Vec<SigningKey>,
    quorum_threshold: u128,
    chained_mode: bool,
    states: Vec<Option<FinalizerState>>,
) -> (TestPacemaker, Vec<Node>) {
    let verifying_keys: Vec<VerifyingKey> = keys.iter().map(|key| key.verifying_key()).collect();
    let pacemaker = TestPacemaker::new(&verifying_keys, quorum_threshold);
    let nodes = keys
        .into_iter()
        .zip(states)
        .map(|(key, state)| Node::new(key, pacemaker.clone(), chained_mode, state))
        .collect();
    (pacemaker, nodes)
}
