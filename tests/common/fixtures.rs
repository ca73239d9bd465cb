//! Keys and block ids shared by the integration tests.

use ed25519_dalek::SigningKey;
use qc_chain::{
    state::finalizer_state::FinalizerState,
    types::data_types::{BlockId, BlockNumber, ProposalHeight, ProposalId},
};
use rand_core::OsRng;

/// Generate `n` fresh finalizer signing keys.
pub(crate) fn signing_keys(n: usize) -> Vec<SigningKey> {
    let mut csprg = OsRng {};
    (0..n).map(|_| SigningKey::generate(&mut csprg)).collect()
}

/// The id of block number `num`. Different `fork`s give different blocks with the same number.
pub(crate) fn block(num: u32, fork: u8) -> BlockId {
    let mut tail = [0xb0 ^ fork; 32];
    tail[31] = num as u8;
    BlockId::from_parts(BlockNumber::new(num), tail)
}

/// Resolve a cursor of `state` into the `(block_num, phase_counter)` of the proposal it refers to.
pub(crate) fn position(state: &FinalizerState, cursor: Option<ProposalId>) -> Option<(u32, u8)> {
    let proposal = state.get_proposal(&cursor?)?;
    Some((proposal.block_num().int(), proposal.phase_counter.int()))
}

/// The positions of the leaf, the high QC, the lock, and the executed proposal, in that order.
pub(crate) fn cursors(state: &FinalizerState) -> [Option<(u32, u8)>; 4] {
    [
        position(state, state.b_leaf),
        position(state, state.high_qc.as_ref().map(|qc| qc.proposal_id)),
        position(state, state.b_lock),
        position(state, state.b_exec),
    ]
}

/// The `(block_num, phase_counter)` of each committed proposal, in commit order.
pub(crate) fn commit_positions(commits: &[(ProposalId, BlockId, ProposalHeight)]) -> Vec<(u32, u8)> {
    commits
        .iter()
        .map(|(_, _, height)| (height.block_num().int(), height.phase_counter().int()))
        .collect()
}
