/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that determine what roles a round driver plays this round.
//!
//! A round driver can hold several finalizer keys, and can play any combination of the proposer,
//! leader, and finalizer roles at once. Roles are queried from the [`Pacemaker`] on every call and are
//! never cached.

use crate::pacemaker::Pacemaker;
use crate::types::crypto_primitives::VerifyingKey;

/// Whether one of `my_keys` is this round's proposer.
pub(crate) fn am_i_proposer<P: Pacemaker>(pacemaker: &P, my_keys: &[VerifyingKey]) -> bool {
    my_keys.contains(&pacemaker.get_proposer())
}

/// Whether one of `my_keys` is this round's leader.
pub(crate) fn am_i_leader<P: Pacemaker>(pacemaker: &P, my_keys: &[VerifyingKey]) -> bool {
    my_keys.contains(&pacemaker.get_leader())
}

/// Whether at least one of `my_keys` is in the finalizer schedule.
pub(crate) fn am_i_finalizer<P: Pacemaker>(pacemaker: &P, my_keys: &[VerifyingKey]) -> bool {
    let finalizers = pacemaker.get_finalizers();
    my_keys.iter().any(|key| finalizers.contains(key))
}
