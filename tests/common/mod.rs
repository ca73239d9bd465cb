pub(crate) mod fixtures;

pub(crate) mod logging;

pub(crate) mod node;

pub(crate) mod test_pacemaker;
