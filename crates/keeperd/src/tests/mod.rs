//! Test suites for the daemon keeper.

pub(crate) mod support;
