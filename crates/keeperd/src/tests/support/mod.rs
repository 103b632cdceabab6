//! Test harness utilities shared by unit and behavioural suites.

pub(crate) mod archive;
pub(crate) mod buffer;
pub(crate) mod callback;
pub(crate) mod fake_ipfs;
pub(crate) mod http;
pub(crate) mod reporter;
