//! Command implementations.
//!
//! Each subcommand group is implemented in its own module.

pub(crate) mod bridge;
pub(crate) mod completions;
pub(crate) mod configure;
pub(crate) mod flash;
pub(crate) mod info;
pub(crate) mod target;
