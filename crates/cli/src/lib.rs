//! veil-cli: operator CLI over the veil policy core's durable state.

pub mod cli;
pub mod commands;
pub mod logging;
