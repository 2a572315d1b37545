//! Tooling & Integration Layer
//!
//! Command-line access to family graphs and the sync queue.

pub mod cli;

pub use cli::{Cli, CliContext, Commands, PersonCommands, SyncCommands};
