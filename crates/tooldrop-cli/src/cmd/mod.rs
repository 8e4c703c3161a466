//! Subcommand implementations.

pub mod completions;
pub mod install;
pub mod tools;
