pub mod builder;
pub mod catalog;
pub mod config;
pub mod forges;
pub mod installer;
pub mod io;
pub mod paths;
pub mod platform;
pub mod priority;
pub mod resolver;
pub mod shell_env;
pub mod tools;

pub mod reporter;

pub use paths::*;
pub use reporter::{NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("tooldrop/", env!("CARGO_PKG_VERSION"));
