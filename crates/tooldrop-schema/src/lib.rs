//! Shared data types for tooldrop.
//!
//! Everything in this crate is plain data: the normalized host platform and
//! its per-source renderings, release/asset records as fetched from a release
//! catalog, and the byte signatures used to recognize archives and executables.
//! No network or filesystem access happens here.

pub mod format;
pub mod platform;
pub mod release;

// Re-exports
pub use format::{ArchiveFormat, ExecutableFormat};
pub use platform::{
    ArchFamily, OsFamily, PlatformError, PlatformNaming, PlatformPattern, PlatformSelector,
};
pub use release::{Asset, CatalogEntry, Release};
