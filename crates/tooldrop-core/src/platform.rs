//! Host platform detection.

use tooldrop_schema::{PlatformError, PlatformPattern, PlatformSelector};

/// Identify the running host.
///
/// Reads the compile-time OS and architecture of this binary, which is the
/// host it runs on. Called once per invocation; the result is passed down by
/// value and never recomputed.
///
/// # Errors
///
/// Returns [`PlatformError::Unsupported`] if either axis has no known family.
pub fn identify() -> Result<PlatformPattern, PlatformError> {
    PlatformPattern::from_names(std::env::consts::OS, std::env::consts::ARCH)
}

/// Resolve the platform selector for a run.
///
/// An explicit override is accepted verbatim and skips host detection
/// entirely, so an unsupported host can still be served by a caller who
/// knows the asset naming.
///
/// # Errors
///
/// Fails only when no override is given and the host is unsupported.
pub fn select(explicit: Option<&str>) -> Result<PlatformSelector, PlatformError> {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(literal) => Ok(PlatformSelector::Explicit(literal.to_string())),
        None => identify().map(PlatformSelector::Host),
    }
}
