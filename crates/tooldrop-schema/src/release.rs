//! Release records as fetched from a release catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// File name as published (e.g. `z3-4.13.0-x64-glibc-2.35.zip`).
    pub name: String,
    /// Declared size in bytes. Used for progress display only.
    pub size_bytes: u64,
    /// Direct download URL.
    pub download_url: String,
    /// Identifier of the source this asset was fetched from.
    pub source_id: String,
}

impl Asset {
    /// Declared size in mebibytes, for display.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// A tagged release as published by one source.
///
/// The same tag may be published by several sources; each publication is a
/// separate `Release` and together they form one logical release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Tag name, unique within its source.
    pub tag: String,
    /// Publication timestamp reported by the source.
    pub published_at: DateTime<Utc>,
    /// Whether the source marks this release as a pre-release.
    pub prerelease: bool,
    /// Identifier of the publishing source (e.g. `Z3Prover/z3`).
    pub source_id: String,
    /// Attached assets, in the order the source lists them.
    pub assets: Vec<Asset>,
}

/// Deduplicated, user-facing view of a logical release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Tag shared by every backing release.
    pub tag: String,
    /// Earliest publication time across all backing releases.
    pub earliest_published_at: DateTime<Utc>,
    /// True if any backing source marks the release as a pre-release.
    pub prerelease: bool,
    /// Sources publishing this tag, in the order they were queried.
    pub sources: Vec<String>,
}

impl CatalogEntry {
    /// Publication date as `YYYY-MM-DD`.
    pub fn date(&self) -> String {
        self.earliest_published_at.format("%Y-%m-%d").to_string()
    }
}
