//! Release catalog: concurrent fetch from every source, then merge into one
//! deduplicated, deterministically ordered list of logical releases.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use thiserror::Error;
use tooldrop_schema::{CatalogEntry, Release};

use crate::forges::ListingSource;

/// Per-source timeout for a release listing.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// How many tags to show when a version is not found.
const SUGGESTION_LIMIT: usize = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("release source {source_id} unreachable: {reason}")]
    SourceUnreachable { source_id: String, reason: String },

    #[error("no releases found in any source")]
    Empty,

    #[error("no pre-release versions found")]
    NoPrerelease,

    #[error("no stable release found (pass --pre-release to consider pre-releases)")]
    NoStable,

    #[error("version '{query}' not found. Available versions:\n  {}", available.join("\n  "))]
    UnknownVersion { query: String, available: Vec<String> },

    #[error("version '{query}' is ambiguous, matches: {}", candidates.join(", "))]
    Ambiguous {
        query: String,
        candidates: Vec<String>,
    },
}

/// Result of querying every source: whatever could be obtained, plus the
/// sources that could not be reached.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Releases, concatenated in source query order.
    pub releases: Vec<Release>,
    pub unreachable: Vec<CatalogError>,
}

/// Query every source concurrently.
///
/// A failing or timed-out source contributes nothing and is recorded in
/// [`FetchOutcome::unreachable`]; it never fails the whole fetch. Results are
/// only combined once every request has settled.
pub async fn fetch(
    client: &Client,
    sources: &[Box<dyn ListingSource>],
    max_count: usize,
    timeout: Duration,
) -> FetchOutcome {
    let requests = sources.iter().map(|source| async move {
        let key = source.key();
        let result =
            match tokio::time::timeout(timeout, source.fetch_releases(client, max_count)).await {
                Ok(Ok(releases)) => Ok(releases),
                Ok(Err(e)) => Err(format!("{e:#}")),
                Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
            };
        (key, result)
    });

    let mut outcome = FetchOutcome::default();
    for (key, result) in join_all(requests).await {
        match result {
            Ok(releases) => {
                tracing::debug!(source = %key, count = releases.len(), "fetched releases");
                outcome.releases.extend(releases);
            }
            Err(reason) => {
                tracing::warn!(source = %key, %reason, "release source unreachable");
                outcome.unreachable.push(CatalogError::SourceUnreachable {
                    source_id: key,
                    reason,
                });
            }
        }
    }
    outcome
}

/// Collapse releases into one entry per tag.
///
/// The entry's date is the earliest publication across its sources, its
/// source list keeps first-seen order, and it is a pre-release if any source
/// says so. Entries sort newest first with ties broken by tag ascending, then
/// the list is cut to `max_count`.
pub fn merge(releases: &[Release], max_count: usize) -> Vec<CatalogEntry> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut entries: Vec<CatalogEntry> = Vec::new();

    for release in releases {
        if let Some(&i) = index.get(release.tag.as_str()) {
            let entry = &mut entries[i];
            entry.earliest_published_at = entry.earliest_published_at.min(release.published_at);
            entry.prerelease |= release.prerelease;
            if !entry.sources.contains(&release.source_id) {
                entry.sources.push(release.source_id.clone());
            }
        } else {
            index.insert(&release.tag, entries.len());
            entries.push(CatalogEntry {
                tag: release.tag.clone(),
                earliest_published_at: release.published_at,
                prerelease: release.prerelease,
                sources: vec![release.source_id.clone()],
            });
        }
    }

    entries.sort_by(|a, b| {
        b.earliest_published_at
            .cmp(&a.earliest_published_at)
            .then_with(|| a.tag.cmp(&b.tag))
    });
    entries.truncate(max_count);
    entries
}

/// Merged catalog plus the raw per-source releases backing it.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    releases: Vec<Release>,
}

impl Catalog {
    pub fn new(releases: Vec<Release>, max_count: usize) -> Self {
        let entries = merge(&releases, max_count);
        Self { entries, releases }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every source's release for `tag`, in query order.
    pub fn releases_for(&self, tag: &str) -> Vec<&Release> {
        self.releases.iter().filter(|r| r.tag == tag).collect()
    }

    /// Newest stable entry, or newest pre-release when `prerelease` is set.
    pub fn latest(&self, prerelease: bool) -> Result<&CatalogEntry, CatalogError> {
        if self.entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        self.entries
            .iter()
            .find(|e| e.prerelease == prerelease)
            .ok_or(if prerelease {
                CatalogError::NoPrerelease
            } else {
                CatalogError::NoStable
            })
    }

    /// Find an entry by exact tag, then by unique case-insensitive substring.
    pub fn select(&self, query: &str) -> Result<&CatalogEntry, CatalogError> {
        if let Some(entry) = self.entries.iter().find(|e| e.tag == query) {
            return Ok(entry);
        }

        let candidates = self.matching(query);
        match candidates.as_slice() {
            [single] => Ok(single),
            [] => Err(CatalogError::UnknownVersion {
                query: query.to_string(),
                available: self
                    .entries
                    .iter()
                    .take(SUGGESTION_LIMIT)
                    .map(|e| e.tag.clone())
                    .collect(),
            }),
            many => Err(CatalogError::Ambiguous {
                query: query.to_string(),
                candidates: many.iter().map(|e| e.tag.clone()).collect(),
            }),
        }
    }

    /// Entries whose tag contains `query`, case-insensitively, in catalog order.
    pub fn matching(&self, query: &str) -> Vec<&CatalogEntry> {
        let needle = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.tag.to_lowercase().contains(&needle))
            .collect()
    }
}
