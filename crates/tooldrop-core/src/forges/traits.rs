use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tooldrop_schema::Release;

/// A remote source that can list available releases (e.g. a GitHub repository)
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Unique identifier for this source instance (e.g. "Z3Prover/z3")
    fn key(&self) -> String;

    /// Fetch up to `max_count` of the most recent releases from this source
    async fn fetch_releases(&self, client: &Client, max_count: usize) -> Result<Vec<Release>>;
}
