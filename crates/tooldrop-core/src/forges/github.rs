//! GitHub releases API as a [`ListingSource`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tooldrop_schema::{Asset, Release};

use super::traits::ListingSource;

/// Public API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// The API refuses larger pages.
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    #[serde(default)]
    size: u64,
    browser_download_url: String,
}

/// Releases of one `owner/repo`.
#[derive(Debug, Clone)]
pub struct GitHubSource {
    repo: String,
    api_base: String,
    token: Option<String>,
}

impl GitHubSource {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            token: None,
        }
    }

    /// Point at a different API host (mirrors, tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn releases_url(&self, max_count: usize) -> String {
        format!(
            "{}/repos/{}/releases?per_page={}",
            self.api_base.trim_end_matches('/'),
            self.repo,
            max_count.clamp(1, MAX_PER_PAGE)
        )
    }
}

#[async_trait]
impl ListingSource for GitHubSource {
    fn key(&self) -> String {
        self.repo.clone()
    }

    async fn fetch_releases(&self, client: &Client, max_count: usize) -> Result<Vec<Release>> {
        let url = self.releases_url(max_count);
        tracing::debug!(%url, "listing releases");

        let mut req = client
            .get(&url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{} rejected the release listing", self.repo))?;

        let raw: Vec<GithubRelease> = resp
            .json()
            .await
            .with_context(|| format!("malformed release listing from {}", self.repo))?;

        let releases = raw
            .into_iter()
            .filter(|r| !r.draft)
            .filter_map(|r| {
                // Unpublished releases have no date to order by.
                let published_at = r.published_at?;
                let assets = r
                    .assets
                    .into_iter()
                    .map(|a| Asset {
                        name: a.name,
                        size_bytes: a.size,
                        download_url: a.browser_download_url,
                        source_id: self.repo.clone(),
                    })
                    .collect();
                Some(Release {
                    tag: r.tag_name,
                    published_at,
                    prerelease: r.prerelease,
                    source_id: self.repo.clone(),
                    assets,
                })
            })
            .collect();

        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const BODY: &str = r#"[
        {
            "tag_name": "z3-4.13.0",
            "published_at": "2024-03-01T10:00:00Z",
            "prerelease": false,
            "draft": false,
            "assets": [
                {
                    "name": "z3-4.13.0-x64-glibc-2.35.zip",
                    "size": 2097152,
                    "browser_download_url": "https://example.com/z3-4.13.0-x64-glibc-2.35.zip"
                }
            ]
        },
        {
            "tag_name": "nightly",
            "published_at": null,
            "prerelease": true,
            "draft": true,
            "assets": []
        }
    ]"#;

    #[tokio::test]
    async fn test_fetch_github_releases() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/Z3Prover/z3/releases")
            .match_query(Matcher::UrlEncoded("per_page".into(), "30".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(BODY)
            .create_async()
            .await;

        let source = GitHubSource::new("Z3Prover/z3").with_api_base(server.url());
        let releases = source.fetch_releases(&Client::new(), 30).await.unwrap();

        assert_eq!(releases.len(), 1, "drafts are skipped");
        let r = &releases[0];
        assert_eq!(r.tag, "z3-4.13.0");
        assert_eq!(r.source_id, "Z3Prover/z3");
        assert_eq!(r.assets[0].size_bytes, 2_097_152);
        assert_eq!(r.assets[0].source_id, "Z3Prover/z3");
    }

    #[tokio::test]
    async fn test_token_is_sent_as_bearer() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/repos/o/r/releases")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer sekrit")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let source = GitHubSource::new("o/r")
            .with_api_base(server.url())
            .with_token(Some("sekrit".to_string()));
        let releases = source.fetch_releases(&Client::new(), 5).await.unwrap();

        assert!(releases.is_empty());
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_reported() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/o/r/releases")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"message":"API rate limit exceeded"}"#)
            .create_async()
            .await;

        let source = GitHubSource::new("o/r").with_api_base(server.url());
        let err = source.fetch_releases(&Client::new(), 5).await.unwrap_err();
        assert!(format!("{err:#}").contains("o/r"));
    }
}
