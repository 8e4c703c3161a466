//! Streaming asset download with progress reporting.
//!
//! The declared asset size feeds the progress display only; no integrity
//! check is performed against it.

use std::path::Path;

use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::Reporter;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request for a download operation
pub struct DownloadRequest<'a, R: Reporter> {
    pub client: &'a Client,
    /// Display name for progress lines.
    pub name: &'a str,
    pub url: &'a str,
    pub dest: &'a Path,
    /// Size declared by the catalog, used when the server sends no length.
    pub declared_size: Option<u64>,
    pub reporter: &'a R,
}

impl<R: Reporter> std::fmt::Debug for DownloadRequest<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("dest", &self.dest)
            .finish_non_exhaustive()
    }
}

impl<R: Reporter> DownloadRequest<'_, R> {
    /// Stream the body to `dest`, returning the number of bytes written.
    pub async fn execute(self) -> Result<u64, DownloadError> {
        download_to_file(self).await
    }
}

/// Stream a URL to a file, reporting progress per chunk.
pub async fn download_to_file<R: Reporter>(
    req: DownloadRequest<'_, R>,
) -> Result<u64, DownloadError> {
    tracing::debug!(url = req.url, dest = %req.dest.display(), "downloading");

    let response = req
        .client
        .get(req.url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await?
        .error_for_status()?;

    let total = response.content_length().or(req.declared_size);
    req.reporter.downloading(req.name, 0, total);

    if let Some(parent) = req.dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = File::create(req.dest).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
        req.reporter.downloading(req.name, downloaded, total);
    }

    file.flush().await?;
    Ok(downloaded)
}
