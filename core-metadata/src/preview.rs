//! Preview image download.
//!
//! Streams a remote preview straight to disk; the body is never buffered
//! in memory as a whole.

use crate::error::{MetadataError, Result};
use async_trait::async_trait;
use bridge_traits::http::HttpClient;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Source of preview images.
#[async_trait]
pub trait PreviewSource: Send + Sync {
    /// Write the image at `url` to `dest`, returning the number of bytes
    /// written. On failure `dest` may hold a partial file; callers remove it.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// [`PreviewSource`] backed by the host HTTP client.
pub struct HttpPreviewSource {
    http_client: Arc<dyn HttpClient>,
}

impl HttpPreviewSource {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl PreviewSource for HttpPreviewSource {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut stream = self
            .http_client
            .download_stream(url.to_string())
            .await
            .map_err(|e| MetadataError::DownloadFailed(format!("{}: {}", url, e)))?;

        let mut file = File::create(dest).await?;
        let written = tokio::io::copy(&mut stream, &mut file).await?;
        file.flush().await?;

        if written == 0 {
            return Err(MetadataError::DownloadFailed(format!(
                "{}: empty response body",
                url
            )));
        }

        debug!(url, bytes = written, "Preview downloaded");
        Ok(written)
    }
}
