//! 3dsky Model Search Client
//!
//! Resolves an archive's file id to its catalogue entry.
//!
//! ## API
//!
//! - **Search**: `POST https://3dsky.org/api/models` with
//!   `{"query": "<file id>", "order": "relevance"}`
//! - **Preview**: image base URL + the matching image's `web_path`
//!
//! The response nests results under `data.models`; only the first (most
//! relevant) model is used. Its category path is the parent category
//! followed by the category itself, each taken from `title_en`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::providers::SkyLookupClient;
//! use core_metadata::MetadataLookup;
//!
//! let client = SkyLookupClient::new(http_client, LookupApiConfig::default());
//! let result = client.lookup("123456.5f2a9c").await?;
//! println!("{} -> {:?}", result.title, result.category_path);
//! ```

use crate::error::{MetadataError, Result};
use crate::lookup::{ClassificationResult, LookupFailure, MetadataLookup};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use core_runtime::config::LookupApiConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Timeout for API requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response excerpt kept in an error message.
const ERROR_BODY_LIMIT: usize = 200;

/// 3dsky search client
pub struct SkyLookupClient {
    http_client: Arc<dyn HttpClient>,
    config: LookupApiConfig,
    retry_policy: RetryPolicy,
    request_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    order: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    models: Option<Vec<ModelRecord>>,
}

#[derive(Debug, Deserialize)]
struct ModelRecord {
    title_en: Option<String>,
    category_parent: Option<CategoryRecord>,
    category: Option<CategoryRecord>,
    images: Option<Vec<ImageRecord>>,
}

#[derive(Debug, Deserialize)]
struct CategoryRecord {
    title_en: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageRecord {
    file_name: Option<String>,
    web_path: Option<String>,
}

impl SkyLookupClient {
    /// Create a client that performs a single attempt per lookup.
    pub fn new(http_client: Arc<dyn HttpClient>, config: LookupApiConfig) -> Self {
        Self {
            http_client,
            config,
            retry_policy: RetryPolicy::none(),
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Allow transport retries on 5xx/429 answers.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Per-request timeout passed down to the HTTP client.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn search(&self, file_id: &str) -> Result<SearchResponse> {
        let payload = SearchRequest {
            query: file_id,
            order: "relevance",
        };
        let request = HttpRequest::new(HttpMethod::Post, &self.config.api_url)
            .user_agent(&self.config.user_agent)
            .header("Accept", "application/json")
            .timeout(self.request_timeout)
            .json(&payload)?;

        debug!(file_id, url = %self.config.api_url, "Searching model catalogue");

        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await
            .map_err(|e| MetadataError::NetworkError(format!("Model search failed: {}", e)))?;

        if !response.is_success() {
            let body = String::from_utf8_lossy(&response.body);
            return Err(MetadataError::HttpError {
                status: response.status,
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        serde_json::from_slice(&response.body)
            .map_err(|e| MetadataError::JsonParse(format!("Failed to parse search results: {}", e)))
    }
}

#[async_trait]
impl MetadataLookup for SkyLookupClient {
    #[instrument(skip(self))]
    async fn lookup(&self, file_id: &str) -> std::result::Result<ClassificationResult, LookupFailure> {
        let response = self.search(file_id).await?;
        let result = classify(file_id, response, &self.config.image_base_url)?;

        if result.preview_image_url.is_none() {
            warn!(file_id, "No matching preview image");
        }

        Ok(result)
    }
}

/// Pick the first model and turn it into a classification.
fn classify(
    file_id: &str,
    response: SearchResponse,
    image_base_url: &str,
) -> std::result::Result<ClassificationResult, LookupFailure> {
    let model = response
        .data
        .and_then(|data| data.models)
        .and_then(|models| models.into_iter().next())
        .ok_or(LookupFailure::NoMatch)?;

    let category_path: Vec<String> = [model.category_parent, model.category]
        .into_iter()
        .flatten()
        .filter_map(|category| category.title_en)
        .filter(|title| !title.trim().is_empty())
        .collect();

    if category_path.is_empty() {
        return Err(LookupFailure::NoCategory);
    }

    let model_number = model_number(file_id);
    let preview_image_url = model
        .images
        .unwrap_or_default()
        .into_iter()
        .find(|image| {
            image
                .file_name
                .as_deref()
                .is_some_and(|name| name.starts_with(model_number))
        })
        .and_then(|image| image.web_path)
        .filter(|path| !path.is_empty())
        .map(|path| join_url(image_base_url, &path));

    Ok(ClassificationResult {
        category_path,
        preview_image_url,
        title: model.title_en.unwrap_or_default(),
    })
}

/// Leading numeric segment of a file id (`"123.ab"` -> `"123"`).
fn model_number(file_id: &str) -> &str {
    file_id.split('.').next().unwrap_or(file_id)
}

fn join_url(base: &str, path: &str) -> String {
    if base.ends_with('/') && path.starts_with('/') {
        format!("{}{}", base, &path[1..])
    } else {
        format!("{}{}", base, path)
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
