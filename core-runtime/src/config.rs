//! # Organizer Configuration
//!
//! Builder-based configuration for an organize run.
//!
//! ## Required Settings
//!
//! - `source_dir` - Directory holding the downloaded archives
//! - `destination_dir` - Directory under which the category tree is built
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - Lookup and preview downloads (desktop default: reqwest)
//!
//! When the `desktop-shims` feature is enabled a `ReqwestHttpClient` is
//! injected if none is provided. Without it, `build()` fails with
//! [`Error::CapabilityMissing`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{OrganizerConfig, TransferMode};
//! use std::time::Duration;
//!
//! let config = OrganizerConfig::builder()
//!     .source_dir("/downloads")
//!     .destination_dir("/library")
//!     .worker_count(8)
//!     .task_delay(Duration::from_millis(500))
//!     .transfer_mode(TransferMode::Copy)
//!     .build()?;
//!
//! assert_eq!(config.models_root(), std::path::Path::new("/library/3ds_models"));
//! ```

use crate::error::{Error, Result};
use bridge_traits::http::HttpClient;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_WORKER_COUNT: usize = 5;
pub const MAX_WORKER_COUNT: usize = 64;
pub const DEFAULT_TASK_DELAY: Duration = Duration::from_millis(1000);
pub const MAX_TASK_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_LOOKUP_TIMEOUT: Duration = Duration::from_secs(300);

pub const DEFAULT_OUTPUT_FOLDER: &str = "3ds_models";
pub const DEFAULT_QUARANTINE_FOLDER: &str = "_duplicates";
pub const DEFAULT_SUMMARY_FILE: &str = "folder_summary.json";
pub const DEFAULT_LEDGER_FILE: &str = "not_found_models.json";
pub const DEFAULT_ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar", "7z"];

pub const DEFAULT_API_URL: &str = "https://3dsky.org/api/models";
pub const DEFAULT_IMAGE_BASE_URL: &str =
    "https://b6.3ddd.ru/media/cache/tuk_model_custom_filter_ang_en/";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// How an archive reaches its category folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferMode {
    /// Rename into place; the source disappears.
    #[default]
    Move,
    /// Duplicate into place, keeping the source and its modification time.
    Copy,
}

impl TransferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Move => "move",
            TransferMode::Copy => "copy",
        }
    }
}

/// Endpoints of the metadata lookup service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupApiConfig {
    /// Search endpoint receiving `{"query", "order"}` POSTs
    pub api_url: String,
    /// Prefix joined with an image's relative `web_path`
    pub image_base_url: String,
    /// User-Agent sent with lookup requests
    pub user_agent: String,
}

impl Default for LookupApiConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            image_base_url: DEFAULT_IMAGE_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl LookupApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_image_base_url(mut self, url: impl Into<String>) -> Self {
        self.image_base_url = url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("api_url", &self.api_url),
            ("image_base_url", &self.image_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }

        if self.user_agent.trim().is_empty() {
            return Err(Error::Config("user_agent cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Configuration for one organize run.
///
/// Use [`OrganizerConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct OrganizerConfig {
    /// Directory scanned for archives (immediate children only)
    pub source_dir: PathBuf,

    /// Directory that receives the output folder
    pub destination_dir: PathBuf,

    /// Name of the output folder created under `destination_dir`
    pub output_folder_name: String,

    /// Name of the duplicate quarantine folder under the models root
    pub quarantine_folder_name: String,

    /// Number of concurrent workers
    pub worker_count: usize,

    /// Pause after every task, bounding the request rate
    pub task_delay: Duration,

    /// Upper bound on a single metadata lookup
    pub lookup_timeout: Duration,

    /// Move or copy archives into place
    pub transfer_mode: TransferMode,

    /// Lowercase archive extensions, without the dot
    pub archive_extensions: Vec<String>,

    /// Sidecar file written into every touched folder
    pub summary_file_name: String,

    /// Failure ledger written into the models root
    pub ledger_file_name: String,

    /// Quarantine suffixed duplicates after each placement
    pub resolve_duplicates: bool,

    /// Progress channel capacity per subscriber
    pub event_buffer_size: usize,

    /// Lookup service endpoints
    pub lookup_api: LookupApiConfig,

    /// HTTP client used for lookups and preview downloads
    pub http_client: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for OrganizerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrganizerConfig")
            .field("source_dir", &self.source_dir)
            .field("destination_dir", &self.destination_dir)
            .field("output_folder_name", &self.output_folder_name)
            .field("quarantine_folder_name", &self.quarantine_folder_name)
            .field("worker_count", &self.worker_count)
            .field("task_delay", &self.task_delay)
            .field("lookup_timeout", &self.lookup_timeout)
            .field("transfer_mode", &self.transfer_mode)
            .field("archive_extensions", &self.archive_extensions)
            .field("summary_file_name", &self.summary_file_name)
            .field("ledger_file_name", &self.ledger_file_name)
            .field("resolve_duplicates", &self.resolve_duplicates)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("lookup_api", &self.lookup_api)
            .field("http_client", &"HttpClient { ... }")
            .finish()
    }
}

impl OrganizerConfig {
    /// Creates a new builder for constructing an `OrganizerConfig`.
    pub fn builder() -> OrganizerConfigBuilder {
        OrganizerConfigBuilder::default()
    }

    /// Root of the category tree: `destination_dir/output_folder_name`.
    pub fn models_root(&self) -> PathBuf {
        self.destination_dir.join(&self.output_folder_name)
    }

    /// Folder holding quarantined duplicates.
    pub fn quarantine_root(&self) -> PathBuf {
        self.models_root().join(&self.quarantine_folder_name)
    }

    /// Full path of the failure ledger document.
    pub fn ledger_path(&self) -> PathBuf {
        self.models_root().join(&self.ledger_file_name)
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.source_dir.as_os_str().is_empty() {
            return Err(Error::Config("Source directory cannot be empty".to_string()));
        }

        if self.destination_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Destination directory cannot be empty".to_string(),
            ));
        }

        if self.models_root() == self.source_dir {
            return Err(Error::InvalidPath {
                field: "source",
                path: self.source_dir.clone(),
            });
        }

        if self.worker_count == 0 {
            return Err(Error::Config(
                "Worker count must be at least 1".to_string(),
            ));
        }

        if self.worker_count > MAX_WORKER_COUNT {
            return Err(Error::Config(format!(
                "Worker count exceeds maximum of {}",
                MAX_WORKER_COUNT
            )));
        }

        if self.task_delay > MAX_TASK_DELAY {
            return Err(Error::Config(format!(
                "Task delay exceeds maximum of {}s",
                MAX_TASK_DELAY.as_secs()
            )));
        }

        if self.lookup_timeout.is_zero() {
            return Err(Error::Config(
                "Lookup timeout must be greater than zero".to_string(),
            ));
        }

        if self.lookup_timeout > MAX_LOOKUP_TIMEOUT {
            return Err(Error::Config(format!(
                "Lookup timeout exceeds maximum of {}s",
                MAX_LOOKUP_TIMEOUT.as_secs()
            )));
        }

        if self.archive_extensions.is_empty() {
            return Err(Error::Config(
                "At least one archive extension is required".to_string(),
            ));
        }

        for (field, name) in [
            ("output folder", &self.output_folder_name),
            ("quarantine folder", &self.quarantine_folder_name),
            ("summary file", &self.summary_file_name),
            ("ledger file", &self.ledger_file_name),
        ] {
            if !is_plain_component(name) {
                return Err(Error::Config(format!(
                    "The {} name must be a single path component, got '{}'",
                    field, name
                )));
            }
        }

        self.lookup_api.validate()
    }
}

/// Non-empty, no separators, not `.` or `..`.
fn is_plain_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).components().count() == 1
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "An HttpClient is required for metadata lookups and preview downloads. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Otherwise: inject an implementation with .http_client()."
            .to_string(),
    })
}

/// Builder for constructing [`OrganizerConfig`] instances.
#[derive(Default)]
pub struct OrganizerConfigBuilder {
    source_dir: Option<PathBuf>,
    destination_dir: Option<PathBuf>,
    output_folder_name: Option<String>,
    quarantine_folder_name: Option<String>,
    worker_count: Option<usize>,
    task_delay: Option<Duration>,
    lookup_timeout: Option<Duration>,
    transfer_mode: Option<TransferMode>,
    archive_extensions: Option<Vec<String>>,
    summary_file_name: Option<String>,
    ledger_file_name: Option<String>,
    resolve_duplicates: Option<bool>,
    event_buffer_size: Option<usize>,
    lookup_api: Option<LookupApiConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
}

impl OrganizerConfigBuilder {
    /// Sets the directory scanned for archives (required).
    pub fn source_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.source_dir = Some(path.into());
        self
    }

    /// Sets the directory receiving the output tree (required).
    pub fn destination_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.destination_dir = Some(path.into());
        self
    }

    pub fn output_folder_name(mut self, name: impl Into<String>) -> Self {
        self.output_folder_name = Some(name.into());
        self
    }

    pub fn quarantine_folder_name(mut self, name: impl Into<String>) -> Self {
        self.quarantine_folder_name = Some(name.into());
        self
    }

    /// Number of concurrent workers (default 5).
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Pause after each task (default 1s).
    pub fn task_delay(mut self, delay: Duration) -> Self {
        self.task_delay = Some(delay);
        self
    }

    /// Bound on a single metadata lookup (default 30s).
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    pub fn transfer_mode(mut self, mode: TransferMode) -> Self {
        self.transfer_mode = Some(mode);
        self
    }

    /// Archive extensions, with or without a leading dot; matched
    /// case-insensitively.
    pub fn archive_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.archive_extensions = Some(
            extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        );
        self
    }

    pub fn summary_file_name(mut self, name: impl Into<String>) -> Self {
        self.summary_file_name = Some(name.into());
        self
    }

    pub fn ledger_file_name(mut self, name: impl Into<String>) -> Self {
        self.ledger_file_name = Some(name.into());
        self
    }

    pub fn resolve_duplicates(mut self, enabled: bool) -> Self {
        self.resolve_duplicates = Some(enabled);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn lookup_api(mut self, config: LookupApiConfig) -> Self {
        self.lookup_api = Some(config);
        self
    }

    /// Sets the HTTP client (desktop default: reqwest).
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<OrganizerConfig> {
        let source_dir = self.source_dir.ok_or_else(|| {
            Error::Config("Source directory is required. Use .source_dir() to set it.".to_string())
        })?;

        let destination_dir = self.destination_dir.ok_or_else(|| {
            Error::Config(
                "Destination directory is required. Use .destination_dir() to set it."
                    .to_string(),
            )
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = OrganizerConfig {
            source_dir,
            destination_dir,
            output_folder_name: self
                .output_folder_name
                .unwrap_or_else(|| DEFAULT_OUTPUT_FOLDER.to_string()),
            quarantine_folder_name: self
                .quarantine_folder_name
                .unwrap_or_else(|| DEFAULT_QUARANTINE_FOLDER.to_string()),
            worker_count: self.worker_count.unwrap_or(DEFAULT_WORKER_COUNT),
            task_delay: self.task_delay.unwrap_or(DEFAULT_TASK_DELAY),
            lookup_timeout: self.lookup_timeout.unwrap_or(DEFAULT_LOOKUP_TIMEOUT),
            transfer_mode: self.transfer_mode.unwrap_or_default(),
            archive_extensions: self.archive_extensions.unwrap_or_else(|| {
                DEFAULT_ARCHIVE_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            }),
            summary_file_name: self
                .summary_file_name
                .unwrap_or_else(|| DEFAULT_SUMMARY_FILE.to_string()),
            ledger_file_name: self
                .ledger_file_name
                .unwrap_or_else(|| DEFAULT_LEDGER_FILE.to_string()),
            resolve_duplicates: self.resolve_duplicates.unwrap_or(true),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
            lookup_api: self.lookup_api.unwrap_or_default(),
            http_client,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use tokio::io::AsyncRead;

    struct NoopHttpClient;

    #[async_trait]
    impl HttpClient for NoopHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }

        async fn download_stream(
            &self,
            _url: String,
        ) -> BridgeResult<Box<dyn AsyncRead + Send + Unpin>> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }
    }

    fn base_builder() -> OrganizerConfigBuilder {
        OrganizerConfig::builder()
            .source_dir("/downloads")
            .destination_dir("/library")
            .http_client(Arc::new(NoopHttpClient))
    }

    #[test]
    fn test_builder_defaults() {
        let config = base_builder().build().unwrap();

        assert_eq!(config.worker_count, 5);
        assert_eq!(config.task_delay, Duration::from_secs(1));
        assert_eq!(config.lookup_timeout, Duration::from_secs(30));
        assert_eq!(config.transfer_mode, TransferMode::Move);
        assert_eq!(config.archive_extensions, vec!["zip", "rar", "7z"]);
        assert!(config.resolve_duplicates);
        assert_eq!(config.models_root(), PathBuf::from("/library/3ds_models"));
        assert_eq!(
            config.quarantine_root(),
            PathBuf::from("/library/3ds_models/_duplicates")
        );
        assert_eq!(
            config.ledger_path(),
            PathBuf::from("/library/3ds_models/not_found_models.json")
        );
        assert_eq!(config.lookup_api, LookupApiConfig::default());
    }

    #[test]
    fn test_builder_requires_source_dir() {
        let result = OrganizerConfig::builder()
            .destination_dir("/library")
            .http_client(Arc::new(NoopHttpClient))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Source directory is required"));
    }

    #[test]
    fn test_builder_requires_destination_dir() {
        let result = OrganizerConfig::builder()
            .source_dir("/downloads")
            .http_client(Arc::new(NoopHttpClient))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Destination directory is required"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client_without_shims() {
        let result = OrganizerConfig::builder()
            .source_dir("/downloads")
            .destination_dir("/library")
            .build();

        assert!(matches!(result, Err(Error::CapabilityMissing { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let result = base_builder().worker_count(0).build();
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }

    #[test]
    fn test_validate_rejects_excessive_workers() {
        assert!(base_builder().worker_count(MAX_WORKER_COUNT).build().is_ok());
        assert!(base_builder()
            .worker_count(MAX_WORKER_COUNT + 1)
            .build()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_zero_lookup_timeout() {
        let result = base_builder().lookup_timeout(Duration::ZERO).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_accepts_zero_task_delay() {
        let config = base_builder().task_delay(Duration::ZERO).build().unwrap();
        assert!(config.task_delay.is_zero());
    }

    #[test]
    fn test_validate_rejects_long_task_delay() {
        let result = base_builder().task_delay(Duration::from_secs(61)).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_nested_folder_names() {
        assert!(base_builder().output_folder_name("a/b").build().is_err());
        assert!(base_builder().quarantine_folder_name("..").build().is_err());
        assert!(base_builder().summary_file_name("").build().is_err());
    }

    #[test]
    fn test_validate_rejects_source_inside_output() {
        let result = OrganizerConfig::builder()
            .source_dir("/library/3ds_models")
            .destination_dir("/library")
            .http_client(Arc::new(NoopHttpClient))
            .build();

        assert!(matches!(
            result,
            Err(Error::InvalidPath {
                field: "source",
                ..
            })
        ));
    }

    #[test]
    fn test_archive_extensions_are_normalized() {
        let config = base_builder()
            .archive_extensions([".ZIP", "Rar"])
            .build()
            .unwrap();
        assert_eq!(config.archive_extensions, vec!["zip", "rar"]);
    }

    #[test]
    fn test_lookup_api_validation() {
        assert!(LookupApiConfig::default().validate().is_ok());
        assert!(LookupApiConfig::new()
            .with_api_url("ftp://example.com")
            .validate()
            .is_err());
        assert!(LookupApiConfig::new()
            .with_user_agent("  ")
            .validate()
            .is_err());

        let result = base_builder()
            .lookup_api(LookupApiConfig::new().with_image_base_url("cdn.example.com"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_debug_hides_client() {
        let config = base_builder().build().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("HttpClient { ... }"));
        assert!(debug.contains("worker_count: 5"));
    }
}
