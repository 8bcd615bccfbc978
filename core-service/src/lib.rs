//! Organizer service façade.
//!
//! Wires the host-provided HTTP bridge, the lookup client, preview handling,
//! duplicate resolution and summaries into one [`OrganizerService`]. Desktop
//! hosts enable the `desktop-shims` feature so a `ReqwestHttpClient` is used
//! when the configuration does not carry one.
//!
//! ```ignore
//! use core_service::OrganizerService;
//! use core_runtime::config::OrganizerConfig;
//!
//! let config = OrganizerConfig::builder()
//!     .source_dir("/downloads")
//!     .destination_dir("/library")
//!     .build()?;
//! let service = OrganizerService::new(config);
//! let mut events = service.subscribe();
//! let report = service.organize().await?;
//! ```

pub mod error;

pub use error::{Result, ServiceError};

use std::path::Path;
use std::sync::Arc;

use bridge_traits::time::{Clock, SystemClock};
use core_metadata::{HttpPreviewSource, MetadataLookup, PreviewSource, SkyLookupClient};
use core_organize::{
    enumerate_tasks, DuplicateResolver, FolderSummary, FolderSummaryAggregator, OrganizeError,
    PreviewHandler, RunReport, TaskPipeline, WorkCoordinator,
};
use core_runtime::config::OrganizerConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, OrganizeEvent, Receiver};
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Replaceable collaborators of the service.
pub struct OrganizerDependencies {
    pub lookup: Arc<dyn MetadataLookup>,
    pub preview_source: Arc<dyn PreviewSource>,
    pub clock: Arc<dyn Clock>,
}

impl OrganizerDependencies {
    /// 3dsky lookups and HTTP preview downloads over the configured client.
    pub fn from_config(config: &OrganizerConfig) -> Self {
        Self {
            lookup: Arc::new(SkyLookupClient::new(
                Arc::clone(&config.http_client),
                config.lookup_api.clone(),
            )),
            preview_source: Arc::new(HttpPreviewSource::new(Arc::clone(&config.http_client))),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn MetadataLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_preview_source(mut self, source: Arc<dyn PreviewSource>) -> Self {
        self.preview_source = source;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct OrganizerService {
    config: Arc<OrganizerConfig>,
    event_bus: EventBus,
    pipeline: Arc<TaskPipeline>,
}

impl std::fmt::Debug for OrganizerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrganizerService")
            .field("config", &self.config)
            .field("subscribers", &self.event_bus.subscriber_count())
            .finish()
    }
}

impl OrganizerService {
    /// Build a service with the default collaborators for `config`.
    pub fn new(config: OrganizerConfig) -> Self {
        let deps = OrganizerDependencies::from_config(&config);
        Self::with_dependencies(config, deps)
    }

    pub fn with_dependencies(config: OrganizerConfig, deps: OrganizerDependencies) -> Self {
        let duplicates = config
            .resolve_duplicates
            .then(|| DuplicateResolver::new(config.quarantine_root()));

        let pipeline = TaskPipeline::new(
            deps.lookup,
            PreviewHandler::new(deps.preview_source, config.transfer_mode)
                .with_download_timeout(config.lookup_timeout),
            duplicates,
            FolderSummaryAggregator::new(config.summary_file_name.clone(), deps.clock),
            config.models_root(),
            config.transfer_mode,
            config.archive_extensions.clone(),
            config.lookup_timeout,
        );

        Self {
            event_bus: EventBus::new(config.event_buffer_size),
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &OrganizerConfig {
        &self.config
    }

    /// Raw progress receiver. Subscribe before calling [`organize`](Self::organize).
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Progress receiver that can be filtered.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Organize every archive currently in the source directory.
    ///
    /// Fails up front when either root is missing or the output folder
    /// cannot be created. Individual archive failures end up in the report's
    /// ledger instead.
    #[instrument(skip(self), fields(source = %self.config.source_dir.display()))]
    pub async fn organize(&self) -> Result<RunReport> {
        if let Err(e) = self.prepare().await {
            error!(error = %e, "Run aborted");
            self.event_bus
                .emit(CoreEvent::Organize(OrganizeEvent::RunFailed {
                    run_id: Uuid::new_v4().to_string(),
                    message: e.to_string(),
                }))
                .ok();
            return Err(e);
        }

        let enumeration =
            enumerate_tasks(&self.config.source_dir, &self.config.archive_extensions).await?;
        info!(
            tasks = enumeration.tasks.len(),
            rejected = enumeration.rejected.len(),
            "Source enumerated"
        );

        let coordinator = WorkCoordinator::new(
            Arc::clone(&self.pipeline),
            self.event_bus.clone(),
            self.config.models_root(),
            self.config.ledger_path(),
            self.config.worker_count,
            self.config.task_delay,
        );

        Ok(coordinator.run(enumeration).await)
    }

    /// Rebuild the summary record of every folder under the models root.
    #[instrument(skip(self))]
    pub async fn refresh_summaries(&self) -> Result<FolderSummary> {
        let root = self.config.models_root();
        require_dir("models", &root).await?;
        Ok(self.pipeline.summaries().recompute_tree(&root).await?)
    }

    async fn prepare(&self) -> Result<()> {
        require_dir("source", &self.config.source_dir).await?;
        require_dir("destination", &self.config.destination_dir).await?;
        tokio::fs::create_dir_all(self.config.models_root())
            .await
            .map_err(OrganizeError::from)?;
        Ok(())
    }
}

async fn require_dir(label: &'static str, path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(OrganizeError::RootMissing {
            label,
            path: path.to_path_buf(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use bridge_traits::time::FixedClock;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use tokio::io::AsyncRead;

    /// Answers every search with one fixed catalogue entry and has no images.
    struct CatalogueClient {
        body: &'static str,
    }

    #[async_trait]
    impl HttpClient for CatalogueClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from_static(self.body.as_bytes()),
            })
        }

        async fn download_stream(&self, url: String) -> BridgeResult<Box<dyn AsyncRead + Send + Unpin>> {
            Err(BridgeError::NotAvailable(url))
        }
    }

    const CHAIR: &str = r#"{"data":{"models":[{
        "title_en":"Oak chair",
        "category_parent":{"title_en":"Furniture"},
        "category":{"title_en":"Chair"},
        "images":[]
    }]}}"#;

    fn temp_root(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("organizer-service-{}-{}", label, Uuid::new_v4()))
    }

    async fn service_for(root: &Path) -> OrganizerService {
        let source = root.join("downloads");
        let destination = root.join("library");
        tokio::fs::create_dir_all(&source).await.unwrap();
        tokio::fs::create_dir_all(&destination).await.unwrap();

        let config = OrganizerConfig::builder()
            .source_dir(&source)
            .destination_dir(&destination)
            .worker_count(2)
            .task_delay(std::time::Duration::ZERO)
            .http_client(Arc::new(CatalogueClient { body: CHAIR }))
            .build()
            .unwrap();

        let deps = OrganizerDependencies::from_config(&config)
            .with_clock(Arc::new(FixedClock::new(chrono_epoch())));
        OrganizerService::with_dependencies(config, deps)
    }

    fn chrono_epoch() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn test_organize_places_archives_and_records_bad_names() {
        let root = temp_root("run");
        let service = service_for(&root).await;
        let source = service.config().source_dir.clone();
        tokio::fs::write(source.join("123.abc.zip"), b"one").await.unwrap();
        tokio::fs::write(source.join("456.def.rar"), b"two").await.unwrap();
        tokio::fs::write(source.join("not-an-id.zip"), b"bad").await.unwrap();

        let mut events = service.subscribe();
        let report = service.organize().await.unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(
            report.ledger.get("not-an-id.zip"),
            Some("Invalid filename format")
        );

        let chair = service.config().models_root().join("Furniture").join("Chair");
        assert!(chair.join("123.abc.zip").exists());
        assert!(chair.join("456.def.rar").exists());
        assert!(service.config().ledger_path().exists());
        assert!(report.is_flushed());
        assert_eq!(report.summary.as_ref().unwrap().total_subfolders, 1);

        let first = events.recv().await.unwrap();
        assert!(matches!(first, CoreEvent::Organize(OrganizeEvent::RunStarted { total: 2, .. })));

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_missing_source_fails_before_any_work() {
        let root = temp_root("missing");
        let service = service_for(&root).await;
        tokio::fs::remove_dir_all(&service.config().source_dir)
            .await
            .unwrap();

        let mut events = service.subscribe();
        let err = service.organize().await.unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Organize(OrganizeError::RootMissing { label: "source", .. })
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Organize(OrganizeEvent::RunFailed { .. })
        ));
        assert!(!service.config().models_root().exists());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_refresh_summaries_rewrites_whole_tree() {
        let root = temp_root("refresh");
        let service = service_for(&root).await;
        let models = service.config().models_root();
        let nested = models.join("Lighting").join("Lamp");
        tokio::fs::create_dir_all(&nested).await.unwrap();
        tokio::fs::write(nested.join("9.ff.zip"), b"x").await.unwrap();

        let summary = service.refresh_summaries().await.unwrap();

        assert_eq!(summary.total_subfolders, 1);
        let sidecar = nested.join(&service.config().summary_file_name);
        let text = tokio::fs::read_to_string(sidecar).await.unwrap();
        assert!(text.contains("\"total_files\": 1"));
        let stamp = FixedClock::new(chrono_epoch())
            .local_now()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        assert!(text.contains(&stamp));

        tokio::fs::remove_dir_all(&root).await.ok();
    }
}
