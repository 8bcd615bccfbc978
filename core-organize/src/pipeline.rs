//! Per-task pipeline.
//!
//! lookup → placement → transfer → preview → duplicates → summary, strictly
//! in that order. Steps after the transfer run under the destination
//! folder's lock and never turn a placed archive into a failure.

use crate::duplicates::{DuplicateReport, DuplicateResolver};
use crate::error::TransferFailure;
use crate::folder_locks::FolderLocks;
use crate::images::{PreviewHandler, PreviewOutcome};
use crate::planner::ensure_path;
use crate::summary::FolderSummaryAggregator;
use crate::task::FileTask;
use crate::transfer::place;
use core_metadata::lookup::MetadataLookup;
use core_runtime::config::TransferMode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// How one task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Placed {
        destination: PathBuf,
        preview: PreviewOutcome,
        duplicates: DuplicateReport,
    },
    Failed {
        /// Ledger key: the file id for lookup failures, the file name for
        /// placement failures.
        key: String,
        reason: String,
        /// The archive was left alone because the destination name was taken.
        collision: bool,
    },
}

impl TaskOutcome {
    pub fn is_placed(&self) -> bool {
        matches!(self, TaskOutcome::Placed { .. })
    }

    fn failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            key: key.into(),
            reason: reason.into(),
            collision: false,
        }
    }
}

/// Everything a worker needs to process one [`FileTask`].
pub struct TaskPipeline {
    lookup: Arc<dyn MetadataLookup>,
    previews: PreviewHandler,
    duplicates: Option<DuplicateResolver>,
    summaries: FolderSummaryAggregator,
    folder_locks: FolderLocks,
    models_root: PathBuf,
    transfer_mode: TransferMode,
    archive_extensions: Vec<String>,
    lookup_timeout: Duration,
}

impl TaskPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lookup: Arc<dyn MetadataLookup>,
        previews: PreviewHandler,
        duplicates: Option<DuplicateResolver>,
        summaries: FolderSummaryAggregator,
        models_root: impl Into<PathBuf>,
        transfer_mode: TransferMode,
        archive_extensions: Vec<String>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            lookup,
            previews,
            duplicates,
            summaries,
            folder_locks: FolderLocks::new(),
            models_root: models_root.into(),
            transfer_mode,
            archive_extensions,
            lookup_timeout,
        }
    }

    pub fn summaries(&self) -> &FolderSummaryAggregator {
        &self.summaries
    }

    /// Run every step for `task`. Never panics and never returns an error;
    /// failures come back as [`TaskOutcome::Failed`].
    #[instrument(skip(self, task), fields(file_id = task.id()))]
    pub async fn process(&self, task: &FileTask) -> TaskOutcome {
        let classification = match timeout(self.lookup_timeout, self.lookup.lookup(task.id())).await {
            Ok(Ok(classification)) => classification,
            Ok(Err(failure)) => {
                warn!(reason = %failure, "Lookup failed");
                return TaskOutcome::failed(task.id(), failure.to_string());
            }
            Err(_) => {
                warn!(timeout = ?self.lookup_timeout, "Lookup timed out");
                return TaskOutcome::failed(
                    task.id(),
                    format!("Lookup timed out after {:?}", self.lookup_timeout),
                );
            }
        };

        info!(title = %classification.title, categories = ?classification.category_path, "Found model");
        if let Some(soft) = classification.missing_preview() {
            debug!(reason = %soft, "Continuing without preview");
        }

        let destination = match ensure_path(&self.models_root, &classification.category_path).await {
            Ok(path) => path,
            Err(e) => return TaskOutcome::failed(task.id(), e.to_string()),
        };

        let _folder_guard = self.folder_locks.lock(&destination).await;

        if let Err(failure) = place(task.source_path(), &destination, self.transfer_mode).await {
            warn!(error = %failure, "Archive not placed");
            return TaskOutcome::Failed {
                key: task.file_name(),
                reason: failure.to_string(),
                collision: matches!(failure, TransferFailure::Collision { .. }),
            };
        }
        info!(folder = %destination.display(), "Archive placed");

        let preview = self
            .previews
            .handle(task, &destination, classification.preview_image_url.as_deref())
            .await;

        let duplicates = match &self.duplicates {
            Some(resolver) => resolver
                .resolve_folder(&destination, &self.archive_extensions)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Duplicate resolution skipped");
                    DuplicateReport::default()
                }),
            None => DuplicateReport::default(),
        };

        if let Err(e) = self.summaries.recompute(&destination).await {
            warn!(error = %e, "Folder summary not updated");
        }

        TaskOutcome::Placed {
            destination,
            preview,
            duplicates,
        }
    }
}
