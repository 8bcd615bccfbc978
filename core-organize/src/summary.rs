//! Folder Summary Aggregator
//!
//! Each organized folder carries a sidecar record describing its immediate
//! contents:
//!
//! ```json
//! {
//!     "total_files": 3,
//!     "total_subfolders": 2,
//!     "file_types": {
//!         ".jpg": 2,
//!         ".zip": 1
//!     },
//!     "last_updated": "2024-05-01 14:03:11"
//! }
//! ```
//!
//! The record is rebuilt from scratch on every call and never read back.

use crate::error::{OrganizeError, Result};
use bridge_traits::time::Clock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Counts for the immediate children of one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSummary {
    pub total_files: u64,
    pub total_subfolders: u64,
    /// Lowercase extension including the dot (`""` when there is none).
    pub file_types: BTreeMap<String, u64>,
    pub last_updated: String,
}

/// Writes [`FolderSummary`] sidecar records.
#[derive(Clone)]
pub struct FolderSummaryAggregator {
    summary_file_name: String,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for FolderSummaryAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderSummaryAggregator")
            .field("summary_file_name", &self.summary_file_name)
            .finish_non_exhaustive()
    }
}

impl FolderSummaryAggregator {
    pub fn new(summary_file_name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            summary_file_name: summary_file_name.into(),
            clock,
        }
    }

    /// Recount `dir` and overwrite its sidecar record.
    pub async fn recompute(&self, dir: &Path) -> Result<FolderSummary> {
        let summary = self
            .collect(dir)
            .await
            .map_err(|e| aggregation_failure(dir, e))?;

        let body = to_pretty_json(&summary)?;
        tokio::fs::write(dir.join(&self.summary_file_name), body)
            .await
            .map_err(|e| aggregation_failure(dir, e))?;

        debug!(
            folder = %dir.display(),
            files = summary.total_files,
            subfolders = summary.total_subfolders,
            "Summary updated"
        );
        Ok(summary)
    }

    /// Recompute every directory under `root`, children before parents.
    ///
    /// A folder that fails is logged and skipped; the root's own failure is
    /// returned.
    pub async fn recompute_tree(&self, root: &Path) -> Result<FolderSummary> {
        for dir in post_order_dirs(root).await? {
            if dir == root {
                break;
            }
            if let Err(e) = self.recompute(&dir).await {
                warn!(folder = %dir.display(), error = %e, "Skipping summary");
            }
        }

        self.recompute(root).await
    }

    async fn collect(&self, dir: &Path) -> std::io::Result<FolderSummary> {
        let mut total_files = 0;
        let mut total_subfolders = 0;
        let mut file_types: BTreeMap<String, u64> = BTreeMap::new();

        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let is_dir = tokio::fs::metadata(entry.path())
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);

            if is_dir {
                total_subfolders += 1;
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if name == self.summary_file_name {
                continue;
            }

            total_files += 1;
            *file_types.entry(extension_key(&name)).or_insert(0) += 1;
        }

        Ok(FolderSummary {
            total_files,
            total_subfolders,
            file_types,
            last_updated: self.clock.local_now().format(TIMESTAMP_FORMAT).to_string(),
        })
    }
}

/// Lowercase extension with its dot. Leading dots do not start one.
fn extension_key(name: &str) -> String {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(index) => name[leading + index..].to_lowercase(),
        None => String::new(),
    }
}

/// Every directory under `root` (inclusive), each listed after all of its
/// descendants. Symlinked directories are not followed.
async fn post_order_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut pre_order = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut children = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                children.push(entry.path());
            }
        }
        children.sort_by(|a, b| b.cmp(a));
        stack.extend(children);
        pre_order.push(dir);
    }

    pre_order.reverse();
    Ok(pre_order)
}

/// Pretty JSON with four-space indentation.
pub(crate) fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;
    Ok(buffer)
}

fn aggregation_failure(dir: &Path, error: impl std::fmt::Display) -> OrganizeError {
    OrganizeError::Aggregation {
        path: dir.to_path_buf(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::FixedClock;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn aggregator() -> FolderSummaryAggregator {
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        FolderSummaryAggregator::new("folder_summary.json", Arc::new(FixedClock::new(instant)))
    }

    fn scratch() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("summary-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_extension_key() {
        assert_eq!(extension_key("1.a.ZIP"), ".zip");
        assert_eq!(extension_key("preview.Jpg"), ".jpg");
        assert_eq!(extension_key("README"), "");
        assert_eq!(extension_key(".hidden"), "");
        assert_eq!(extension_key(".config.json"), ".json");
    }

    #[tokio::test]
    async fn test_counts_immediate_children() {
        let dir = scratch();
        std::fs::write(dir.join("1.a.zip"), b"a").unwrap();
        std::fs::write(dir.join("1.jpg"), b"b").unwrap();
        std::fs::write(dir.join("2.JPG"), b"c").unwrap();
        std::fs::create_dir_all(dir.join("Chairs").join("Deep")).unwrap();
        std::fs::write(dir.join("Chairs").join("9.z.zip"), b"d").unwrap();
        std::fs::create_dir_all(dir.join("Tables")).unwrap();

        let summary = aggregator().recompute(&dir).await.unwrap();

        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.total_subfolders, 2);
        assert_eq!(summary.file_types.get(".zip"), Some(&1));
        assert_eq!(summary.file_types.get(".jpg"), Some(&2));
        assert_eq!(summary.file_types.len(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_sidecar_excluded_and_idempotent() {
        let dir = scratch();
        std::fs::write(dir.join("1.a.rar"), b"a").unwrap();
        let aggregator = aggregator();

        let first = aggregator.recompute(&dir).await.unwrap();
        let written_first = std::fs::read(dir.join("folder_summary.json")).unwrap();
        let second = aggregator.recompute(&dir).await.unwrap();
        let written_second = std::fs::read(dir.join("folder_summary.json")).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.total_files, 1);
        assert_eq!(written_first, written_second);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_record_layout() {
        let dir = scratch();
        std::fs::write(dir.join("1.a.zip"), b"a").unwrap();

        let summary = aggregator().recompute(&dir).await.unwrap();
        let text = std::fs::read_to_string(dir.join("folder_summary.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert!(text.starts_with("{\n    \"total_files\": 1,"));
        assert_eq!(parsed["total_subfolders"], 0);
        assert_eq!(parsed["file_types"][".zip"], 1);
        assert_eq!(parsed["last_updated"], summary.last_updated.as_str());
        assert_eq!(summary.last_updated.len(), "2024-05-01 12:00:00".len());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_overwrites_stale_record() {
        let dir = scratch();
        std::fs::write(dir.join("folder_summary.json"), b"{\"total_files\": 99, \"extra\": 1}")
            .unwrap();

        aggregator().recompute(&dir).await.unwrap();
        let parsed: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join("folder_summary.json")).unwrap())
                .unwrap();

        assert_eq!(parsed["total_files"], 0);
        assert!(parsed.get("extra").is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_recompute_tree_is_post_order() {
        let root = scratch();
        std::fs::create_dir_all(root.join("A").join("B")).unwrap();
        std::fs::create_dir_all(root.join("C")).unwrap();
        std::fs::write(root.join("A").join("B").join("1.a.zip"), b"x").unwrap();

        let order = post_order_dirs(&root).await.unwrap();
        let position = |p: PathBuf| order.iter().position(|d| *d == p).unwrap();
        assert!(position(root.join("A").join("B")) < position(root.join("A")));
        assert!(position(root.join("A")) < position(root.clone()));
        assert_eq!(order.last(), Some(&root));

        let summary = aggregator().recompute_tree(&root).await.unwrap();
        assert_eq!(summary.total_subfolders, 2);
        assert_eq!(summary.total_files, 0);
        for dir in [root.join("A"), root.join("A").join("B"), root.join("C")] {
            assert!(dir.join("folder_summary.json").exists());
        }

        let a: FolderSummary = serde_json::from_slice(
            &std::fs::read(root.join("A").join("folder_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(a.total_files, 0);
        assert_eq!(a.total_subfolders, 1);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_missing_dir_is_aggregation_failure() {
        let dir = std::env::temp_dir().join(format!("summary-missing-{}", Uuid::new_v4()));
        let result = aggregator().recompute(&dir).await;
        assert!(matches!(result, Err(OrganizeError::Aggregation { .. })));
    }
}
