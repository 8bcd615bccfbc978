//! Failure ledger.
//!
//! Maps a file name or file id to the reason it was not organized. Workers
//! record into it as they go; it is written once after all workers finish.

use crate::error::{OrganizeError, Result};
use crate::summary::to_pretty_json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureLedger {
    entries: BTreeMap<String, String>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. A later reason for the same key replaces the
    /// earlier one.
    pub fn record(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        self.entries.insert(key.into(), reason.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Fold another ledger into this one.
    pub fn merge(&mut self, other: FailureLedger) {
        self.entries.extend(other.entries);
    }

    /// Write the ledger to `path` as indented JSON.
    ///
    /// Returns `false` without touching the filesystem when empty.
    pub async fn persist(&self, path: &Path) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }

        let body = to_pretty_json(self)?;
        tokio::fs::write(path, body)
            .await
            .map_err(|e| OrganizeError::Ledger(format!("{}: {}", path.display(), e)))?;

        info!(entries = self.len(), path = %path.display(), "Wrote failure ledger");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_record_and_merge() {
        let mut ledger = FailureLedger::new();
        ledger.record("2.b", "No categories found");
        ledger.record("1.a", "No models found in API response");

        let mut other = FailureLedger::new();
        other.record("bad name.zip", "Invalid filename format");
        ledger.merge(other);

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.get("2.b"), Some("No categories found"));
        let keys: Vec<&str> = ledger.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["1.a", "2.b", "bad name.zip"]);
    }

    #[tokio::test]
    async fn test_persist_only_when_non_empty() {
        let dir = std::env::temp_dir().join(format!("ledger-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("not_found_models.json");

        assert!(!FailureLedger::new().persist(&path).await.unwrap());
        assert!(!path.exists());

        let mut ledger = FailureLedger::new();
        ledger.record("1.a", "No categories found");
        assert!(ledger.persist(&path).await.unwrap());

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\n    \"1.a\": \"No categories found\"\n}");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_persist_reports_write_failure() {
        let dir = std::env::temp_dir().join(format!("ledger-missing-{}", Uuid::new_v4()));
        let mut ledger = FailureLedger::new();
        ledger.record("1.a", "x");

        let result = ledger.persist(&dir.join("ledger.json")).await;
        assert!(matches!(result, Err(OrganizeError::Ledger(_))));
    }
}
