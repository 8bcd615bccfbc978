//! File tasks and source enumeration.
//!
//! Every archive in the source directory becomes either a [`FileTask`] or a
//! [`ValidationFailure`]. Only tasks ever reach the lookup service.

use crate::error::Result;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// `<digits>.<lowercase hex>`
static FILE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.[a-f0-9]+$").unwrap());

/// Ledger text for names that do not carry a file id.
pub const INVALID_FILENAME_REASON: &str = "Invalid filename format";

/// One archive awaiting classification and placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    id: String,
    source_path: PathBuf,
}

impl FileTask {
    /// Build a task from an archive path.
    ///
    /// The file stem (name minus its last extension) must be a valid file id.
    pub fn from_path(path: impl Into<PathBuf>) -> std::result::Result<Self, ValidationFailure> {
        let source_path = path.into();
        let file_name = file_name_of(&source_path);

        let id = source_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| is_valid_file_id(stem))
            .map(str::to_string)
            .ok_or(ValidationFailure { file_name })?;

        Ok(Self { id, source_path })
    }

    /// File id, e.g. `123456.5f2a9c`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.source_path)
    }

    /// Leading digit run of the file id, shared by the model's images.
    pub fn model_number(&self) -> &str {
        self.id.split('.').next().unwrap_or(&self.id)
    }
}

/// A source archive whose name does not carry a file id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub file_name: String,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(INVALID_FILENAME_REASON)
    }
}

impl std::error::Error for ValidationFailure {}

/// Result of scanning a source directory.
#[derive(Debug, Default)]
pub struct Enumeration {
    /// Valid archives, sorted by file name.
    pub tasks: Vec<FileTask>,
    /// Archives with malformed names, sorted by file name.
    pub rejected: Vec<ValidationFailure>,
}

impl Enumeration {
    pub fn total(&self) -> usize {
        self.tasks.len() + self.rejected.len()
    }
}

/// Check a stem against `^\d+\.[a-f0-9]+$`.
pub fn is_valid_file_id(candidate: &str) -> bool {
    FILE_ID.is_match(candidate)
}

/// List the archives directly inside `source_dir`.
///
/// `extensions` are matched case-insensitively and without the leading dot.
/// Subdirectories are not descended into.
pub async fn enumerate_tasks(source_dir: &Path, extensions: &[String]) -> Result<Enumeration> {
    let mut archives = Vec::new();
    let mut entries = tokio::fs::read_dir(source_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let path = entry.path();
        if has_archive_extension(&path, extensions) {
            archives.push(path);
        } else {
            debug!(file = %file_name_of(&path), "Skipping non-archive file");
        }
    }

    archives.sort();

    let mut enumeration = Enumeration::default();
    for path in archives {
        match FileTask::from_path(path) {
            Ok(task) => enumeration.tasks.push(task),
            Err(failure) => {
                warn!(file = %failure.file_name, "Invalid filename format");
                enumeration.rejected.push(failure);
            }
        }
    }

    info!(
        tasks = enumeration.tasks.len(),
        rejected = enumeration.rejected.len(),
        "Enumerated source archives"
    );

    Ok(enumeration)
}

fn has_archive_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn extensions() -> Vec<String> {
        vec!["zip".to_string(), "rar".to_string(), "7z".to_string()]
    }

    #[test]
    fn test_file_id_validation() {
        assert!(is_valid_file_id("123456.5f2a9c"));
        assert!(is_valid_file_id("1.0"));
        assert!(!is_valid_file_id("123456.5F2A9C"));
        assert!(!is_valid_file_id("abc.123"));
        assert!(!is_valid_file_id("123456"));
        assert!(!is_valid_file_id("123456.5f2a9c (1)"));
        assert!(!is_valid_file_id("123.ab.cd"));
    }

    #[test]
    fn test_task_from_path() {
        let task = FileTask::from_path("/in/123456.5f2a9c.zip").unwrap();
        assert_eq!(task.id(), "123456.5f2a9c");
        assert_eq!(task.model_number(), "123456");
        assert_eq!(task.file_name(), "123456.5f2a9c.zip");
        assert_eq!(task.source_path(), Path::new("/in/123456.5f2a9c.zip"));

        let failure = FileTask::from_path("/in/my model.zip").unwrap_err();
        assert_eq!(failure.file_name, "my model.zip");
        assert_eq!(failure.to_string(), "Invalid filename format");
    }

    #[tokio::test]
    async fn test_enumerate_tasks() {
        let dir = std::env::temp_dir().join(format!("enumerate-{}", Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("nested.zip")).unwrap();
        for name in [
            "20.ff.rar",
            "10.ab.ZIP",
            "broken name.7z",
            "30.cd.txt",
            "30.cd.jpeg",
            "5.e.7z",
        ] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let enumeration = enumerate_tasks(&dir, &extensions()).await.unwrap();

        let ids: Vec<&str> = enumeration.tasks.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["10.ab", "20.ff", "5.e"]);
        assert_eq!(enumeration.rejected.len(), 1);
        assert_eq!(enumeration.rejected[0].file_name, "broken name.7z");
        assert_eq!(enumeration.total(), 4);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_enumerate_missing_dir() {
        let dir = std::env::temp_dir().join(format!("missing-{}", Uuid::new_v4()));
        assert!(enumerate_tasks(&dir, &extensions()).await.is_err());
    }
}
