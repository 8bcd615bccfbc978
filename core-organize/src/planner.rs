//! Placement Planner
//!
//! Maps a category path onto a directory chain under the models root.

use crate::error::{OrganizeError, Result};
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static ILLEGAL_PATH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap());

/// Remove characters that cannot appear in a path component.
///
/// Returns `None` when nothing usable is left (empty, `.` or `..`).
pub fn sanitize_segment(category: &str) -> Option<String> {
    let cleaned = ILLEGAL_PATH_CHARS.replace_all(category, "");
    let cleaned = cleaned.trim();

    match cleaned {
        "" | "." | ".." => None,
        other => Some(other.to_string()),
    }
}

/// Create (or reuse) `root/<category>/<category>...` and return the leaf.
///
/// Existing segments are reused; calling twice with the same categories
/// yields the same path and creates nothing new.
pub async fn ensure_path(root: &Path, categories: &[String]) -> Result<PathBuf> {
    let segments: Vec<String> = categories
        .iter()
        .filter_map(|category| sanitize_segment(category))
        .collect();

    if segments.is_empty() {
        return Err(OrganizeError::InvalidCategory(categories.to_vec()));
    }

    let mut current = root.to_path_buf();
    for segment in segments {
        current.push(&segment);

        match tokio::fs::create_dir(&current).await {
            Ok(()) => debug!(folder = %segment, "Created category folder"),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !tokio::fs::metadata(&current).await?.is_dir() {
                    return Err(OrganizeError::Io(std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        format!("{} exists and is not a directory", current.display()),
                    )));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(current)
}
