//! Duplicate Resolution
//!
//! Finds archives in a folder that are copies of one another (same name once
//! disambiguation suffixes are stripped), keeps one canonical copy and moves
//! the rest aside.
//!
//! ## Choosing the canonical member
//!
//! - Sizes differ: the largest file wins; on a tie for largest, the first
//!   member in path order.
//! - Sizes all equal: the first member without a disambiguation suffix, or
//!   the first member if every name carries one.
//!
//! Non-canonical members go to `<quarantine>/<normalized name>/`. A file
//! already sitting there under the same name is left alone and the member
//! stays where it was. A suffixed canonical member is then renamed to the
//! clean name.
//!
//! ## Usage
//!
//! ```ignore
//! use core_organize::duplicates::DuplicateResolver;
//!
//! let resolver = DuplicateResolver::new(config.quarantine_root());
//! let report = resolver.resolve_folder(&leaf, &config.archive_extensions).await?;
//! println!("{} files quarantined", report.relocated_count());
//! ```

use crate::error::Result;
use crate::normalizer::{has_suffix, normalize};
use crate::transfer::place;
use core_runtime::config::TransferMode;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Files sharing one normalized name.
///
/// Every member normalizes to `normalized_name`; members are kept in path
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub normalized_name: String,
    pub members: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Groups of one are not duplicates.
    pub fn is_duplicate(&self) -> bool {
        self.members.len() >= 2
    }
}

/// What happened to the canonical member's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The kept file already had a clean name.
    NotNeeded,
    Renamed { from: PathBuf, to: PathBuf },
    Failed { from: PathBuf, reason: String },
}

/// Result for one duplicate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutcome {
    pub normalized_name: String,
    /// Final path of the canonical member.
    pub kept: PathBuf,
    /// `(original, quarantined)` pairs.
    pub relocated: Vec<(PathBuf, PathBuf)>,
    /// Members that could not be moved aside (or measured), with the reason.
    pub failed: Vec<(PathBuf, String)>,
    pub rename: RenameOutcome,
}

/// Outcome of a resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateReport {
    pub groups: Vec<GroupOutcome>,
}

impl DuplicateReport {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn relocated_count(&self) -> usize {
        self.groups.iter().map(|g| g.relocated.len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.groups
            .iter()
            .map(|g| g.failed.len() + usize::from(matches!(g.rename, RenameOutcome::Failed { .. })))
            .sum()
    }
}

/// Bucket `paths` by normalized file name.
///
/// Returns only groups with two or more members, ordered by normalized name;
/// members are sorted by path.
pub fn group_by_normalized_name(paths: &[PathBuf]) -> Vec<DuplicateGroup> {
    let mut buckets: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        buckets.entry(normalize(name)).or_default().push(path.clone());
    }

    buckets
        .into_iter()
        .map(|(normalized_name, mut members)| {
            members.sort();
            DuplicateGroup {
                normalized_name,
                members,
            }
        })
        .filter(DuplicateGroup::is_duplicate)
        .collect()
}

/// Index of the canonical member given `(path, size)` pairs in order.
pub fn choose_canonical(members: &[(PathBuf, u64)]) -> usize {
    let all_equal = members.windows(2).all(|pair| pair[0].1 == pair[1].1);

    if all_equal {
        return members
            .iter()
            .position(|(path, _)| !path_has_suffix(path))
            .unwrap_or(0);
    }

    let mut best = 0;
    for (index, (_, size)) in members.iter().enumerate() {
        if *size > members[best].1 {
            best = index;
        }
    }
    best
}

fn path_has_suffix(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(has_suffix)
}

/// Resolves duplicate groups into a quarantine folder.
#[derive(Debug, Clone)]
pub struct DuplicateResolver {
    quarantine_root: PathBuf,
}

impl DuplicateResolver {
    pub fn new(quarantine_root: impl Into<PathBuf>) -> Self {
        Self {
            quarantine_root: quarantine_root.into(),
        }
    }

    pub fn quarantine_root(&self) -> &Path {
        &self.quarantine_root
    }

    /// Group the archives directly inside `folder` and resolve them.
    #[instrument(skip(self, folder, extensions), fields(folder = %folder.display()))]
    pub async fn resolve_folder(&self, folder: &Path, extensions: &[String]) -> Result<DuplicateReport> {
        let archives = list_archives(folder, extensions).await?;
        let groups = group_by_normalized_name(&archives);

        if groups.is_empty() {
            debug!("No duplicates");
            return Ok(DuplicateReport::default());
        }

        Ok(self.resolve(&groups).await)
    }

    /// Resolve every group of two or more members.
    ///
    /// Individual failures are recorded in the report; nothing here aborts
    /// the pass.
    pub async fn resolve(&self, groups: &[DuplicateGroup]) -> DuplicateReport {
        let mut report = DuplicateReport::default();

        for group in groups.iter().filter(|g| g.is_duplicate()) {
            if let Some(outcome) = self.resolve_group(group).await {
                info!(
                    name = %outcome.normalized_name,
                    kept = %outcome.kept.display(),
                    relocated = outcome.relocated.len(),
                    failed = outcome.failed.len(),
                    "Resolved duplicate group"
                );
                report.groups.push(outcome);
            }
        }

        report
    }

    async fn resolve_group(&self, group: &DuplicateGroup) -> Option<GroupOutcome> {
        let mut failed = Vec::new();
        let mut measured = Vec::with_capacity(group.members.len());

        for member in &group.members {
            match tokio::fs::metadata(member).await {
                Ok(metadata) => measured.push((member.clone(), metadata.len())),
                Err(e) => {
                    warn!(path = %member.display(), error = %e, "Cannot measure duplicate");
                    failed.push((member.clone(), e.to_string()));
                }
            }
        }

        if measured.len() < 2 {
            return None;
        }

        let canonical = choose_canonical(&measured);
        let kept = measured[canonical].0.clone();
        let quarantine = self.quarantine_root.join(&group.normalized_name);
        let mut relocated = Vec::new();

        for (index, (member, _)) in measured.iter().enumerate() {
            if index == canonical {
                continue;
            }

            if let Err(e) = tokio::fs::create_dir_all(&quarantine).await {
                failed.push((member.clone(), e.to_string()));
                continue;
            }

            match place(member, &quarantine, TransferMode::Move).await {
                Ok(moved_to) => relocated.push((member.clone(), moved_to)),
                Err(failure) => {
                    warn!(path = %member.display(), error = %failure, "Duplicate left in place");
                    failed.push((member.clone(), failure.to_string()));
                }
            }
        }

        let (kept, rename) = rename_to_clean(kept, &group.normalized_name).await;

        Some(GroupOutcome {
            normalized_name: group.normalized_name.clone(),
            kept,
            relocated,
            failed,
            rename,
        })
    }
}

/// Rename a suffixed file to `clean_name` in the same folder. Never
/// overwrites.
async fn rename_to_clean(path: PathBuf, clean_name: &str) -> (PathBuf, RenameOutcome) {
    if !path_has_suffix(&path) {
        return (path, RenameOutcome::NotNeeded);
    }

    let target = path.with_file_name(clean_name);
    let attempt = match tokio::fs::try_exists(&target).await {
        Ok(true) => Err(format!("{} already exists", target.display())),
        Ok(false) => tokio::fs::rename(&path, &target)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match attempt {
        Ok(()) => {
            let outcome = RenameOutcome::Renamed {
                from: path,
                to: target.clone(),
            };
            (target, outcome)
        }
        Err(reason) => {
            warn!(path = %path.display(), %reason, "Could not rename canonical duplicate");
            let outcome = RenameOutcome::Failed {
                from: path.clone(),
                reason,
            };
            (path, outcome)
        }
    }
}

async fn list_archives(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();
    let mut entries = tokio::fs::read_dir(folder).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_archive = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)));
        if is_archive {
            archives.push(path);
        }
    }

    archives.sort();
    Ok(archives)
}
