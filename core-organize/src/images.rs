//! Preview image handling for a placed archive.
//!
//! With a preview URL the image is downloaded next to the archive and
//! reconciled against images already there for the same model; the loser(s)
//! are deleted. Without one, or when the download fails, images for the model
//! that sit in the source directory are brought along instead.
//!
//! Nothing here fails a task: every problem is logged and the folder is
//! left as it is.

use crate::task::FileTask;
use crate::transfer::place;
use core_metadata::image_quality::{inspect, inspect_all, reconcile, ImageCandidate, ImageDecision};
use core_metadata::preview::PreviewSource;
use core_runtime::config::TransferMode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Extensions treated as preview images (lowercase, no dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

const PARTIAL_SUFFIX: &str = ".part";

/// Upper bound on one preview download unless configured otherwise.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    /// The download won; `removed` lists the existing images it replaced.
    Downloaded { kept: PathBuf, removed: Vec<PathBuf> },
    /// An existing image beat the download.
    KeptExisting { kept: PathBuf, removed: Vec<PathBuf> },
    /// Images were taken over from the source directory (possibly none).
    RelatedMoved { moved: Vec<PathBuf> },
}

pub struct PreviewHandler {
    source: Arc<dyn PreviewSource>,
    transfer_mode: TransferMode,
    download_timeout: Duration,
}

impl PreviewHandler {
    pub fn new(source: Arc<dyn PreviewSource>, transfer_mode: TransferMode) -> Self {
        Self {
            source,
            transfer_mode,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    /// A download still running after `limit` is abandoned and treated as
    /// failed.
    pub fn with_download_timeout(mut self, limit: Duration) -> Self {
        self.download_timeout = limit;
        self
    }

    /// Settle the preview for `task`, whose archive now lives in `dest`.
    pub async fn handle(&self, task: &FileTask, dest: &Path, preview_url: Option<&str>) -> PreviewOutcome {
        if let Some(url) = preview_url {
            if let Some(outcome) = self.download_and_reconcile(task, dest, url).await {
                return outcome;
            }
        }

        let moved = self.bring_related_images(task, dest).await;
        PreviewOutcome::RelatedMoved { moved }
    }

    async fn download_and_reconcile(
        &self,
        task: &FileTask,
        dest: &Path,
        url: &str,
    ) -> Option<PreviewOutcome> {
        let final_path = dest.join(format!("{}.jpeg", task.id()));
        let partial = dest.join(format!("{}.jpeg{}", task.id(), PARTIAL_SUFFIX));

        match timeout(self.download_timeout, self.source.fetch(url, &partial)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(file_id = task.id(), error = %e, "Preview download failed");
                remove_quietly(&partial).await;
                return None;
            }
            Err(_) => {
                warn!(file_id = task.id(), timeout = ?self.download_timeout, "Preview download timed out");
                remove_quietly(&partial).await;
                return None;
            }
        }

        let existing_paths = match related_images(dest, task.model_number()).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!(folder = %dest.display(), error = %e, "Cannot list existing images");
                remove_quietly(&partial).await;
                return None;
            }
        };

        let inspect_path = partial.clone();
        let inspected = tokio::task::spawn_blocking(move || {
            let incoming = inspect(&inspect_path);
            (incoming, inspect_all(&existing_paths))
        })
        .await;

        let (incoming, existing) = match inspected {
            Ok((Ok(incoming), existing)) => (incoming, existing),
            Ok((Err(e), _)) => {
                warn!(file_id = task.id(), error = %e, "Downloaded preview is not a readable image");
                remove_quietly(&partial).await;
                return None;
            }
            Err(e) => {
                warn!(file_id = task.id(), error = %e, "Image inspection task failed");
                remove_quietly(&partial).await;
                return None;
            }
        };

        let outcome = match reconcile(&existing, &incoming) {
            ImageDecision::KeepIncoming => {
                let removed = remove_candidates(&existing, None).await;
                if let Err(e) = tokio::fs::rename(&partial, &final_path).await {
                    warn!(file_id = task.id(), error = %e, "Could not finalize preview");
                    remove_quietly(&partial).await;
                    return None;
                }
                PreviewOutcome::Downloaded {
                    kept: final_path,
                    removed,
                }
            }
            ImageDecision::KeepExisting(winner) => {
                remove_quietly(&partial).await;
                let removed = remove_candidates(&existing, Some(&winner)).await;
                PreviewOutcome::KeptExisting {
                    kept: winner,
                    removed,
                }
            }
        };

        info!(file_id = task.id(), outcome = ?outcome, "Preview settled");
        Some(outcome)
    }

    async fn bring_related_images(&self, task: &FileTask, dest: &Path) -> Vec<PathBuf> {
        let Some(source_dir) = task.source_path().parent() else {
            return Vec::new();
        };

        let related = match related_images(source_dir, task.model_number()).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!(folder = %source_dir.display(), error = %e, "Cannot list source images");
                return Vec::new();
            }
        };

        let mut moved = Vec::new();
        for image in related {
            match place(&image, dest, self.transfer_mode).await {
                Ok(path) => moved.push(path),
                Err(e) => warn!(image = %image.display(), error = %e, "Related image not moved"),
            }
        }

        if !moved.is_empty() {
            debug!(file_id = task.id(), count = moved.len(), "Moved related images");
        }
        moved
    }
}

/// Images in `dir` whose stem starts with `model_number` (not followed by
/// another digit), sorted by path.
pub async fn related_images(dir: &Path, model_number: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        if is_related_image(&path, model_number) {
            images.push(path);
        }
    }

    images.sort();
    Ok(images)
}

fn is_related_image(path: &Path, model_number: &str) -> bool {
    let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)));
    if !is_image {
        return false;
    }

    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.strip_prefix(model_number))
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
}

/// Delete every candidate except `keep`; returns what was removed.
async fn remove_candidates(candidates: &[ImageCandidate], keep: Option<&Path>) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for candidate in candidates {
        if Some(candidate.path.as_path()) == keep {
            continue;
        }
        match tokio::fs::remove_file(&candidate.path).await {
            Ok(()) => removed.push(candidate.path.clone()),
            Err(e) => warn!(image = %candidate.path.display(), error = %e, "Could not remove image"),
        }
    }
    removed
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Could not remove partial download");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_metadata::error::{MetadataError, Result as MetadataResult};
    use image::{ImageFormat, Rgb, RgbImage};
    use uuid::Uuid;

    /// Serves a generated PNG of the given size, or fails.
    struct GeneratedPreview {
        size: Option<(u32, u32)>,
    }

    #[async_trait]
    impl PreviewSource for GeneratedPreview {
        async fn fetch(&self, url: &str, dest: &Path) -> MetadataResult<u64> {
            let (width, height) = self
                .size
                .ok_or_else(|| MetadataError::DownloadFailed(url.to_string()))?;
            write_image(dest, width, height);
            Ok(std::fs::metadata(dest)?.len())
        }
    }

    fn write_image(path: &Path, width: u32, height: u32) {
        RgbImage::from_pixel(width, height, Rgb([120, 40, 200]))
            .save_with_format(path, ImageFormat::Png)
            .unwrap();
    }

    struct Scratch {
        root: PathBuf,
    }

    impl Scratch {
        fn new() -> Self {
            let root = std::env::temp_dir().join(format!("images-{}", Uuid::new_v4()));
            std::fs::create_dir_all(root.join("src")).unwrap();
            std::fs::create_dir_all(root.join("dest")).unwrap();
            Self { root }
        }

        fn src(&self) -> PathBuf {
            self.root.join("src")
        }

        fn dest(&self) -> PathBuf {
            self.root.join("dest")
        }

        fn task(&self) -> FileTask {
            FileTask::from_path(self.src().join("123.abc.zip")).unwrap()
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.root).ok();
        }
    }

    /// Writes a few bytes, then never finishes.
    struct StalledPreview;

    #[async_trait]
    impl PreviewSource for StalledPreview {
        async fn fetch(&self, _url: &str, dest: &Path) -> MetadataResult<u64> {
            tokio::fs::write(dest, b"\x89PNG").await?;
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(4)
        }
    }

    fn handler(size: Option<(u32, u32)>) -> PreviewHandler {
        PreviewHandler::new(Arc::new(GeneratedPreview { size }), TransferMode::Move)
    }

    #[test]
    fn test_is_related_image() {
        assert!(is_related_image(Path::new("/d/123.abc.jpeg"), "123"));
        assert!(is_related_image(Path::new("/d/123_side.PNG"), "123"));
        assert!(is_related_image(Path::new("/d/123.jpg"), "123"));
        assert!(!is_related_image(Path::new("/d/1234.jpg"), "123"));
        assert!(!is_related_image(Path::new("/d/123.abc.zip"), "123"));
        assert!(!is_related_image(Path::new("/d/123.abc.jpeg.part"), "123"));
    }

    #[tokio::test]
    async fn test_download_replaces_smaller_existing() {
        let scratch = Scratch::new();
        let old = scratch.dest().join("123_old.jpg");
        write_image(&old, 10, 10);
        let unrelated = scratch.dest().join("999.jpg");
        write_image(&unrelated, 10, 10);

        let outcome = handler(Some((40, 30)))
            .handle(&scratch.task(), &scratch.dest(), Some("https://cdn/123.jpeg"))
            .await;

        let kept = scratch.dest().join("123.abc.jpeg");
        assert_eq!(
            outcome,
            PreviewOutcome::Downloaded {
                kept: kept.clone(),
                removed: vec![old.clone()]
            }
        );
        assert!(kept.exists());
        assert!(!old.exists());
        assert!(unrelated.exists());
        assert!(!scratch.dest().join("123.abc.jpeg.part").exists());
    }

    #[tokio::test]
    async fn test_larger_existing_beats_download() {
        let scratch = Scratch::new();
        let big = scratch.dest().join("123.png");
        write_image(&big, 64, 64);
        let small = scratch.dest().join("123_thumb.jpg");
        write_image(&small, 8, 8);

        let outcome = handler(Some((20, 20)))
            .handle(&scratch.task(), &scratch.dest(), Some("https://cdn/123.jpeg"))
            .await;

        assert_eq!(
            outcome,
            PreviewOutcome::KeptExisting {
                kept: big.clone(),
                removed: vec![small.clone()]
            }
        );
        assert!(big.exists());
        assert!(!small.exists());
        assert!(!scratch.dest().join("123.abc.jpeg").exists());
        assert!(!scratch.dest().join("123.abc.jpeg.part").exists());
    }

    #[tokio::test]
    async fn test_malformed_existing_is_ignored() {
        let scratch = Scratch::new();
        let broken = scratch.dest().join("123.jpg");
        std::fs::write(&broken, b"garbage").unwrap();

        let outcome = handler(Some((5, 5)))
            .handle(&scratch.task(), &scratch.dest(), Some("https://cdn/123.jpeg"))
            .await;

        assert!(matches!(outcome, PreviewOutcome::Downloaded { ref removed, .. } if removed.is_empty()));
        assert!(broken.exists());
    }

    #[tokio::test]
    async fn test_failed_download_moves_related_images() {
        let scratch = Scratch::new();
        let related = scratch.src().join("123.jpg");
        write_image(&related, 4, 4);
        let other = scratch.src().join("77.jpg");
        write_image(&other, 4, 4);

        let outcome = handler(None)
            .handle(&scratch.task(), &scratch.dest(), Some("https://cdn/123.jpeg"))
            .await;

        assert_eq!(
            outcome,
            PreviewOutcome::RelatedMoved {
                moved: vec![scratch.dest().join("123.jpg")]
            }
        );
        assert!(!related.exists());
        assert!(other.exists());
    }

    #[tokio::test]
    async fn test_no_url_never_overwrites() {
        let scratch = Scratch::new();
        write_image(&scratch.src().join("123.jpg"), 4, 4);
        std::fs::write(scratch.dest().join("123.jpg"), b"keep me").unwrap();

        let outcome = handler(Some((4, 4)))
            .handle(&scratch.task(), &scratch.dest(), None)
            .await;

        assert_eq!(outcome, PreviewOutcome::RelatedMoved { moved: vec![] });
        assert_eq!(std::fs::read(scratch.dest().join("123.jpg")).unwrap(), b"keep me");
        assert!(scratch.src().join("123.jpg").exists());
    }

    #[tokio::test]
    async fn test_stalled_download_falls_back_to_related_images() {
        let scratch = Scratch::new();
        let related = scratch.src().join("123_front.jpg");
        write_image(&related, 4, 4);

        let handler = PreviewHandler::new(Arc::new(StalledPreview), TransferMode::Move)
            .with_download_timeout(Duration::from_millis(100));
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            handler.handle(&scratch.task(), &scratch.dest(), Some("https://cdn/123.jpeg")),
        )
        .await
        .expect("stalled download must be abandoned");

        assert_eq!(
            outcome,
            PreviewOutcome::RelatedMoved {
                moved: vec![scratch.dest().join("123_front.jpg")]
            }
        );
        assert!(!scratch.dest().join("123.abc.jpeg.part").exists());
        assert!(!scratch.dest().join("123.abc.jpeg").exists());
    }
}
