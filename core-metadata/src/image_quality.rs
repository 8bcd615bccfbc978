//! Image Quality Resolver
//!
//! Decides which preview image to keep when a folder already holds images
//! for the same model. Candidates are ordered by pixel count first and byte
//! size second; the resolver never deletes anything itself.
//!
//! ```ignore
//! use core_metadata::image_quality::{inspect, inspect_all, reconcile, ImageDecision};
//!
//! let existing = inspect_all(&related_paths);
//! let incoming = inspect(&downloaded)?;
//! match reconcile(&existing, &incoming) {
//!     ImageDecision::KeepIncoming => { /* delete all existing */ }
//!     ImageDecision::KeepExisting(winner) => { /* delete everything but winner */ }
//! }
//! ```

use crate::error::{MetadataError, Result};
use image::ImageReader;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One image considered for retention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
}

impl ImageCandidate {
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, byte_size: u64) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            byte_size,
        }
    }

    /// `width * height`
    pub fn pixel_resolution(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    fn quality_key(&self) -> (u64, u64) {
        (self.pixel_resolution(), self.byte_size)
    }
}

/// Outcome of [`reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDecision {
    /// The incoming image wins; every existing candidate should go.
    KeepIncoming,
    /// This existing image wins; the incoming one and all other existing
    /// candidates should go.
    KeepExisting(PathBuf),
}

/// Pick between the best existing candidate and the incoming one.
///
/// The best existing candidate is the first maximum of
/// `(pixel_resolution, byte_size)`. It is kept only when it strictly beats
/// the incoming image; ties go to the incoming image.
pub fn reconcile(existing: &[ImageCandidate], incoming: &ImageCandidate) -> ImageDecision {
    let best = existing.iter().fold(None::<&ImageCandidate>, |best, candidate| match best {
        Some(current) if current.quality_key() >= candidate.quality_key() => Some(current),
        _ => Some(candidate),
    });

    match best {
        Some(best) if best.quality_key() > incoming.quality_key() => {
            ImageDecision::KeepExisting(best.path.clone())
        }
        _ => ImageDecision::KeepIncoming,
    }
}

/// Read dimensions from the image header and the size from file metadata.
pub fn inspect(path: &Path) -> Result<ImageCandidate> {
    // Content sniffing first: downloads land under a `.part` name.
    let (width, height) = ImageReader::open(path)?
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| MetadataError::ImageProcessing {
            path: path.display().to_string(),
            message: format!("Failed to read image header: {}", e),
        })?;
    let byte_size = std::fs::metadata(path)?.len();

    Ok(ImageCandidate::new(path, width, height, byte_size))
}

/// Probe every path, dropping files whose header cannot be read.
pub fn inspect_all(paths: &[PathBuf]) -> Vec<ImageCandidate> {
    paths
        .iter()
        .filter_map(|path| match inspect(path) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable image");
                None
            }
        })
        .collect()
}
