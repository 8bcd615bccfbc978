//! Classification lookup contract.
//!
//! A lookup turns a file id (`<digits>.<hex>`) into the category path the
//! archive belongs to, plus an optional preview image. Callers validate the
//! id before asking; implementations do not re-check it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::MetadataError;

/// What the lookup service knows about one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Category names from outermost to innermost (one or two levels).
    pub category_path: Vec<String>,
    /// Absolute URL of the matching preview image, if any.
    pub preview_image_url: Option<String>,
    /// Display title of the model.
    pub title: String,
}

impl ClassificationResult {
    /// `Some(LookupFailure::NoImage)` when no preview could be matched.
    ///
    /// A missing preview does not stop classification; the image step is
    /// skipped instead.
    pub fn missing_preview(&self) -> Option<LookupFailure> {
        match self.preview_image_url {
            Some(_) => None,
            None => Some(LookupFailure::NoImage),
        }
    }
}

/// Why a lookup produced no usable classification.
///
/// The display strings are what ends up in the failure ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupFailure {
    /// The service returned zero results.
    #[error("No models found in API response")]
    NoMatch,

    /// The first result carries no category path.
    #[error("No categories found")]
    NoCategory,

    /// No preview image shares the file's model number. Soft: never returned
    /// as an error by [`MetadataLookup::lookup`].
    #[error("No matching image found")]
    NoImage,

    /// Transport, protocol or timeout failure.
    #[error("Lookup failed: {0}")]
    LookupError(String),
}

impl LookupFailure {
    /// Soft failures let the task continue.
    pub fn is_soft(&self) -> bool {
        matches!(self, LookupFailure::NoImage)
    }
}

impl From<MetadataError> for LookupFailure {
    fn from(error: MetadataError) -> Self {
        LookupFailure::LookupError(error.to_string())
    }
}

/// Metadata lookup service.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Classify `file_id`.
    ///
    /// Must not touch shared state; the caller records the outcome.
    async fn lookup(&self, file_id: &str) -> Result<ClassificationResult, LookupFailure>;
}
