//! # Metadata Lookup Module
//!
//! Resolves archive file ids to catalogue classifications and handles the
//! preview images that come with them.
//!
//! ## Overview
//!
//! This module handles:
//! - Classification lookups against the 3dsky model search (`providers`)
//! - Streaming preview downloads (`preview`)
//! - Choosing the better of competing preview images (`image_quality`)

pub mod error;
pub mod image_quality;
pub mod lookup;
pub mod preview;
pub mod providers;

pub use error::{MetadataError, Result};
pub use image_quality::{ImageCandidate, ImageDecision};
pub use lookup::{ClassificationResult, LookupFailure, MetadataLookup};
pub use preview::{HttpPreviewSource, PreviewSource};
pub use providers::SkyLookupClient;
