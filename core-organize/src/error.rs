use std::path::PathBuf;
use thiserror::Error;

/// Why a single file could not be placed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferFailure {
    /// A file with the same name is already at the destination. Nothing was
    /// touched.
    #[error("Destination already exists: {}", path.display())]
    Collision { path: PathBuf },

    #[error("Transfer failed: {reason}")]
    Io { reason: String },
}

impl TransferFailure {
    pub fn is_collision(&self) -> bool {
        matches!(self, TransferFailure::Collision { .. })
    }
}

#[derive(Error, Debug)]
pub enum OrganizeError {
    #[error("Invalid filename format: {file_name}")]
    Validation { file_name: String },

    #[error("No usable category in {0:?}")]
    InvalidCategory(Vec<String>),

    #[error(transparent)]
    Transfer(#[from] TransferFailure),

    #[error("Failed to write summary for {}: {message}", path.display())]
    Aggregation { path: PathBuf, message: String },

    #[error("{label} directory does not exist: {}", path.display())]
    RootMissing { label: &'static str, path: PathBuf },

    #[error("Failed to write failure ledger: {0}")]
    Ledger(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, OrganizeError>;
