//! # Organize Module
//!
//! Classifies archive files into a category tree and keeps that tree tidy.
//!
//! ## Overview
//!
//! This module manages one organize run, including:
//! - Enumerating and validating source archives
//! - Looking up each archive's category path
//! - Creating category folders and moving archives into them
//! - Settling preview images and duplicate archives per folder
//! - Maintaining per-folder summary records and the failure ledger
//!
//! ## Components
//!
//! - **Name Normalizer** (`normalizer`): Strips `(n)` disambiguation suffixes
//! - **Tasks** (`task`): File id validation and source enumeration
//! - **Placement Planner** (`planner`): Category path to directory chain
//! - **Asset Transfer** (`transfer`): Collision-safe move/copy
//! - **Duplicate Resolver** (`duplicates`): Canonical copy selection and quarantine
//! - **Preview Handling** (`images`): Download, reconcile, or bring along images
//! - **Folder Summary Aggregator** (`summary`): Sidecar records
//! - **Failure Ledger** (`ledger`): Per-run failure document
//! - **Work Coordinator** (`coordinator`): Worker pool over the per-task pipeline

pub mod coordinator;
pub mod duplicates;
pub mod error;
pub mod folder_locks;
pub mod images;
pub mod ledger;
pub mod normalizer;
pub mod pipeline;
pub mod planner;
pub mod summary;
pub mod task;
pub mod transfer;

pub use coordinator::{ProgressCounter, RunReport, WorkCoordinator};
pub use duplicates::{DuplicateGroup, DuplicateReport, DuplicateResolver, GroupOutcome, RenameOutcome};
pub use error::{OrganizeError, Result, TransferFailure};
pub use folder_locks::FolderLocks;
pub use images::{PreviewHandler, PreviewOutcome};
pub use ledger::FailureLedger;
pub use normalizer::normalize;
pub use pipeline::{TaskOutcome, TaskPipeline};
pub use planner::ensure_path;
pub use summary::{FolderSummary, FolderSummaryAggregator};
pub use task::{enumerate_tasks, Enumeration, FileTask, ValidationFailure};
pub use transfer::place;
