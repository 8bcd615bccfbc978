//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the organizer core:
//! - Logging and tracing infrastructure
//! - Run configuration
//! - Progress event bus
//!
//! Every other core crate depends on this one for its configuration types and
//! for the event channel that carries progress out of the worker pool.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
