//! # Host Bridge Traits
//!
//! Capability contracts the organizer core relies on but does not implement
//! itself.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Metadata lookups and preview downloads
//! - [`Clock`](time::Clock) - Time source for summary timestamps and deterministic tests
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert their native errors into it and keep the message actionable
//! (include the URL or path involved).
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`: the same client is shared by all
//! workers of a run.

pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{Clock, FixedClock, SystemClock};
