//! External Lookup Providers
//!
//! Clients for remote catalogue services:
//! - 3dsky - model search and preview images
//!
//! Providers perform a single request per lookup unless a retry policy is
//! set explicitly; pacing between lookups belongs to the caller.

pub mod sky;

pub use sky::SkyLookupClient;
