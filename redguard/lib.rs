#![allow(clippy::module_inception)]
#![warn(missing_docs)]

//! redguard - A resilience layer for redis clients running behind Sentinel:
//! failure classification, bounded retries and transparent reconnection
//! through pluggable primary discovery.

mod prelude;

/// Error handling utilities.
pub mod errors;
/// Logging utilities.
pub mod log;
/// Completely miscellaneous utilities.
pub mod misc;
/// The resilience core: failure classification, bounded retries, reconnection
/// and the guarded client.
pub mod redis;
