//! # corral-common
//!
//! Shared foundation for the Corral workspace: the unified error type,
//! domain primitive types (ids, statuses, mounts, port maps, limits),
//! and system-wide constants and default paths.

pub mod constants;
pub mod error;
pub mod types;
