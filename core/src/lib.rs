//! Hauler Core - shared error, configuration and logging types.
//!
//! Content packaging lives in `hauler-content`; this crate carries the
//! ambient pieces every hauler binary and library needs.

pub mod config;
pub mod error;
pub mod log;

// Re-export commonly used types
pub use config::{HaulerConfig, LogLevel, RegistryConfig};
pub use error::{ErrorKind, HaulerError, Result};

/// Hauler core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
