//! Configuration for PixVault.
//!
//! One [`Config`] covers the library roots, the catalog database, logging and
//! the ingestion pipeline tuning from `pixvault-core`. [`ConfigLoader`]
//! composes it from files, inline JSON and environment overrides so the
//! server and tests share a single set of defaults.

pub mod loader;
pub mod models;

pub use loader::{ConfigLoad, ConfigLoader, ConfigSource, error::ConfigLoadError};
pub use models::{Config, DatabaseConfig, LibraryConfig, LoggingConfig, RootConfig};
