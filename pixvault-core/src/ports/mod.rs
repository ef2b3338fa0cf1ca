//! Boundaries to collaborators that live outside the ingestion core.
//!
//! Adapters for these traits are in [`crate::infra`].

mod catalog;
mod notify;
mod registry;
mod settings;

pub use catalog::{CatalogStore, InsertOutcome};
pub use notify::NotificationSink;
pub use registry::PathRegistry;
pub use settings::SettingsSource;
