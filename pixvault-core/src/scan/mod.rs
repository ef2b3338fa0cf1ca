//! Bulk recursive scanning of watched directory trees.

mod listing;
mod scanner;

pub use listing::{DirListing, list_directory};
pub use scanner::{BulkTreeScanner, ScanReport};
