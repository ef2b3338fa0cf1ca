//! Adapters for the traits in [`crate::ports`].

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
