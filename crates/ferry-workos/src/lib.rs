//! WorkOS User Management client for ferry.
//!
//! This crate provides the destination side of a migration:
//!
//! - **HTTP Client**: [`WorkosClient`], a thin client over the handful of
//!   User Management endpoints the migration needs
//! - **Directory**: the [`Directory`] trait the record processors are written
//!   against, so they never depend on a concrete transport
//! - **Memory**: [`MemoryDirectory`], an in-process directory with the same
//!   conflict semantics, used for dry runs and tests

mod client;
mod directory;
mod error;
pub mod memory;
mod types;

pub use client::{DEFAULT_API_URL, WorkosClient};
pub use directory::Directory;
pub use error::DirectoryError;
pub use memory::MemoryDirectory;
pub use types::*;
