//! Clerk backend API client for exporting snapshots.
//!
//! Fetches users, organizations and organization memberships from the source
//! platform and writes them as newline-delimited JSON, one record per line,
//! exactly as the API returned them.

mod client;
mod error;
pub mod snapshot;

pub use client::{ClerkClient, DEFAULT_API_URL, PAGE_SIZE};
pub use error::ClerkError;
pub use snapshot::{SnapshotCounts, SnapshotPaths, export_snapshot};
