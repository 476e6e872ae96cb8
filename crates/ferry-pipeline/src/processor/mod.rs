//! Per-kind record processors.
//!
//! A processor turns one source record into one destination entity. Each is
//! written so that running it again against the same destination state
//! resolves to the entity the first run produced instead of creating a
//! duplicate.

/// Unwrap a destination call, turning its error into the task's outcome.
macro_rules! attempt {
    ($call:expr) => {
        match $call {
            Ok(value) => value,
            Err(err) => return $crate::TaskOutcome::from(err),
        }
    };
}

mod membership;
mod organization;
mod user;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::{RecordKind, TaskOutcome, TranslationEntry};

pub use membership::{DEFAULT_ROLE, MembershipProcessor, map_role};
pub use organization::OrganizationProcessor;
pub use user::{UserProcessor, password_hash_type};

/// Migrates one kind of record.
#[async_trait]
pub trait RecordProcessor: Send + Sync + 'static {
    /// The snapshot record shape this processor consumes.
    type Record: DeserializeOwned + Send + Sync + 'static;

    const KIND: RecordKind;

    /// The record's source-assigned identifier.
    fn record_id(record: &Self::Record) -> &str;

    /// Migrate one record. May be called again for the same record after a
    /// rate-limited attempt.
    async fn process(&self, record: &Self::Record) -> TaskOutcome<TranslationEntry>;
}

/// Skip unless the record's `object` tag names this kind.
pub(crate) fn check_tag<T>(kind: RecordKind, tag: Option<&str>) -> Result<(), TaskOutcome<T>> {
    match tag {
        Some(tag) if tag == kind.tag() => Ok(()),
        Some(tag) => Err(TaskOutcome::skipped(format!(
            "expected object \"{}\", found \"{}\"",
            kind.tag(),
            tag
        ))),
        None => Err(TaskOutcome::skipped(format!(
            "missing object tag, expected \"{}\"",
            kind.tag()
        ))),
    }
}
