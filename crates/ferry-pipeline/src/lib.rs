//! Rate-limited, dependency-ordered identity migration pipeline.
//!
//! A migration job streams one snapshot file through a record processor:
//!
//! - **Source**: [`RecordSource`] reads newline-delimited JSON one record at
//!   a time, rejecting malformed lines without stopping the stream
//! - **Translation**: [`TranslationTable`] maps source ids to destination ids
//!   for records migrated by an earlier job
//! - **Executor**: [`Executor`] runs tasks with bounded concurrency and
//!   pauses, drains and resumes when the destination rate-limits
//! - **Processors**: one [`RecordProcessor`] per record kind
//! - **Driver**: [`MigrationDriver`] wires them together and produces a
//!   [`JobReport`] plus the job's translation artifact

mod driver;
mod error;
pub mod executor;
mod outcome;
pub mod processor;
mod records;
mod source;
mod translation;

pub use driver::{JobReport, MigrationDriver, RecordTask, run_job};
pub use error::{JobFailure, PipelineError};
pub use executor::{Completion, Executor, ExecutorConfig, ExecutorState, Resolution, Task};
pub use outcome::TaskOutcome;
pub use processor::{MembershipProcessor, OrganizationProcessor, RecordProcessor, UserProcessor};
pub use records::*;
pub use source::{RecordSource, SourceLine};
pub use translation::{TranslationEntry, TranslationTable, write_artifact};
