//! One migration job: snapshot in, translation artifact out.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::executor::{Completion, Executor, ExecutorConfig, Resolution, Task};
use crate::{
    JobFailure, PipelineError, RecordKind, RecordProcessor, RecordSource, TaskOutcome,
    TranslationEntry, write_artifact,
};

/// One source record on its way through the executor.
pub struct RecordTask<P: RecordProcessor> {
    /// Position in the snapshot, for diagnostics.
    pub ordinal: usize,
    pub record: P::Record,
    processor: Arc<P>,
}

impl<P: RecordProcessor> RecordTask<P> {
    pub fn new(ordinal: usize, record: P::Record, processor: Arc<P>) -> Self {
        Self {
            ordinal,
            record,
            processor,
        }
    }

    pub fn source_id(&self) -> &str {
        P::record_id(&self.record)
    }
}

#[async_trait]
impl<P: RecordProcessor> Task for RecordTask<P> {
    type Output = TranslationEntry;

    async fn run(&self) -> TaskOutcome<TranslationEntry> {
        self.processor.process(&self.record).await
    }
}

/// What a job did.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub kind: RecordKind,
    /// Non-blank lines read from the snapshot.
    pub records_read: usize,
    pub migrated: usize,
    pub skipped: usize,
    /// Lines that did not parse as a record.
    pub rejected: usize,
    pub failed: usize,
    /// Extra attempts caused by rate limiting.
    pub retried: usize,
    /// Submitted records never run because the job aborted.
    pub abandoned: usize,
    pub entries: Vec<TranslationEntry>,
}

impl JobReport {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            records_read: 0,
            migrated: 0,
            skipped: 0,
            rejected: 0,
            failed: 0,
            retried: 0,
            abandoned: 0,
            entries: Vec::new(),
        }
    }

    /// `X of Y <kind> records imported`.
    pub fn summary(&self) -> String {
        format!(
            "{} of {} {} records imported ({} skipped, {} rejected, {} failed)",
            self.migrated, self.records_read, self.kind, self.skipped, self.rejected, self.failed
        )
    }
}

/// Runs one job for one record kind.
pub struct MigrationDriver<P: RecordProcessor> {
    processor: Arc<P>,
    config: ExecutorConfig,
}

impl<P: RecordProcessor> MigrationDriver<P> {
    pub fn new(processor: P, config: ExecutorConfig) -> Self {
        Self {
            processor: Arc::new(processor),
            config,
        }
    }

    /// Stream `input` through the processor.
    ///
    /// Stops reading at the first fatal outcome; work already in flight is
    /// still recorded and returned in the failure's partial report.
    #[tracing::instrument(skip(self), fields(kind = %P::KIND))]
    pub async fn run(&self, input: &Path) -> Result<JobReport, JobFailure> {
        match RecordSource::<P::Record>::open(input).await {
            Ok(source) => self.run_source(source).await,
            Err(error) => Err(JobFailure {
                error,
                partial: JobReport::new(P::KIND),
            }),
        }
    }

    /// Stream an already-open source through the processor.
    ///
    /// A read failure stops reading but lets every submitted record finish,
    /// so the partial report covers each line read before it.
    pub async fn run_source(
        &self,
        mut source: RecordSource<P::Record>,
    ) -> Result<JobReport, JobFailure> {
        let mut tally = Tally::new(P::KIND);
        info!(path = %source.path().display(), "migrating {} records", P::KIND);

        let mut executor = Executor::new(self.config);

        loop {
            while tally.fatal.is_none() && executor.is_saturated() {
                match executor.next().await {
                    Some(completion) => tally.record(completion),
                    None => break,
                }
            }
            if tally.fatal.is_some() {
                break;
            }

            let line = match source.next().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(error) => {
                    error!(
                        %error,
                        pending = executor.pending(),
                        in_flight = executor.in_flight(),
                        "snapshot read failed, finishing submitted records"
                    );
                    tally.fatal = Some(error);
                    break;
                }
            };
            tally.report.records_read += 1;

            match line.record {
                Ok(record) => {
                    executor.submit(RecordTask::new(
                        line.ordinal,
                        record,
                        Arc::clone(&self.processor),
                    ));
                }
                Err(reason) => {
                    tally.report.rejected += 1;
                    warn!(
                        ordinal = line.ordinal,
                        line = line.line_number,
                        "({}) rejected {} record: {}",
                        line.ordinal,
                        P::KIND,
                        reason
                    );
                }
            }
        }

        while let Some(completion) = executor.next().await {
            tally.record(completion);
        }
        tally.report.abandoned = executor.dropped();

        match tally.fatal {
            Some(error) => Err(JobFailure {
                error,
                partial: tally.report,
            }),
            None => Ok(tally.report),
        }
    }
}

/// The driver loop's accumulator. Only touched from that loop.
struct Tally {
    report: JobReport,
    seen: HashSet<String>,
    fatal: Option<PipelineError>,
}

impl Tally {
    fn new(kind: RecordKind) -> Self {
        Self {
            report: JobReport::new(kind),
            seen: HashSet::new(),
            fatal: None,
        }
    }

    fn record<P: RecordProcessor>(&mut self, completion: Completion<RecordTask<P>>) {
        let task = &completion.task;
        let kind = P::KIND;
        self.report.retried += completion.attempts.saturating_sub(1) as usize;

        match completion.resolution {
            Resolution::Success(entry) => {
                if !self.seen.insert(entry.source_id.clone()) {
                    self.report.skipped += 1;
                    warn!(
                        ordinal = task.ordinal,
                        "({}) skipped {} {}: duplicate source id",
                        task.ordinal,
                        kind,
                        entry.source_id
                    );
                    return;
                }
                info!(
                    ordinal = task.ordinal,
                    source_id = %entry.source_id,
                    destination_id = %entry.destination_id,
                    "({}) imported {} {} as {}",
                    task.ordinal,
                    kind,
                    entry.source_id,
                    entry.destination_id
                );
                self.report.migrated += 1;
                self.report.entries.push(entry);
            }
            Resolution::Skipped(reason) => {
                self.report.skipped += 1;
                info!(
                    ordinal = task.ordinal,
                    source_id = task.source_id(),
                    "({}) skipped {} {}: {}",
                    task.ordinal,
                    kind,
                    task.source_id(),
                    reason
                );
            }
            Resolution::Fatal(err) => {
                self.report.failed += 1;
                error!(
                    ordinal = task.ordinal,
                    source_id = task.source_id(),
                    "({}) failed {} {}: {}",
                    task.ordinal,
                    kind,
                    task.source_id(),
                    err
                );
                if self.fatal.is_none() {
                    self.fatal = Some(err);
                }
            }
        }
    }
}

/// Run a job and write its translation artifact to `output`.
///
/// On failure the partial artifact is still written, unless nothing was
/// read at all.
pub async fn run_job<P: RecordProcessor>(
    processor: P,
    config: ExecutorConfig,
    input: &Path,
    output: &Path,
) -> Result<JobReport, JobFailure> {
    let driver = MigrationDriver::new(processor, config);
    persist(driver.run(input).await, output).await
}

async fn persist(
    result: Result<JobReport, JobFailure>,
    output: &Path,
) -> Result<JobReport, JobFailure> {
    match result {
        Ok(report) => {
            if let Err(error) = write_artifact(output, &report.entries).await {
                return Err(JobFailure {
                    error,
                    partial: report,
                });
            }
            info!(path = %output.display(), entries = report.entries.len(), "wrote translation artifact");
            info!("{}", report.summary());
            Ok(report)
        }
        Err(failure) => {
            if failure.partial.records_read > 0 {
                match write_artifact(output, &failure.partial.entries).await {
                    Ok(()) => warn!(
                        path = %output.display(),
                        entries = failure.partial.entries.len(),
                        "wrote partial translation artifact"
                    ),
                    Err(error) => error!(%error, "could not write partial translation artifact"),
                }
            }
            warn!("{}", failure.partial.summary());
            Err(failure)
        }
    }
}
