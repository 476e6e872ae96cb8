//! Bounded-concurrency task executor with rate-limit backoff.
//!
//! The executor is a state machine driven by its owner through [`Executor::next`].
//! All transitions happen on that one `&mut self` call path, so concurrent
//! rate-limit signals can never start independent pause/resume cycles:
//!
//! ```text
//!            submit                  RateLimited
//!   Idle ─────────────▶ Running ─────────────────▶ Draining { resume_at }
//!    ▲                   │  ▲                          │
//!    │  nothing pending, │  └──── in_flight == 0 ──────┘
//!    └── nothing running ┘        and now >= resume_at
//!
//!   any state ── Fatal ──▶ Aborting ── in_flight == 0 ──▶ (next() == None)
//! ```
//!
//! While draining, in-flight tasks are never cancelled; they finish and
//! report normally. A rate-limited task goes back into the pending queue in
//! submission order, ahead of everything submitted after it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{PipelineError, TaskOutcome};

/// Default number of tasks in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Default wait when a rate-limit signal carries no retry-after value.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Added to every backoff so we do not re-trigger right at the boundary.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(1);

/// A unit of work the executor can run, possibly more than once.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Run one attempt.
    async fn run(&self) -> TaskOutcome<Self::Output>;
}

/// Executor tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub max_concurrency: usize,
    pub default_retry_after: Duration,
    pub safety_margin: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            default_retry_after: DEFAULT_RETRY_AFTER,
            safety_margin: SAFETY_MARGIN,
        }
    }
}

/// Where the executor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// Nothing pending, nothing in flight.
    Idle,
    /// Admitting tasks up to the concurrency bound.
    Running,
    /// Rate limited: admitting nothing until in-flight work is done and
    /// `resume_at` has passed.
    Draining { resume_at: Instant },
    /// A task failed fatally: pending work is discarded, in-flight work
    /// finishes, nothing new is admitted.
    Aborting,
}

/// How a task finally resolved.
#[derive(Debug)]
pub enum Resolution<T> {
    Success(T),
    Skipped(String),
    Fatal(PipelineError),
}

/// A task that reached a terminal outcome.
pub struct Completion<K: Task> {
    pub task: Arc<K>,
    /// Number of times the task ran, including rate-limited attempts.
    pub attempts: u32,
    pub resolution: Resolution<K::Output>,
}

struct Queued<K> {
    seq: u64,
    attempts: u32,
    task: Arc<K>,
}

/// Runs [`Task`]s with bounded concurrency, pausing on rate limits.
pub struct Executor<K: Task> {
    config: ExecutorConfig,
    state: ExecutorState,
    pending: VecDeque<Queued<K>>,
    in_flight: JoinSet<TaskOutcome<K::Output>>,
    running: HashMap<Id, Queued<K>>,
    next_seq: u64,
    rate_limit_events: usize,
    dropped: usize,
}

impl<K: Task> Executor<K> {
    /// Create an idle executor.
    pub fn new(config: ExecutorConfig) -> Self {
        let config = ExecutorConfig {
            max_concurrency: config.max_concurrency.max(1),
            ..config
        };

        Self {
            config,
            state: ExecutorState::Idle,
            pending: VecDeque::new(),
            in_flight: JoinSet::new(),
            running: HashMap::new(),
            next_seq: 0,
            rate_limit_events: 0,
            dropped: 0,
        }
    }

    /// Queue a task. Never blocks and never drops the task, except that a
    /// task submitted after a fatal error is discarded with the rest of the
    /// pending work.
    pub fn submit(&mut self, task: K) {
        if self.state == ExecutorState::Aborting {
            warn!("executor is aborting, discarding submitted task");
            self.dropped += 1;
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push_back(Queued {
            seq,
            attempts: 0,
            task: Arc::new(task),
        });

        if self.state == ExecutorState::Idle {
            self.state = ExecutorState::Running;
        }
    }

    /// Drive the executor until one task resolves.
    ///
    /// Returns `None` once nothing is pending and nothing is in flight (or,
    /// after a fatal error, once in-flight work has drained).
    pub async fn next(&mut self) -> Option<Completion<K>> {
        loop {
            self.admit();

            if self.in_flight.is_empty() {
                match self.state {
                    ExecutorState::Draining { resume_at } => {
                        let now = Instant::now();
                        if resume_at > now {
                            debug!(
                                wait = ?(resume_at - now),
                                "in-flight work drained, waiting out rate limit"
                            );
                            tokio::time::sleep_until(resume_at).await;
                        }
                        info!(pending = self.pending.len(), "rate limit window elapsed, resuming");
                        self.state = ExecutorState::Running;
                        continue;
                    }
                    ExecutorState::Aborting => return None,
                    ExecutorState::Running | ExecutorState::Idle => {
                        // admit() leaves work pending only when not running
                        self.state = ExecutorState::Idle;
                        return None;
                    }
                }
            }

            let (id, outcome) = match self.in_flight.join_next_with_id().await? {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => (
                    e.id(),
                    TaskOutcome::Fatal(PipelineError::TaskPanicked(e.to_string())),
                ),
            };

            let Some(queued) = self.running.remove(&id) else {
                warn!(task_id = %id, "completion for unknown task");
                continue;
            };

            let resolution = match outcome {
                TaskOutcome::RateLimited { retry_after } => {
                    self.on_rate_limited(queued, retry_after);
                    continue;
                }
                TaskOutcome::Success(output) => Resolution::Success(output),
                TaskOutcome::SkippedExpected(reason) => Resolution::Skipped(reason),
                TaskOutcome::Fatal(error) => {
                    self.abort();
                    Resolution::Fatal(error)
                }
            };

            return Some(Completion {
                task: queued.task,
                attempts: queued.attempts,
                resolution,
            });
        }
    }

    /// Run everything to completion and return the resolutions.
    pub async fn await_idle(&mut self) -> Vec<Completion<K>> {
        let mut completions = Vec::new();
        while let Some(completion) = self.next().await {
            completions.push(completion);
        }
        completions
    }

    /// Stop admitting work and discard everything pending.
    pub fn abort(&mut self) {
        if self.state == ExecutorState::Aborting {
            return;
        }
        let discarded = self.pending.len();
        self.pending.clear();
        self.dropped += discarded;
        self.state = ExecutorState::Aborting;
        warn!(
            discarded,
            in_flight = self.in_flight.len(),
            "aborting, waiting for in-flight tasks"
        );
    }

    /// Whether the owner should stop feeding new work: queued plus running
    /// tasks already fill the concurrency bound.
    pub fn is_saturated(&self) -> bool {
        self.pending.len() + self.in_flight.len() >= self.config.max_concurrency
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// How many rate-limit signals have been received.
    pub fn rate_limit_events(&self) -> usize {
        self.rate_limit_events
    }

    /// Tasks discarded because of an abort.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn admit(&mut self) {
        if self.state != ExecutorState::Running {
            return;
        }

        while self.in_flight.len() < self.config.max_concurrency {
            let Some(mut queued) = self.pending.pop_front() else {
                break;
            };
            queued.attempts += 1;

            let task = Arc::clone(&queued.task);
            let handle = self.in_flight.spawn(async move { task.run().await });
            self.running.insert(handle.id(), queued);
        }
    }

    fn on_rate_limited(&mut self, queued: Queued<K>, retry_after: Option<Duration>) {
        self.rate_limit_events += 1;

        if self.state == ExecutorState::Aborting {
            warn!(seq = queued.seq, "rate limited while aborting, task not retried");
            self.dropped += 1;
            return;
        }

        let wait = retry_after.unwrap_or(self.config.default_retry_after) + self.config.safety_margin;
        let deadline = Instant::now() + wait;

        self.state = match self.state {
            ExecutorState::Draining { resume_at } => {
                debug!(seq = queued.seq, "rate limited while draining");
                ExecutorState::Draining {
                    resume_at: resume_at.max(deadline),
                }
            }
            _ => {
                warn!(
                    wait_secs = wait.as_secs(),
                    in_flight = self.in_flight.len(),
                    "rate limit exceeded, pausing"
                );
                ExecutorState::Draining {
                    resume_at: deadline,
                }
            }
        };

        let index = self.pending.partition_point(|p| p.seq < queued.seq);
        self.pending.insert(index, queued);
    }
}
