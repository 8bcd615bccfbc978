//! # Work Coordinator
//!
//! Drives a batch of [`FileTask`]s through a fixed pool of workers.
//!
//! ## Workflow
//!
//! 1. Spawn `worker_count` workers sharing one bounded queue
//! 2. Feed every task into the queue, then one `Shutdown` marker per worker
//! 3. Each worker runs the [`TaskPipeline`] per task, records failures in the
//!    shared ledger, bumps the progress counter, emits a progress event and
//!    sleeps for the configured delay before dequeuing again
//! 4. Join all workers
//! 5. Write the failure ledger (only if non-empty)
//! 6. Recompute the models root summary
//!
//! No task is retried and nothing stops a run once it has started. When the
//! ledger or the root summary cannot be written the error is logged and
//! carried in the [`RunReport`]; the in-memory ledger is always returned.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_organize::{enumerate_tasks, WorkCoordinator};
//!
//! let enumeration = enumerate_tasks(&config.source_dir, &config.archive_extensions).await?;
//! let report = coordinator.run(enumeration).await;
//! println!("{}/{} placed", report.succeeded, report.total);
//! ```

use crate::ledger::FailureLedger;
use crate::pipeline::{TaskOutcome, TaskPipeline};
use crate::summary::FolderSummary;
use crate::task::{Enumeration, FileTask};
use core_runtime::events::{percent_of, CoreEvent, EventBus, OrganizeEvent};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Queue entry. Each worker consumes exactly one `Shutdown`.
#[derive(Debug)]
enum QueueItem {
    Task(FileTask),
    Shutdown,
}

/// Completed tasks out of the fixed total. Reporting only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounter {
    pub completed: u64,
    pub total: u64,
}

#[derive(Debug, Default)]
struct Tally {
    succeeded: u64,
    failed: u64,
    collisions: u64,
}

/// State shared by all workers of one run. Locks are held for the update
/// only.
struct SharedState {
    run_id: String,
    ledger: Mutex<FailureLedger>,
    progress: Mutex<ProgressCounter>,
    tally: Mutex<Tally>,
}

/// Result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    /// Archives found, including those with malformed names.
    pub total: u64,
    /// Archives that reached a final outcome.
    pub processed: u64,
    pub succeeded: u64,
    /// Ledger entries from this run; includes `collisions` and malformed names.
    pub failed: u64,
    pub collisions: u64,
    #[serde(skip)]
    pub ledger: FailureLedger,
    /// Root summary; `None` when it could not be written.
    pub summary: Option<FolderSummary>,
    /// Where the ledger was written, when it was.
    pub ledger_path: Option<PathBuf>,
    pub ledger_error: Option<String>,
    pub summary_error: Option<String>,
    pub duration: Duration,
}

impl RunReport {
    /// Both end-of-run writes succeeded (or had nothing to write).
    pub fn is_flushed(&self) -> bool {
        self.ledger_error.is_none() && self.summary_error.is_none()
    }
}

/// Fixed-size worker pool over a [`TaskPipeline`].
pub struct WorkCoordinator {
    pipeline: Arc<TaskPipeline>,
    event_bus: EventBus,
    models_root: PathBuf,
    ledger_path: PathBuf,
    worker_count: usize,
    task_delay: Duration,
}

impl WorkCoordinator {
    /// Create a coordinator.
    ///
    /// # Arguments
    ///
    /// * `pipeline` - Per-task steps
    /// * `event_bus` - Receives progress events
    /// * `models_root` - Root of the organized tree (summarized after the run)
    /// * `ledger_path` - Where the failure ledger goes
    /// * `worker_count` - Parallel workers (at least one)
    /// * `task_delay` - Pause after every task, per worker
    pub fn new(
        pipeline: Arc<TaskPipeline>,
        event_bus: EventBus,
        models_root: impl Into<PathBuf>,
        ledger_path: impl Into<PathBuf>,
        worker_count: usize,
        task_delay: Duration,
    ) -> Self {
        Self {
            pipeline,
            event_bus,
            models_root: models_root.into(),
            ledger_path: ledger_path.into(),
            worker_count: worker_count.max(1),
            task_delay,
        }
    }

    /// Process every task of `enumeration` and flush the results.
    ///
    /// Malformed names from the enumeration go straight to the ledger.
    #[instrument(skip(self, enumeration), fields(tasks = enumeration.tasks.len()))]
    pub async fn run(&self, enumeration: Enumeration) -> RunReport {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let Enumeration { tasks, rejected } = enumeration;
        let task_total = tasks.len() as u64;
        let rejected_total = rejected.len() as u64;

        let mut initial_ledger = FailureLedger::new();
        for failure in &rejected {
            initial_ledger.record(failure.file_name.clone(), failure.to_string());
        }

        let state = Arc::new(SharedState {
            run_id: run_id.clone(),
            ledger: Mutex::new(initial_ledger),
            progress: Mutex::new(ProgressCounter {
                completed: 0,
                total: task_total,
            }),
            tally: Mutex::new(Tally {
                failed: rejected_total,
                ..Tally::default()
            }),
        });

        info!(run_id = %run_id, tasks = task_total, rejected = rejected_total, workers = self.worker_count, "Starting run");
        self.event_bus
            .emit(CoreEvent::Organize(OrganizeEvent::RunStarted {
                run_id: run_id.clone(),
                total: task_total,
            }))
            .ok();
        for failure in &rejected {
            self.event_bus
                .emit(CoreEvent::Organize(OrganizeEvent::TaskFailed {
                    run_id: run_id.clone(),
                    file_name: failure.file_name.clone(),
                    reason: failure.to_string(),
                }))
                .ok();
        }

        let (sender, receiver) = mpsc::channel::<QueueItem>(self.worker_count * 2);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = JoinSet::new();
        for worker_id in 0..self.worker_count {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&receiver),
                Arc::clone(&self.pipeline),
                Arc::clone(&state),
                self.event_bus.clone(),
                self.task_delay,
            ));
        }

        let shutdowns = std::iter::repeat_with(|| QueueItem::Shutdown).take(self.worker_count);
        for item in tasks.into_iter().map(QueueItem::Task).chain(shutdowns) {
            if sender.send(item).await.is_err() {
                error!(run_id = %run_id, "All workers exited early");
                break;
            }
        }
        drop(sender);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(run_id = %run_id, error = %e, "Worker terminated abnormally");
            }
        }

        let ledger = state.ledger.lock().await.clone();
        let progress = *state.progress.lock().await;
        let tally = std::mem::take(&mut *state.tally.lock().await);

        let (ledger_path, ledger_error) = match ledger.persist(&self.ledger_path).await {
            Ok(written) => (written.then(|| self.ledger_path.clone()), None),
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Failure ledger not written");
                (None, Some(e.to_string()))
            }
        };

        let (summary, summary_error) = match self.pipeline.summaries().recompute(&self.models_root).await {
            Ok(summary) => (Some(summary), None),
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Root summary not written");
                (None, Some(e.to_string()))
            }
        };
        let duration = started.elapsed();

        let report = RunReport {
            run_id: run_id.clone(),
            total: task_total + rejected_total,
            processed: progress.completed + rejected_total,
            succeeded: tally.succeeded,
            failed: tally.failed,
            collisions: tally.collisions,
            ledger,
            summary,
            ledger_path,
            ledger_error,
            summary_error,
            duration,
        };

        self.event_bus
            .emit(CoreEvent::Organize(OrganizeEvent::RunCompleted {
                run_id: run_id.clone(),
                processed: report.processed,
                failed: report.failed,
                duration_ms: duration.as_millis() as u64,
            }))
            .ok();

        info!(
            run_id = %run_id,
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            collisions = report.collisions,
            duration_ms = duration.as_millis() as u64,
            "Run complete"
        );

        if progress.completed != task_total {
            error!(
                run_id = %run_id,
                completed = progress.completed,
                total = task_total,
                "Not every task reached an outcome"
            );
        }

        report
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<QueueItem>>>,
    pipeline: Arc<TaskPipeline>,
    state: Arc<SharedState>,
    event_bus: EventBus,
    task_delay: Duration,
) {
    debug!(worker_id, "Worker started");

    loop {
        let item = queue.lock().await.recv().await;
        let task = match item {
            Some(QueueItem::Task(task)) => task,
            Some(QueueItem::Shutdown) | None => break,
        };

        let file_name = task.file_name();
        event_bus
            .emit(CoreEvent::Organize(OrganizeEvent::TaskStarted {
                run_id: state.run_id.clone(),
                file_name: file_name.clone(),
            }))
            .ok();

        let outcome = pipeline.process(&task).await;
        record_outcome(&state, &event_bus, &file_name, outcome).await;

        let progress = {
            let mut progress = state.progress.lock().await;
            progress.completed += 1;
            *progress
        };
        event_bus
            .emit(CoreEvent::Organize(OrganizeEvent::Progress {
                run_id: state.run_id.clone(),
                completed: progress.completed,
                total: progress.total,
                percent: percent_of(progress.completed, progress.total),
                label: file_name,
            }))
            .ok();

        tokio::time::sleep(task_delay).await;
    }

    debug!(worker_id, "Worker stopped");
}

async fn record_outcome(state: &SharedState, event_bus: &EventBus, file_name: &str, outcome: TaskOutcome) {
    match outcome {
        TaskOutcome::Placed { .. } => {
            state.tally.lock().await.succeeded += 1;
        }
        TaskOutcome::Failed {
            key,
            reason,
            collision,
        } => {
            warn!(file = %file_name, %reason, "Task failed");
            {
                let mut ledger = state.ledger.lock().await;
                // Archives sharing a file id (`1.a.zip`, `1.a.rar`) keep separate entries.
                let key = if ledger.contains(&key) { file_name.to_string() } else { key };
                ledger.record(key, reason.clone());
            }
            {
                let mut tally = state.tally.lock().await;
                tally.failed += 1;
                if collision {
                    tally.collisions += 1;
                }
            }
            event_bus
                .emit(CoreEvent::Organize(OrganizeEvent::TaskFailed {
                    run_id: state.run_id.clone(),
                    file_name: file_name.to_string(),
                    reason,
                }))
                .ok();
        }
    }
}
