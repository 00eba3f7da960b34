use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::model::{FileFailure, Project, Run, RunId, RunReport, RunStatus};
use crate::service::MetricsService;

use super::eligibility::EligibilityFilter;
use super::extension::{classify_extension, count_lines};
use super::fanout::MetricFanout;
use super::progress::{FileOutcome, ProgressEvent, ProgressReporter, ProgressState, RunState};
use super::retry::{retry, RetryPolicy};
use super::snapshot::{CapturedFile, SnapshotWriter};

/// Knobs shared by every run an orchestrator starts.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub retry: RetryPolicy,
    /// Keep going after a file fails; when false the first failure ends the run
    pub continue_on_file_error: bool,
    /// Issue a file's metric extractions concurrently
    pub concurrent_metrics: bool,
    /// Metric names to use instead of fetching the service's configuration
    pub metrics: Option<Vec<String>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            continue_on_file_error: true,
            concurrent_metrics: false,
            metrics: None,
        }
    }
}

/// Starts ingestion runs against a metrics service.
///
/// Each run executes on its own task with its own progress channels and
/// cancellation token; runs share nothing but the service handle.
pub struct Orchestrator {
    service: Arc<dyn MetricsService>,
    options: RunOptions,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn MetricsService>, options: RunOptions) -> Self {
        Self {
            service,
            options,
            shutdown: CancellationToken::new(),
        }
    }

    #[allow(dead_code)]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Starts a run for `project` and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_run(&self, project: Project) -> RunHandle {
        let run = Run::start(project);
        let run_id = run.id;
        let (reporter, state, events) = ProgressReporter::channel(run_id);
        let cancel = self.shutdown.child_token();

        let execution = RunExecution {
            service: Arc::clone(&self.service),
            options: self.options.clone(),
            run,
            reporter,
            cancel: cancel.clone(),
            tally: Tally::default(),
        };
        let task = tokio::spawn(execution.execute());

        RunHandle {
            run_id,
            state,
            events: Some(events),
            cancel,
            task,
        }
    }

    /// Cancels every run started by this orchestrator.
    #[allow(dead_code)]
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Caller's view of a run in flight.
pub struct RunHandle {
    run_id: RunId,
    state: watch::Receiver<ProgressState>,
    events: Option<mpsc::UnboundedReceiver<ProgressEvent>>,
    cancel: CancellationToken,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Latest progress state.
    #[allow(dead_code)]
    pub fn progress(&self) -> ProgressState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every progress state change.
    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.state.clone()
    }

    /// Takes the event stream. Only the first call returns it.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ProgressEvent>> {
        self.events.take()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the run to reach a terminal state.
    ///
    /// # Errors
    ///
    /// Only if the run task itself panicked; run failures are reported in
    /// the returned `RunReport`.
    pub async fn wait(self) -> Result<RunReport> {
        Ok(self.task.await?)
    }
}

#[derive(Default)]
struct Tally {
    total: usize,
    processed: usize,
    snapshots: usize,
    metrics: usize,
    skipped: Vec<String>,
    failures: Vec<FileFailure>,
}

enum Disposition {
    Ingested { metrics: usize },
    Skipped,
}

struct RunExecution {
    service: Arc<dyn MetricsService>,
    options: RunOptions,
    run: Run,
    reporter: ProgressReporter,
    cancel: CancellationToken,
    tally: Tally,
}

impl RunExecution {
    async fn execute(mut self) -> RunReport {
        info!(
            "Starting run {} for project {}",
            self.run.id,
            self.run.project.full_name()
        );
        self.reporter.emit(ProgressEvent::Started { run_id: self.run.id });

        let outcome = self.drive().await;
        self.finish(outcome)
    }

    async fn drive(&mut self) -> Result<()> {
        self.reporter.update(|s| s.state = RunState::ListingFiles);

        let metrics = self.resolve_metrics().await?;

        let project = &self.run.project;
        let listing = retry(&self.options.retry, &self.cancel, "fetch file listing", || {
            self.service.fetch_repo_structure(&project.owner, &project.name)
        })
        .await?;

        info!(
            "Listed {} files in {} ({} metrics per file)",
            listing.len(),
            project.full_name(),
            metrics.len()
        );
        self.tally.total = listing.len();
        let total = listing.len();
        self.reporter.update(|s| s.total = total);
        self.reporter.emit(ProgressEvent::Listed { total });

        for (index, path) in listing.iter().enumerate() {
            self.reporter.update(|s| {
                s.state = RunState::ProcessingFile(index);
                s.current_path = Some(path.clone());
            });
            self.reporter.emit(ProgressEvent::FileStarted {
                index,
                path: path.clone(),
            });

            let outcome = match self.process_file(path, &metrics).await {
                Ok(Disposition::Ingested { metrics }) => {
                    self.tally.metrics += metrics;
                    FileOutcome::Ingested { metrics }
                }
                Ok(Disposition::Skipped) => {
                    debug!("Skipped {path}");
                    self.tally.skipped.push(path.clone());
                    FileOutcome::Skipped
                }
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    warn!("Failed to process {path}: {e}");
                    let message = e.to_string();
                    self.tally.failures.push(FileFailure {
                        index,
                        path: path.clone(),
                        error: message.clone(),
                    });
                    self.mark_processed(index, path, FileOutcome::Failed {
                        error: message.clone(),
                    });
                    self.reporter.update(|s| {
                        s.failed_files += 1;
                        s.last_file_error = Some(message);
                    });

                    if !self.options.continue_on_file_error {
                        return Err(e);
                    }
                    continue;
                }
            };

            self.mark_processed(index, path, outcome);
        }

        Ok(())
    }

    async fn resolve_metrics(&self) -> Result<Vec<String>> {
        if let Some(metrics) = &self.options.metrics {
            return Ok(metrics.clone());
        }

        let config = retry(&self.options.retry, &self.cancel, "fetch metrics config", || {
            self.service.get_metrics_config()
        })
        .await?;

        Ok(config.into_keys().collect())
    }

    async fn process_file(&mut self, path: &str, metrics: &[String]) -> Result<Disposition> {
        if path.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "file path must not be empty".to_string(),
            ));
        }

        let policy = &self.options.retry;
        let cancel = &self.cancel;
        let service = self.service.as_ref();
        let project = &self.run.project;

        let content = retry(policy, cancel, &format!("fetch content of {path}"), || {
            service.fetch_file_content(&project.owner, &project.name, path)
        })
        .await?;

        let extension = classify_extension(path);
        let line_count = count_lines(&content);

        let filter = EligibilityFilter::new(service);
        let eligible = retry(policy, cancel, &format!("check criteria for {path}"), || {
            filter.is_eligible(path, extension, line_count)
        })
        .await?;

        if !eligible {
            return Ok(Disposition::Skipped);
        }

        let file = CapturedFile {
            path,
            content: &content,
            line_count,
            extension,
        };
        let snapshot = SnapshotWriter::new(service, policy, cancel)
            .write(&self.run, &file)
            .await?;
        self.tally.snapshots += 1;

        let metrics = MetricFanout::new(service, policy, cancel, self.options.concurrent_metrics)
            .extract_all(&snapshot, metrics)
            .await?;

        Ok(Disposition::Ingested { metrics })
    }

    fn mark_processed(&mut self, index: usize, path: &str, outcome: FileOutcome) {
        self.tally.processed += 1;
        let processed = self.tally.processed;
        self.reporter.update(|s| s.processed = processed);
        self.reporter.emit(ProgressEvent::FileFinished {
            index,
            path: path.to_string(),
            outcome,
        });
    }

    fn finish(self, outcome: Result<()>) -> RunReport {
        let (status, error) = match outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(e) => {
                error!("Run {} failed: {e}", self.run.id);
                (RunStatus::Failed, Some(e.to_string()))
            }
        };

        let state = match status {
            RunStatus::Completed => RunState::Completed,
            RunStatus::Failed => RunState::Failed,
        };
        let terminal_error = error.clone();
        self.reporter.update(|s| {
            s.state = state;
            s.current_path = None;
            s.terminal_error = terminal_error;
        });
        self.reporter.emit(ProgressEvent::Finished {
            status,
            error: error.clone(),
        });

        let tally = self.tally;
        info!(
            "Run {} {status}: {}/{} files processed, {} snapshots, {} metrics, {} skipped, {} failed",
            self.run.id,
            tally.processed,
            tally.total,
            tally.snapshots,
            tally.metrics,
            tally.skipped.len(),
            tally.failures.len()
        );

        RunReport {
            run_id: self.run.id,
            project: self.run.project.full_name(),
            status,
            started_at: self.run.started_at,
            finished_at: Utc::now(),
            total_files: tally.total,
            processed_files: tally.processed,
            snapshots_written: tally.snapshots,
            metrics_extracted: tally.metrics,
            skipped_files: tally.skipped,
            failures: tally.failures,
            error,
        }
    }
}
