use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::model::{RunId, RunStatus};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "index")]
pub enum RunState {
    Idle,
    ListingFiles,
    ProcessingFile(usize),
    Completed,
    Failed,
}

impl RunState {
    #[allow(dead_code)]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// What happened to one listed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum FileOutcome {
    Ingested { metrics: usize },
    Skipped,
    Failed { error: String },
}

/// Events emitted by a run, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ProgressEvent {
    Started { run_id: RunId },
    Listed { total: usize },
    FileStarted { index: usize, path: String },
    FileFinished { index: usize, path: String, outcome: FileOutcome },
    Finished { status: RunStatus, error: Option<String> },
}

/// Latest known state of a run, for callers that poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressState {
    pub run_id: RunId,
    pub state: RunState,
    pub total: usize,
    pub processed: usize,
    pub current_path: Option<String>,
    pub failed_files: usize,
    pub last_file_error: Option<String>,
    pub terminal_error: Option<String>,
}

impl ProgressState {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            state: RunState::Idle,
            total: 0,
            processed: 0,
            current_path: None,
            failed_files: 0,
            last_file_error: None,
            terminal_error: None,
        }
    }
}

/// Sending side of a run's progress: state snapshot plus event stream.
///
/// Send failures are ignored; a caller that stopped listening does not stop
/// the run.
pub(crate) struct ProgressReporter {
    state: watch::Sender<ProgressState>,
    events: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn channel(
        run_id: RunId,
    ) -> (
        Self,
        watch::Receiver<ProgressState>,
        mpsc::UnboundedReceiver<ProgressEvent>,
    ) {
        let (state_tx, state_rx) = watch::channel(ProgressState::new(run_id));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: state_tx,
                events: events_tx,
            },
            state_rx,
            events_rx,
        )
    }

    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.events.send(event);
    }

    pub fn update(&self, change: impl FnOnce(&mut ProgressState)) {
        self.state.send_modify(change);
    }
}
