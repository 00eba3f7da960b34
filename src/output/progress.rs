use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::model::RunStatus;
use crate::pipeline::{FileOutcome, ProgressEvent};

use super::styling::{bright, bright_green, bright_red, bright_yellow, dim};

/// Terminal progress for one run, driven by its event stream.
///
/// Starts as a spinner while the listing is fetched and turns into a bar
/// once the number of files is known.
pub struct RunProgress {
    pb: ProgressBar,
}

impl RunProgress {
    pub fn new() -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Ingestion").underlined());
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        Self::with_bar(pb)
    }

    #[cfg(test)]
    fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(pb: ProgressBar) -> Self {
        if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
            pb.set_style(style);
        }
        pb.set_message(bright_yellow("Fetching file listing").to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn handle(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { .. } => {}
            ProgressEvent::Listed { total } => {
                self.pb.set_length(*total as u64);
                self.pb.set_position(0);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("  {spinner} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                {
                    self.pb.set_style(style.progress_chars("=> "));
                }
            }
            ProgressEvent::FileStarted { path, .. } => {
                self.pb.set_message(dim(path).to_string());
            }
            ProgressEvent::FileFinished { path, outcome, .. } => {
                if let FileOutcome::Failed { error } = outcome {
                    self.pb
                        .println(format!("  {} {path}: {}", bright_red("✗"), dim(error)));
                }
                self.pb.inc(1);
            }
            ProgressEvent::Finished { status, .. } => {
                let message = match status {
                    RunStatus::Completed => bright_green("Run completed ✓").to_string(),
                    RunStatus::Failed => bright_red("Run failed ✗").to_string(),
                };
                self.pb.finish_with_message(message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunId;

    #[test]
    fn test_bar_follows_events() {
        let progress = RunProgress::hidden();
        progress.handle(&ProgressEvent::Started { run_id: RunId::new() });
        progress.handle(&ProgressEvent::Listed { total: 2 });
        assert_eq!(progress.pb.length(), Some(2));

        progress.handle(&ProgressEvent::FileStarted {
            index: 0,
            path: "a.py".into(),
        });
        progress.handle(&ProgressEvent::FileFinished {
            index: 0,
            path: "a.py".into(),
            outcome: FileOutcome::Ingested { metrics: 2 },
        });
        progress.handle(&ProgressEvent::FileFinished {
            index: 1,
            path: "b.md".into(),
            outcome: FileOutcome::Failed {
                error: "boom".into(),
            },
        });
        assert_eq!(progress.pb.position(), 2);

        progress.handle(&ProgressEvent::Finished {
            status: RunStatus::Completed,
            error: None,
        });
        assert!(progress.pb.is_finished());
    }
}
