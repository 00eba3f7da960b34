//! Ingestion pipeline: listing, eligibility, snapshots and metric fan-out.

mod eligibility;
mod extension;
mod fanout;
mod orchestrator;
mod progress;
mod retry;
mod snapshot;

#[cfg(test)]
mod testing;

pub use orchestrator::{Orchestrator, RunOptions};
pub use progress::{FileOutcome, ProgressEvent};
pub use retry::RetryPolicy;
