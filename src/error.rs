use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("{} metric extraction(s) failed: {}", .failures.len(), describe_failures(.failures))]
    MetricExtraction { failures: Vec<MetricFailure> },

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Run task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// A single metric that could not be extracted for a snapshot.
#[derive(Debug)]
pub struct MetricFailure {
    pub metric: String,
    pub error: PipelineError,
}

fn describe_failures(failures: &[MetricFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.metric, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

impl PipelineError {
    /// Whether a fresh attempt of the same call could succeed.
    ///
    /// Request timeouts, rate limiting, server errors and network failures
    /// (including a connection dropped while reading the body) are transient.
    /// Other client errors, validation failures and decoding errors are not,
    /// and neither is an already escalated error.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => matches!(*status, 408 | 429) || *status >= 500,
            Self::Network(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
            }
            Self::Unavailable(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
