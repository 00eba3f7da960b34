//! Seam between the orchestrator and the remote metrics service.

mod client;
mod types;


use async_trait::async_trait;

use crate::error::Result;
use crate::model::{FileCriteria, FileSnapshot, MetricRequest, MetricsConfig};

pub use client::ApiClient;

/// Remote operations the pipeline sequences.
///
/// Implementations own retrieval, eligibility rules, persistence and scoring.
/// None of these methods retry on their own; the pipeline wraps every call
/// in its retry policy.
#[async_trait]
pub trait MetricsService: Send + Sync {
    /// Metric names mapped to their scoring definitions.
    async fn get_metrics_config(&self) -> Result<MetricsConfig>;

    /// Ordered file paths of the repository.
    async fn fetch_repo_structure(&self, owner: &str, repo: &str) -> Result<Vec<String>>;

    /// Raw text content of one file.
    async fn fetch_file_content(&self, owner: &str, repo: &str, path: &str) -> Result<String>;

    /// Whether a file should be left out of the analysis.
    async fn check_file_criteria(
        &self,
        path: &str,
        extension: &str,
        line_count: usize,
    ) -> Result<FileCriteria>;

    /// Persists a file snapshot.
    async fn insert_file(&self, snapshot: &FileSnapshot) -> Result<()>;

    /// Scores a snapshot against one metric; the score is stored server-side.
    async fn extract_metric(&self, request: &MetricRequest) -> Result<()>;
}
