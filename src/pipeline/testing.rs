//! In-memory `MetricsService` that records every call, for pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::model::{FileCriteria, FileSnapshot, MetricRequest, MetricsConfig};
use crate::service::MetricsService;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    MetricsConfig,
    Listing,
    Content(String),
    Criteria(String),
    InsertFile { path: String, file_id: Uuid },
    Extract { path: String, file_id: Uuid, metric: String },
}

struct Failure {
    remaining: u32,
    transient: bool,
}

pub(crate) struct FakeService {
    listing: Vec<String>,
    contents: HashMap<String, String>,
    excluded: HashSet<String>,
    metrics: MetricsConfig,
    latency: Option<Duration>,
    failures: Mutex<HashMap<(String, String), Failure>>,
    calls: Mutex<Vec<Call>>,
    snapshots: Mutex<Vec<FileSnapshot>>,
}

impl FakeService {
    pub fn new(listing: &[&str]) -> Self {
        Self {
            listing: listing.iter().map(ToString::to_string).collect(),
            contents: HashMap::new(),
            excluded: HashSet::new(),
            metrics: MetricsConfig::new(),
            latency: None,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    pub fn with_content(mut self, path: &str, content: &str) -> Self {
        self.contents.insert(path.to_string(), content.to_string());
        self
    }

    pub fn exclude(mut self, path: &str) -> Self {
        self.excluded.insert(path.to_string());
        self
    }

    pub fn with_metrics(mut self, names: &[&str]) -> Self {
        for name in names {
            self.metrics
                .insert((*name).to_string(), serde_json::Value::String(format!("{name} rubric")));
        }
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fails the next `times` calls of `operation` for `key` with a transient error.
    ///
    /// Keys: `""` for the metrics config and the listing, the file path for
    /// per-file calls, `path:metric` for metric extraction.
    pub fn fail_times(self, operation: &str, key: &str, times: u32) -> Self {
        self.failing(operation, key, times, true)
    }

    pub fn fail_always(self, operation: &str, key: &str) -> Self {
        self.failing(operation, key, u32::MAX, true)
    }

    /// Fails every call of `operation` for `key` with a client error.
    pub fn reject(self, operation: &str, key: &str) -> Self {
        self.failing(operation, key, u32::MAX, false)
    }

    fn failing(self, operation: &str, key: &str, times: u32, transient: bool) -> Self {
        self.failures.lock().unwrap().insert(
            (operation.to_string(), key.to_string()),
            Failure {
                remaining: times,
                transient,
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Snapshots whose write succeeded.
    pub fn snapshots(&self) -> Vec<FileSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| operation_of(call) == operation)
            .count()
    }

    async fn record(&self, call: Call, key: &str) -> Result<()> {
        let operation = operation_of(&call);
        self.calls.lock().unwrap().push(call);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut failures = self.failures.lock().unwrap();
        if let Some(failure) = failures.get_mut(&(operation.to_string(), key.to_string())) {
            if failure.remaining > 0 {
                failure.remaining -= 1;
                return Err(if failure.transient {
                    PipelineError::Unavailable(format!("{operation} {key}"))
                } else {
                    PipelineError::Api {
                        status: 400,
                        message: format!("{operation} {key} rejected"),
                    }
                });
            }
        }
        Ok(())
    }
}

fn operation_of(call: &Call) -> &'static str {
    match call {
        Call::MetricsConfig => "get_metrics_config",
        Call::Listing => "fetch_repo_structure",
        Call::Content(_) => "fetch_file_content",
        Call::Criteria(_) => "check_file_criteria",
        Call::InsertFile { .. } => "insert_file",
        Call::Extract { .. } => "extract_metric",
    }
}

#[async_trait]
impl MetricsService for FakeService {
    async fn get_metrics_config(&self) -> Result<MetricsConfig> {
        self.record(Call::MetricsConfig, "").await?;
        Ok(self.metrics.clone())
    }

    async fn fetch_repo_structure(&self, _owner: &str, _repo: &str) -> Result<Vec<String>> {
        self.record(Call::Listing, "").await?;
        Ok(self.listing.clone())
    }

    async fn fetch_file_content(&self, _owner: &str, _repo: &str, path: &str) -> Result<String> {
        self.record(Call::Content(path.to_string()), path).await?;
        Ok(self
            .contents
            .get(path)
            .cloned()
            .unwrap_or_else(|| format!("# {path}\nprint('hello')\n")))
    }

    async fn check_file_criteria(
        &self,
        path: &str,
        _extension: &str,
        _line_count: usize,
    ) -> Result<FileCriteria> {
        self.record(Call::Criteria(path.to_string()), path).await?;
        let exclude = self.excluded.contains(path);
        Ok(FileCriteria {
            exclude,
            reason: exclude.then(|| "excluded by test".to_string()),
        })
    }

    async fn insert_file(&self, snapshot: &FileSnapshot) -> Result<()> {
        let call = Call::InsertFile {
            path: snapshot.file_path.clone(),
            file_id: snapshot.file_id,
        };
        self.record(call, &snapshot.file_path).await?;
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn extract_metric(&self, request: &MetricRequest) -> Result<()> {
        let key = format!("{}:{}", request.file_path, request.metric_name);
        let call = Call::Extract {
            path: request.file_path.clone(),
            file_id: request.file_id,
            metric: request.metric_name.clone(),
        };
        self.record(call, &key).await
    }
}
