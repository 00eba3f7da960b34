use futures::future::join_all;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::error::{MetricFailure, PipelineError, Result};
use crate::model::{FileSnapshot, MetricRequest};
use crate::service::MetricsService;

use super::retry::{retry, RetryPolicy};

/// Issues one metric extraction per configured metric for a snapshot.
pub struct MetricFanout<'a> {
    service: &'a dyn MetricsService,
    policy: &'a RetryPolicy,
    cancel: &'a CancellationToken,
    concurrent: bool,
}

impl<'a> MetricFanout<'a> {
    pub fn new(
        service: &'a dyn MetricsService,
        policy: &'a RetryPolicy,
        cancel: &'a CancellationToken,
        concurrent: bool,
    ) -> Self {
        Self {
            service,
            policy,
            cancel,
            concurrent,
        }
    }

    /// Requests every metric in `metric_names` for `snapshot`.
    ///
    /// All requests are attempted even when some fail. Returns the number of
    /// metrics extracted, or a `MetricExtraction` error listing every failure.
    pub async fn extract_all(&self, snapshot: &FileSnapshot, metric_names: &[String]) -> Result<usize> {
        let requests: Vec<MetricRequest> = metric_names
            .iter()
            .map(|name| MetricRequest::for_snapshot(snapshot, name))
            .collect();

        let outcomes = if self.concurrent {
            join_all(requests.iter().map(|request| self.extract_one(request))).await
        } else {
            let mut outcomes = Vec::with_capacity(requests.len());
            for request in &requests {
                outcomes.push(self.extract_one(request).await);
            }
            outcomes
        };

        let mut failures = Vec::new();
        for (request, outcome) in requests.iter().zip(outcomes) {
            if let Err(error) = outcome {
                // A cancelled run is not a metric failure
                if matches!(error, PipelineError::Cancelled) {
                    return Err(error);
                }
                failures.push(MetricFailure {
                    metric: request.metric_name.clone(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            debug!(
                "Extracted {} metrics for {}",
                requests.len(),
                snapshot.file_path
            );
            Ok(requests.len())
        } else {
            Err(PipelineError::MetricExtraction { failures })
        }
    }

    async fn extract_one(&self, request: &MetricRequest) -> Result<()> {
        let operation = format!(
            "extract {} for {}",
            request.metric_name, request.file_path
        );
        retry(self.policy, self.cancel, &operation, || {
            self.service.extract_metric(request)
        })
        .await
    }
}
