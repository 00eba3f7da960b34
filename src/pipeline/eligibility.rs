use log::debug;

use crate::error::{PipelineError, Result};
use crate::service::MetricsService;

/// Decides whether a file is ingested, delegating the rules to the service.
pub struct EligibilityFilter<'a> {
    service: &'a dyn MetricsService,
}

impl<'a> EligibilityFilter<'a> {
    pub fn new(service: &'a dyn MetricsService) -> Self {
        Self { service }
    }

    /// Returns `true` when the service does not exclude the file.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty path, before any request is made. Remote
    /// failures are returned as-is so the caller's retry wrapper can decide;
    /// there is no default verdict on error.
    pub async fn is_eligible(&self, path: &str, extension: &str, line_count: usize) -> Result<bool> {
        if path.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "file path must not be empty".to_string(),
            ));
        }

        let criteria = self
            .service
            .check_file_criteria(path, extension, line_count)
            .await?;

        if criteria.exclude {
            debug!(
                "Excluding {path}: {}",
                criteria.reason.as_deref().unwrap_or("rejected by criteria")
            );
        }

        Ok(!criteria.exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::FakeService;

    #[tokio::test]
    async fn test_inverts_exclusion() {
        let service = FakeService::new(&["keep.py", "drop.png"]).exclude("drop.png");
        let filter = EligibilityFilter::new(&service);

        assert!(filter.is_eligible("keep.py", "py", 80).await.unwrap());
        assert!(!filter.is_eligible("drop.png", "png", 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_path_is_rejected_locally() {
        let service = FakeService::new(&[]);
        let filter = EligibilityFilter::new(&service);

        let err = filter.is_eligible("", "", 0).await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(!err.is_transient());
        assert_eq!(service.calls_to("check_file_criteria"), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_propagates() {
        let service = FakeService::new(&["a.py"]).fail_times("check_file_criteria", "a.py", 1);
        let filter = EligibilityFilter::new(&service);

        let err = filter.is_eligible("a.py", "py", 10).await.unwrap_err();

        assert!(err.is_transient());
    }
}
