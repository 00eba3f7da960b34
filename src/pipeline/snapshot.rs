use chrono::Utc;
use log::debug;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{FileSnapshot, Run};
use crate::service::MetricsService;

use super::retry::{retry, RetryPolicy};

/// Content and derived attributes of one eligible file.
pub struct CapturedFile<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub line_count: usize,
    pub extension: &'a str,
}

/// Persists file snapshots for a run.
pub struct SnapshotWriter<'a> {
    service: &'a dyn MetricsService,
    policy: &'a RetryPolicy,
    cancel: &'a CancellationToken,
}

impl<'a> SnapshotWriter<'a> {
    pub fn new(
        service: &'a dyn MetricsService,
        policy: &'a RetryPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            service,
            policy,
            cancel,
        }
    }

    /// Writes one snapshot with a freshly generated identifier.
    ///
    /// Retries of this call resend the same snapshot, so the identifier is
    /// stable across attempts but never shared between calls.
    pub async fn write(&self, run: &Run, file: &CapturedFile<'_>) -> Result<FileSnapshot> {
        let snapshot = FileSnapshot {
            file_id: Uuid::new_v4(),
            user_email: run.project.user_email.clone(),
            project_name: run.project.name.clone(),
            session_id: run.id,
            file_path: file.path.to_string(),
            file_size: file.content.len(),
            loc: file.line_count,
            extension: file.extension.to_string(),
            content: file.content.to_string(),
            timestamp: Utc::now(),
        };

        let operation = format!("write snapshot of {}", file.path);
        retry(self.policy, self.cancel, &operation, || {
            self.service.insert_file(&snapshot)
        })
        .await?;

        debug!("Wrote snapshot {} for {}", snapshot.file_id, file.path);
        Ok(snapshot)
    }
}
