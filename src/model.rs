use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// A repository registered by a user for analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Owning user (email address)
    pub user_email: String,
    /// Repository owner or account name on the host
    pub owner: String,
    /// Repository name
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub favorite: bool,
}

impl Project {
    pub fn new(
        user_email: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            user_email: user_email.into(),
            owner: owner.into(),
            name: name.into(),
            created_at: Utc::now(),
            favorite: false,
        }
    }

    /// Builds a project from an `owner/repo` path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the path is not exactly two non-empty segments.
    pub fn from_path(path: &str, user_email: impl Into<String>) -> Result<Self> {
        let parts: Vec<&str> = path.split('/').collect();
        match parts.as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
                Ok(Self::new(user_email, *owner, *repo))
            }
            _ => Err(PipelineError::InvalidInput(
                "Project path must be in format 'owner/repo'".to_string(),
            )),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Opaque identifier of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One execution of the pipeline against a project.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: RunId,
    pub project: Project,
    pub started_at: DateTime<Utc>,
}

impl Run {
    pub fn start(project: Project) -> Self {
        Self {
            id: RunId::new(),
            project,
            started_at: Utc::now(),
        }
    }
}

/// Point-in-time copy of an eligible file, as persisted by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub file_id: Uuid,
    pub user_email: String,
    pub project_name: String,
    /// Run that captured this snapshot
    pub session_id: RunId,
    pub file_path: String,
    /// Size of the content in bytes
    pub file_size: usize,
    /// Number of lines in the content
    pub loc: usize,
    pub extension: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Request to score one snapshot against one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRequest {
    pub file_id: Uuid,
    pub session_id: RunId,
    pub file_path: String,
    pub content: String,
    pub metric_name: String,
}

impl MetricRequest {
    pub fn for_snapshot(snapshot: &FileSnapshot, metric_name: &str) -> Self {
        Self {
            file_id: snapshot.file_id,
            session_id: snapshot.session_id,
            file_path: snapshot.file_path.clone(),
            content: snapshot.content.clone(),
            metric_name: metric_name.to_string(),
        }
    }
}

/// Metric name to scoring definition, in the order the service lists them.
pub type MetricsConfig = IndexMap<String, serde_json::Value>;

/// Verdict of the service's file criteria check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCriteria {
    pub exclude: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A file whose processing failed after retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub index: usize,
    pub path: String,
    pub error: String,
}

/// Final outcome of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub project: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_files: usize,
    pub processed_files: usize,
    pub snapshots_written: usize,
    pub metrics_extracted: usize,
    pub skipped_files: Vec<String>,
    pub failures: Vec<FileFailure>,
    /// Error that ended the run, if it failed
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_from_path() {
        let project = Project::from_path("octo/widgets", "dev@example.com").unwrap();
        assert_eq!(project.owner, "octo");
        assert_eq!(project.name, "widgets");
        assert_eq!(project.user_email, "dev@example.com");
        assert_eq!(project.full_name(), "octo/widgets");
        assert!(!project.favorite);
    }

    #[test]
    fn test_project_from_invalid_path() {
        for path in ["invalid-path", "owner/repo/extra", "/repo", "owner/"] {
            let err = Project::from_path(path, "dev@example.com").unwrap_err();
            assert!(err.to_string().contains("owner/repo"), "{path}");
        }
    }

    #[test]
    fn test_run_ids_are_unique() {
        let project = Project::new("dev@example.com", "octo", "widgets");
        let first = Run::start(project.clone());
        let second = Run::start(project);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_snapshot_wire_format() {
        let run_id = RunId::new();
        let snapshot = FileSnapshot {
            file_id: Uuid::nil(),
            user_email: "dev@example.com".into(),
            project_name: "widgets".into(),
            session_id: run_id,
            file_path: "src/lib.py".into(),
            file_size: 12,
            loc: 2,
            extension: "py".into(),
            content: "import os\nx\n".into(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["file_id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["session_id"], run_id.to_string());
        assert_eq!(json["loc"], 2);

        let request = MetricRequest::for_snapshot(&snapshot, "code_efficiency");
        assert_eq!(request.file_id, snapshot.file_id);
        assert_eq!(request.metric_name, "code_efficiency");
    }
}
