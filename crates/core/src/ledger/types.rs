//! Migration ledger record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a course migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Queued,
    Downloading,
    Completed,
    Error,
    Cancelled,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Queued => "queued",
            MigrationStatus::Downloading => "downloading",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Error => "error",
            MigrationStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are not mutated again by the job that reached them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Completed | MigrationStatus::Error | MigrationStatus::Cancelled
        )
    }

    /// Statuses a migration can be cancelled from.
    pub fn active() -> &'static [MigrationStatus] {
        &[MigrationStatus::Queued, MigrationStatus::Downloading]
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(MigrationStatus::Queued),
            "downloading" => Ok(MigrationStatus::Downloading),
            "completed" => Ok(MigrationStatus::Completed),
            "error" => Ok(MigrationStatus::Error),
            "cancelled" => Ok(MigrationStatus::Cancelled),
            other => Err(format!("unknown migration status: {}", other)),
        }
    }
}

/// Per-lesson availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    #[default]
    Idle,
    Processing,
    Completed,
    Error,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::Idle => "idle",
            LessonStatus::Processing => "processing",
            LessonStatus::Completed => "completed",
            LessonStatus::Error => "error",
        }
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LessonStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(LessonStatus::Idle),
            "processing" => Ok(LessonStatus::Processing),
            "completed" => Ok(LessonStatus::Completed),
            "error" => Ok(LessonStatus::Error),
            other => Err(format!("unknown lesson status: {}", other)),
        }
    }
}

/// One course migration, unique per `(workspace_id, course_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub workspace_id: String,
    pub course_id: String,
    pub course_name: String,
    pub status: MigrationStatus,
    pub progress: u8,
    pub local_path: String,
    pub remote_url: Option<String>,
    pub error: Option<String>,
    /// Queue job that owns the current lifecycle of the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Complete field set written by an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationUpdate {
    pub course_name: String,
    pub status: MigrationStatus,
    pub progress: u8,
    pub local_path: String,
    pub remote_url: Option<String>,
    pub error: Option<String>,
    pub job_id: Option<String>,
}

impl MigrationUpdate {
    /// A freshly requested migration: `downloading` at 0%.
    pub fn started(course_name: impl Into<String>, local_path: impl Into<String>) -> Self {
        Self {
            course_name: course_name.into(),
            status: MigrationStatus::Downloading,
            progress: 0,
            local_path: local_path.into(),
            remote_url: None,
            error: None,
            job_id: None,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

/// Terminal transition written by the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub status: MigrationStatus,
    pub progress: Option<u8>,
    pub remote_url: Option<String>,
    pub error: Option<String>,
}

impl MigrationOutcome {
    pub fn completed(remote_url: impl Into<String>) -> Self {
        Self {
            status: MigrationStatus::Completed,
            progress: Some(100),
            remote_url: Some(remote_url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: MigrationStatus::Error,
            progress: None,
            remote_url: None,
            error: Some(error.into()),
        }
    }
}

/// Lesson availability as read by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonState {
    pub processing_status: LessonStatus,
    pub stream_url: Option<String>,
}

/// One lesson row, unique per `(workspace_id, course_id, lesson_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonMigrationRecord {
    pub workspace_id: String,
    pub course_id: String,
    pub lesson_id: String,
    pub processing_status: LessonStatus,
    pub stream_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!MigrationStatus::Queued.is_terminal());
        assert!(!MigrationStatus::Downloading.is_terminal());
        assert!(MigrationStatus::Completed.is_terminal());
        assert!(MigrationStatus::Error.is_terminal());
        assert!(MigrationStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_parse() {
        for status in [
            MigrationStatus::Queued,
            MigrationStatus::Downloading,
            MigrationStatus::Completed,
            MigrationStatus::Error,
            MigrationStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<MigrationStatus>(), Ok(status));
        }
        assert!("paused".parse::<MigrationStatus>().is_err());
        assert_eq!("processing".parse::<LessonStatus>(), Ok(LessonStatus::Processing));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = MigrationRecord {
            workspace_id: "ws".to_string(),
            course_id: "c".to_string(),
            course_name: "Course".to_string(),
            status: MigrationStatus::Downloading,
            progress: 42,
            local_path: "/content/workspaces/ws/c".to_string(),
            remote_url: None,
            error: None,
            job_id: None,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["workspaceId"], "ws");
        assert_eq!(json["status"], "downloading");
        assert_eq!(json["progress"], 42);
        assert!(json.get("jobId").is_none());
    }
}
