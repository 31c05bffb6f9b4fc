use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an ingestion job.
///
/// Transitions are monotonic: `uploaded → processing → processed | failed`.
/// Nothing leaves `processed` or `failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Processed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Processed => "processed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Processed | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Uploaded, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Processed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(JobStatus::Uploaded),
            "processing" => Ok(JobStatus::Processing),
            "processed" => Ok(JobStatus::Processed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Terminal failure recorded on a job: a stable kind label plus the
/// message/details pair shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: String,
    pub message: String,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    /// Name of the uploaded file as the user sent it.
    pub file_name: String,
    /// Object store key of the uploaded PDF.
    pub storage_path: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    /// The failed job this one retries, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a new job in status `uploaded`.
    pub fn new(
        user_id: impl Into<String>,
        file_name: impl Into<String>,
        storage_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            file_name: file_name.into(),
            storage_path: storage_path.into(),
            status: JobStatus::Uploaded,
            failure: None,
            retry_of: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Creates a fresh `uploaded` job for the same stored PDF as `failed`.
    pub fn retry_of(failed: &Job) -> Self {
        let mut job = Self::new(&failed.user_id, &failed.file_name, &failed.storage_path);
        job.retry_of = Some(failed.id.clone());
        job
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_set_id: Option<String>,
    pub question_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
}

impl JobResult {
    pub fn success(job: &Job, question_set_id: String, question_count: usize) -> Self {
        Self {
            job_id: job.id.clone(),
            status: JobStatus::Processed,
            question_set_id: Some(question_set_id),
            question_count,
            failure: None,
        }
    }

    pub fn failure(job: &Job, failure: JobFailure) -> Self {
        Self {
            job_id: job.id.clone(),
            status: JobStatus::Failed,
            question_set_id: None,
            question_count: 0,
            failure: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Processed
    }
}
