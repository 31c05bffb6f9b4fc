use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{job_repo, Database, DatabaseError};
use crate::error::StorageError;
use crate::pipeline::progress::{NoopProgress, ProgressReporter};
use crate::pipeline::Pipeline;
use crate::sanitize;
use crate::storage::ObjectStore;
use crate::worker::job::{Job, JobResult, JobStatus};

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {job_id} is '{status}' and cannot be processed")]
    Conflict { job_id: String, status: JobStatus },

    #[error("Job {job_id} was already retried as {retry_id}")]
    AlreadyRetried { job_id: String, retry_id: String },

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Entry points that start pipeline runs.
///
/// Every path ends in `Pipeline::run`, so all of them share the same
/// compare-and-set claim. At most `max_concurrent_jobs` runs execute at once.
pub struct JobTrigger {
    pipeline: Arc<Pipeline>,
    permits: Arc<Semaphore>,
    max_file_size: u64,
    progress: Arc<dyn ProgressReporter>,
}

impl JobTrigger {
    pub fn new(pipeline: Arc<Pipeline>, max_concurrent_jobs: usize, max_file_size: u64) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            max_file_size,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Builds the production trigger: process executors, limits from config.
    pub fn from_config(config: &Config, db: Database, store: Arc<dyn ObjectStore>) -> Self {
        let pipeline = Arc::new(Pipeline::from_config(config, db, store));
        Self::new(
            pipeline,
            config.max_concurrent_jobs,
            config.upload.max_file_size,
        )
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Validates and stores an uploaded PDF and records it as an `uploaded` job.
    pub async fn upload(
        &self,
        user_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Job, TriggerError> {
        validate_user_id(user_id)?;
        let file_name = upload_file_name(file_name)?;
        self.validate_bytes(bytes)?;

        let key = format!(
            "{}/{}_{}",
            user_id,
            Utc::now().timestamp_millis(),
            file_name
        );
        self.pipeline.store().store(&key, bytes).await?;

        let job = Job::new(user_id, file_name, &key);
        let record = job.clone();
        let inserted = self
            .pipeline
            .database()
            .blocking(move |db| job_repo::insert(db, &record))
            .await;
        if let Err(e) = inserted {
            if let Err(cleanup) = self.pipeline.store().remove(&key).await {
                warn!(
                    key = %sanitize::redact_key(&key),
                    error = %cleanup,
                    "Failed to remove stored upload after insert failure"
                );
            }
            return Err(e.into());
        }

        info!(job_id = %job.id, size = bytes.len(), "Upload stored");
        Ok(job)
    }

    /// Uploads, then runs the job in the background without waiting for it.
    pub async fn upload_and_process(
        &self,
        user_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<(Job, JoinHandle<Result<JobResult, TriggerError>>), TriggerError> {
        let job = self.upload(user_id, file_name, bytes).await?;
        let handle = self.spawn_run(job.id.clone());
        Ok((job, handle))
    }

    /// Runs a job owned by `user_id` and waits for the result.
    ///
    /// Jobs of other users are reported as not found.
    pub async fn process(&self, user_id: &str, job_id: &str) -> Result<JobResult, TriggerError> {
        let job = self.owned_job(user_id, job_id).await?;
        self.run_bounded(&job.id).await
    }

    /// Starts a fresh attempt for a failed job.
    ///
    /// The failed job stays as it is; a new `uploaded` job pointing at the
    /// same stored PDF is created and run. Each job is retried at most once,
    /// so a failed retry is retried through its own id.
    pub async fn retry(&self, user_id: &str, job_id: &str) -> Result<JobResult, TriggerError> {
        let failed = self.owned_job(user_id, job_id).await?;
        if failed.status != JobStatus::Failed {
            return Err(TriggerError::Conflict {
                job_id: failed.id,
                status: failed.status,
            });
        }

        let retry = Job::retry_of(&failed);
        let record = retry.clone();
        let existing = self
            .pipeline
            .database()
            .blocking(move |db| job_repo::insert_retry(db, &record))
            .await?;
        if let Some(existing) = existing {
            return Err(TriggerError::AlreadyRetried {
                job_id: failed.id,
                retry_id: existing.id,
            });
        }
        info!(job_id = %retry.id, retry_of = %failed.id, "Retrying failed job");

        self.run_bounded(&retry.id).await
    }

    /// Lists the jobs of a user, newest first.
    pub async fn jobs(&self, user_id: &str) -> Result<Vec<Job>, TriggerError> {
        let user_id = user_id.to_string();
        Ok(self
            .pipeline
            .database()
            .blocking(move |db| job_repo::list_for_user(db, &user_id))
            .await?)
    }

    async fn owned_job(&self, user_id: &str, job_id: &str) -> Result<Job, TriggerError> {
        let (user, id) = (user_id.to_string(), job_id.to_string());
        self.pipeline
            .database()
            .blocking(move |db| job_repo::find_for_user(db, &user, &id))
            .await?
            .ok_or_else(|| TriggerError::NotFound(job_id.to_string()))
    }

    async fn run_bounded(&self, job_id: &str) -> Result<JobResult, TriggerError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| TriggerError::Task(e.to_string()))?;
        self.pipeline.run(job_id, self.progress.as_ref()).await
    }

    fn spawn_run(&self, job_id: String) -> JoinHandle<Result<JobResult, TriggerError>> {
        let pipeline = Arc::clone(&self.pipeline);
        let permits = Arc::clone(&self.permits);
        let progress = Arc::clone(&self.progress);

        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| TriggerError::Task(e.to_string()))?;
            let result = pipeline.run(&job_id, progress.as_ref()).await;
            if let Err(e) = &result {
                warn!(job_id = %job_id, error = %e, "Background run did not start");
            }
            result
        })
    }

    fn validate_bytes(&self, bytes: &[u8]) -> Result<(), TriggerError> {
        if bytes.is_empty() {
            return Err(TriggerError::InvalidUpload("file is empty".to_string()));
        }
        if bytes.len() as u64 > self.max_file_size {
            return Err(TriggerError::InvalidUpload(format!(
                "file is {} bytes, the limit is {}",
                bytes.len(),
                self.max_file_size
            )));
        }
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(TriggerError::InvalidUpload(
                "only PDF files are allowed".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn validate_user_id(user_id: &str) -> Result<(), TriggerError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() || trimmed != user_id || user_id.contains(is_separator) || user_id == ".."
    {
        return Err(TriggerError::InvalidUpload(format!(
            "invalid user id '{}'",
            user_id
        )));
    }
    Ok(())
}

/// Keeps only the final path segment of a client-supplied file name.
fn upload_file_name(file_name: &str) -> Result<&str, TriggerError> {
    let name = file_name
        .rsplit(is_separator)
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(TriggerError::InvalidUpload(format!(
            "invalid file name '{}'",
            file_name
        )));
    }
    Ok(name)
}
