use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Phase of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Fetching,
    ExtractingText,
    Chunking,
    ExtractingQuestions,
    Persisting,
    CleaningUp,
    Completed,
    Failed,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Fetching => write!(f, "Fetching"),
            JobPhase::ExtractingText => write!(f, "Extracting text"),
            JobPhase::Chunking => write!(f, "Chunking"),
            JobPhase::ExtractingQuestions => write!(f, "Extracting questions"),
            JobPhase::Persisting => write!(f, "Persisting"),
            JobPhase::CleaningUp => write!(f, "Cleaning up"),
            JobPhase::Completed => write!(f, "Completed"),
            JobPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub phase: JobPhase,
    /// Human-readable message describing current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    pub fn new(job_id: &str, phase: JobPhase, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            phase,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: JobProgressEvent);
}

/// No-op reporter for callers that do not watch progress.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: JobProgressEvent) {}
}

/// Publishes events on a broadcast channel.
///
/// Sending never blocks; events are dropped when nobody is subscribed.
#[derive(Clone)]
pub struct BroadcastProgress {
    sender: broadcast::Sender<JobProgressEvent>,
}

impl BroadcastProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: JobProgressEvent) {
        // Err only means there are no receivers.
        let _ = self.sender.send(event);
    }
}
