use std::path::PathBuf;

use thiserror::Error;

use super::classifier::StageFailure;
use super::ingest::IngestError;
use crate::error::StorageError;
use crate::worker::job::JobFailure;

/// Why a pipeline run ended in `failed`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to fetch source PDF: {0}")]
    Fetch(#[source] StorageError),

    #[error("{0}")]
    Stage(StageFailure),

    #[error("Extracted text is empty")]
    EmptyExtraction,

    #[error("No questions were extracted")]
    NoQuestions,

    #[error("Failed to persist questions: {0}")]
    Persist(#[source] IngestError),

    #[error("Artifact I/O failed for '{path}': {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub(crate) fn artifact(path: &std::path::Path, source: std::io::Error) -> Self {
        PipelineError::Artifact {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable label stored as the job's `error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "FetchError",
            PipelineError::Stage(failure) => failure.kind.as_str(),
            PipelineError::EmptyExtraction => "EmptyExtractionError",
            PipelineError::NoQuestions => "NoQuestionsError",
            PipelineError::Persist(_) => "PersistError",
            PipelineError::Artifact { .. } => "ArtifactError",
            PipelineError::Internal(_) => "Internal",
        }
    }

    /// The message/details pair recorded on the job.
    pub fn to_failure(&self) -> JobFailure {
        let (message, details) = match self {
            PipelineError::Fetch(e) => (
                "Failed to download PDF from storage".to_string(),
                e.to_string(),
            ),
            PipelineError::Stage(failure) => (failure.message.clone(), failure.details.clone()),
            PipelineError::EmptyExtraction => (
                "No text extracted from PDF".to_string(),
                "The text extractor did not generate any text output.".to_string(),
            ),
            PipelineError::NoQuestions => (
                "No questions found".to_string(),
                "No questions were extracted from the PDF.".to_string(),
            ),
            PipelineError::Persist(e) => ("Failed to save questions".to_string(), e.to_string()),
            PipelineError::Artifact { source, .. } => (
                "Failed to handle temporary files".to_string(),
                source.to_string(),
            ),
            PipelineError::Internal(reason) => {
                ("Internal server error".to_string(), reason.clone())
            }
        };

        JobFailure {
            kind: self.kind().to_string(),
            message,
            details,
        }
    }
}
