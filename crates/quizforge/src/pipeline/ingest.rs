//! Validation and atomic persistence of extracted questions.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::questions::ExtractedQuestion;
use crate::db::question_repo::{self, NewQuestionSet, QuestionSet};
use crate::db::{Database, DatabaseError};
use crate::worker::job::Job;

/// Name given to imported sets when the caller supplies none.
pub const DEFAULT_IMPORT_NAME: &str = "Untitled Group";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No questions to persist")]
    Empty,

    #[error("Question {index} is invalid: {reason}")]
    InvalidQuestion { index: usize, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Name of the set created for a pipeline job.
pub fn question_set_name(file_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "Extracted from {} ({})",
        file_name,
        at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

fn check(questions: &[ExtractedQuestion]) -> Result<(), IngestError> {
    if questions.is_empty() {
        return Err(IngestError::Empty);
    }
    for (index, q) in questions.iter().enumerate() {
        if q.question.trim().is_empty() {
            return Err(IngestError::InvalidQuestion {
                index,
                reason: "question text is empty".to_string(),
            });
        }
    }
    Ok(())
}

/// Persists the questions of a finished job as one new set.
///
/// The set and all questions are written in a single transaction; on error
/// nothing remains.
pub fn persist(
    db: &Database,
    job: &Job,
    questions: &[ExtractedQuestion],
) -> Result<QuestionSet, IngestError> {
    check(questions)?;
    let name = question_set_name(&job.file_name, Utc::now());
    let set = question_repo::insert_set_with_questions(
        db,
        &NewQuestionSet {
            user_id: &job.user_id,
            name: &name,
            source_job_id: Some(&job.id),
        },
        questions,
    )?;
    tracing::info!(
        question_set_id = %set.id,
        questions = set.question_count,
        "Persisted question set"
    );
    Ok(set)
}

/// Creates a set without a source job (bulk upload).
pub fn import(
    db: &Database,
    user_id: &str,
    name: Option<&str>,
    questions: &[ExtractedQuestion],
) -> Result<QuestionSet, IngestError> {
    check(questions)?;
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_IMPORT_NAME);
    Ok(question_repo::insert_set_with_questions(
        db,
        &NewQuestionSet {
            user_id,
            name,
            source_job_id: None,
        },
        questions,
    )?)
}
