//! Owner-scoped queries over persisted question sets, plus bulk import.

use thiserror::Error;

use crate::db::question_repo::{self, Question, QuestionSet};
use crate::db::{Database, DatabaseError};
use crate::pipeline::ingest::{self, IngestError};
use crate::pipeline::questions::ExtractedQuestion;

#[derive(Error, Debug)]
pub enum QuestionSetError {
    #[error("Question set not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Read and delete access to a user's question sets.
///
/// A set that belongs to another user is indistinguishable from a missing
/// one.
#[derive(Clone)]
pub struct QuestionSets {
    db: Database,
}

impl QuestionSets {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<QuestionSet>, QuestionSetError> {
        Ok(question_repo::list_sets_for_user(&self.db, user_id)?)
    }

    pub fn get(&self, user_id: &str, set_id: &str) -> Result<QuestionSet, QuestionSetError> {
        question_repo::find_set(&self.db, user_id, set_id)?
            .ok_or_else(|| QuestionSetError::NotFound(set_id.to_string()))
    }

    /// Questions of a set, in their original order.
    pub fn questions(&self, user_id: &str, set_id: &str) -> Result<Vec<Question>, QuestionSetError> {
        let set = self.get(user_id, set_id)?;
        Ok(question_repo::questions_for_set(&self.db, &set.id)?)
    }

    /// Questions produced by a pipeline job.
    pub fn questions_for_job(
        &self,
        user_id: &str,
        job_id: &str,
    ) -> Result<(QuestionSet, Vec<Question>), QuestionSetError> {
        let set = question_repo::find_set_for_job(&self.db, user_id, job_id)?
            .ok_or_else(|| QuestionSetError::NotFound(format!("job {}", job_id)))?;
        let questions = question_repo::questions_for_set(&self.db, &set.id)?;
        Ok((set, questions))
    }

    /// Deletes a set and its questions in one transaction.
    pub fn delete(&self, user_id: &str, set_id: &str) -> Result<(), QuestionSetError> {
        if question_repo::delete_set(&self.db, user_id, set_id)? {
            tracing::info!(question_set_id = %set_id, "Question set deleted");
            Ok(())
        } else {
            Err(QuestionSetError::NotFound(set_id.to_string()))
        }
    }

    /// Creates a set from questions supplied directly by the user.
    pub fn import(
        &self,
        user_id: &str,
        name: Option<&str>,
        questions: &[ExtractedQuestion],
    ) -> Result<QuestionSet, QuestionSetError> {
        Ok(ingest::import(&self.db, user_id, name, questions)?)
    }
}
