//! Question set repository. A set and its questions are always written
//! and deleted together inside one transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::pipeline::questions::ExtractedQuestion;

/// A named group of questions owned by a user.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuestionSet {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// The pipeline job that produced this set; `None` for imports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_job_id: Option<String>,
    pub question_count: u32,
    pub created_at: DateTime<Utc>,
}

/// One persisted multiple-choice question.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Question {
    pub id: String,
    pub question_set_id: String,
    pub position: u32,
    pub question_text: String,
    pub options: Vec<String>,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

/// Values for a set that has not been written yet.
#[derive(Debug, Clone)]
pub struct NewQuestionSet<'a> {
    pub user_id: &'a str,
    pub name: &'a str,
    pub source_job_id: Option<&'a str>,
}

const SET_COLUMNS: &str = "s.id, s.user_id, s.name, s.source_job_id, s.created_at, \
     (SELECT COUNT(*) FROM questions q WHERE q.question_set_id = s.id) AS question_count";

struct SetRow {
    id: String,
    user_id: String,
    name: String,
    source_job_id: Option<String>,
    question_count: u32,
    created_at: String,
}

impl SetRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            name: row.get("name")?,
            source_job_id: row.get("source_job_id")?,
            question_count: row.get("question_count")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_set(self) -> Result<QuestionSet, DatabaseError> {
        Ok(QuestionSet {
            created_at: parse_timestamp("created_at", &self.created_at)?,
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            source_job_id: self.source_job_id,
            question_count: self.question_count,
        })
    }
}

struct QuestionRow {
    id: String,
    question_set_id: String,
    position: u32,
    question_text: String,
    options: String,
    answer: String,
    created_at: String,
}

impl QuestionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            question_set_id: row.get("question_set_id")?,
            position: row.get("position")?,
            question_text: row.get("question_text")?,
            options: row.get("options")?,
            answer: row.get("answer")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_question(self) -> Result<Question, DatabaseError> {
        let options: Vec<String> =
            serde_json::from_str(&self.options).map_err(|e| DatabaseError::InvalidColumn {
                column: "options",
                reason: e.to_string(),
            })?;
        Ok(Question {
            created_at: parse_timestamp("created_at", &self.created_at)?,
            id: self.id,
            question_set_id: self.question_set_id,
            position: self.position,
            question_text: self.question_text,
            options,
            answer: self.answer,
        })
    }
}

/// Inserts a set and all of its questions atomically.
///
/// Either every row is committed or none is. Question positions follow
/// the order of `questions`, starting at 0.
pub fn insert_set_with_questions(
    db: &Database,
    set: &NewQuestionSet<'_>,
    questions: &[ExtractedQuestion],
) -> Result<QuestionSet, DatabaseError> {
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = Utc::now();
    let created = format_timestamp(created_at);

    let encoded_options = questions
        .iter()
        .map(|q| serde_json::to_string(&q.options))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DatabaseError::InvalidColumn {
            column: "options",
            reason: e.to_string(),
        })?;

    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO question_sets (id, user_id, name, source_job_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, set.user_id, set.name, set.source_job_id, created],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO questions (id, question_set_id, position, question_text,
                 options, answer, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for (position, (question, options)) in
                questions.iter().zip(&encoded_options).enumerate()
            {
                stmt.execute(params![
                    uuid::Uuid::new_v4().to_string(),
                    id,
                    position as u32,
                    question.question,
                    options,
                    question.answer,
                    created,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    })?;

    Ok(QuestionSet {
        id,
        user_id: set.user_id.to_string(),
        name: set.name.to_string(),
        source_job_id: set.source_job_id.map(str::to_string),
        question_count: questions.len() as u32,
        created_at,
    })
}

/// Finds a set by ID if it belongs to `user_id`.
pub fn find_set(
    db: &Database,
    user_id: &str,
    set_id: &str,
) -> Result<Option<QuestionSet>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM question_sets s WHERE s.id = ?1 AND s.user_id = ?2",
            SET_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![set_id, user_id], SetRow::from_row)
            .optional()?)
    })?;
    row.map(SetRow::into_set).transpose()
}

/// Finds the set produced by a given job, if the job belongs to `user_id`.
pub fn find_set_for_job(
    db: &Database,
    user_id: &str,
    job_id: &str,
) -> Result<Option<QuestionSet>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM question_sets s WHERE s.source_job_id = ?1 AND s.user_id = ?2",
            SET_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![job_id, user_id], SetRow::from_row)
            .optional()?)
    })?;
    row.map(SetRow::into_set).transpose()
}

/// Lists a user's sets, newest first.
pub fn list_sets_for_user(db: &Database, user_id: &str) -> Result<Vec<QuestionSet>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM question_sets s WHERE s.user_id = ?1 ORDER BY s.created_at DESC, s.id",
            SET_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![user_id], SetRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(SetRow::into_set).collect()
}

/// Returns the questions of a set in their original order.
pub fn questions_for_set(db: &Database, set_id: &str) -> Result<Vec<Question>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, question_set_id, position, question_text, options, answer, created_at
             FROM questions WHERE question_set_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![set_id], QuestionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(QuestionRow::into_question).collect()
}

/// Deletes a set owned by `user_id` together with its questions.
///
/// Returns `false` if no such set exists for that user, in which case
/// nothing is deleted.
pub fn delete_set(db: &Database, user_id: &str, set_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        let owned: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM question_sets WHERE id = ?1 AND user_id = ?2)",
            params![set_id, user_id],
            |r| r.get(0),
        )?;
        if !owned {
            return Ok(false);
        }
        tx.execute(
            "DELETE FROM questions WHERE question_set_id = ?1",
            params![set_id],
        )?;
        tx.execute("DELETE FROM question_sets WHERE id = ?1", params![set_id])?;
        tx.commit()?;
        Ok(true)
    })
}
