//! Job repository: reads and status transitions for the `jobs` table.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::worker::job::{Job, JobFailure, JobStatus};

const JOB_COLUMNS: &str = "id, user_id, file_name, storage_path, status, error_kind, \
     error_message, error_details, retry_of, created_at, updated_at, completed_at";

/// A raw job row from the database.
#[derive(Debug, Clone)]
struct JobRow {
    id: String,
    user_id: String,
    file_name: String,
    storage_path: String,
    status: String,
    error_kind: Option<String>,
    error_message: Option<String>,
    error_details: Option<String>,
    retry_of: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            file_name: row.get("file_name")?,
            storage_path: row.get("storage_path")?,
            status: row.get("status")?,
            error_kind: row.get("error_kind")?,
            error_message: row.get("error_message")?,
            error_details: row.get("error_details")?,
            retry_of: row.get("retry_of")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    fn into_job(self) -> Result<Job, DatabaseError> {
        let status = self
            .status
            .parse::<JobStatus>()
            .map_err(|reason| DatabaseError::InvalidColumn {
                column: "status",
                reason,
            })?;

        let failure = self.error_kind.map(|kind| JobFailure {
            kind,
            message: self.error_message.unwrap_or_default(),
            details: self.error_details.unwrap_or_default(),
        });

        let completed_at = self
            .completed_at
            .as_deref()
            .map(|v| parse_timestamp("completed_at", v))
            .transpose()?;

        Ok(Job {
            id: self.id,
            user_id: self.user_id,
            file_name: self.file_name,
            storage_path: self.storage_path,
            status,
            failure,
            retry_of: self.retry_of,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            completed_at,
        })
    }
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &Job) -> Result<(), DatabaseError> {
    db.with_conn(|conn| insert_row(conn, job))
}

/// Inserts a retry job unless its parent already has one.
///
/// Check and insert share one transaction. When a retry exists it is
/// returned and nothing is inserted.
pub fn insert_retry(db: &Database, retry: &Job) -> Result<Option<Job>, DatabaseError> {
    let parent = retry
        .retry_of
        .as_deref()
        .ok_or_else(|| DatabaseError::InvalidColumn {
            column: "retry_of",
            reason: format!("job {} is not a retry", retry.id),
        })?;

    let existing = db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        let sql = format!("SELECT {} FROM jobs WHERE retry_of = ?1", JOB_COLUMNS);
        let existing = tx
            .query_row(&sql, params![parent], JobRow::from_row)
            .optional()?;
        if existing.is_none() {
            insert_row(&tx, retry)?;
            tx.commit()?;
        }
        Ok(existing)
    })?;
    existing.map(JobRow::into_job).transpose()
}

fn insert_row(conn: &Connection, job: &Job) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, user_id, file_name, storage_path, status, error_kind,
         error_message, error_details, retry_of, created_at, updated_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            job.id,
            job.user_id,
            job.file_name,
            job.storage_path,
            job.status.as_str(),
            job.failure.as_ref().map(|f| f.kind.as_str()),
            job.failure.as_ref().map(|f| f.message.as_str()),
            job.failure.as_ref().map(|f| f.details.as_str()),
            job.retry_of,
            format_timestamp(job.created_at),
            format_timestamp(job.updated_at),
            job.completed_at.map(format_timestamp),
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID regardless of owner.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Job>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        Ok(conn
            .query_row(&sql, params![id], JobRow::from_row)
            .optional()?)
    })?;
    row.map(JobRow::into_job).transpose()
}

/// Finds a job by ID only if it belongs to `user_id`.
pub fn find_for_user(db: &Database, user_id: &str, id: &str) -> Result<Option<Job>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM jobs WHERE id = ?1 AND user_id = ?2",
            JOB_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![id, user_id], JobRow::from_row)
            .optional()?)
    })?;
    row.map(JobRow::into_job).transpose()
}

/// Lists a user's jobs, newest first.
pub fn list_for_user(db: &Database, user_id: &str) -> Result<Vec<Job>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let sql = format!(
            "SELECT {} FROM jobs WHERE user_id = ?1 ORDER BY created_at DESC, id",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![user_id], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(JobRow::into_job).collect()
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Moves a job from `expected` to `next` in a single conditional update.
///
/// Returns `Ok(false)` when the job is missing or its current status is not
/// `expected`; the row is left untouched in that case. Entering `processing`
/// clears any failure fields, entering a terminal status stamps
/// `completed_at`. `failure` is recorded only when `next` is `failed`.
pub fn transition(
    db: &Database,
    id: &str,
    expected: JobStatus,
    next: JobStatus,
    failure: Option<&JobFailure>,
) -> Result<bool, DatabaseError> {
    if !expected.can_transition_to(next) {
        return Err(DatabaseError::InvalidTransition {
            from: expected.as_str(),
            to: next.as_str(),
        });
    }

    let now = format_timestamp(Utc::now());
    let completed_at = next.is_terminal().then(|| now.clone());
    let failure = failure.filter(|_| next == JobStatus::Failed);

    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = ?3, error_kind = ?4, error_message = ?5,
             error_details = ?6, updated_at = ?7, completed_at = ?8
             WHERE id = ?1 AND status = ?2",
            params![
                id,
                expected.as_str(),
                next.as_str(),
                failure.map(|f| f.kind.as_str()),
                failure.map(|f| f.message.as_str()),
                failure.map(|f| f.details.as_str()),
                now,
                completed_at,
            ],
        )?;
        Ok(changed == 1)
    })
}
