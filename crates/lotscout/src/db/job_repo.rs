//! Job repository — CRUD operations for the `jobs` table.
//!
//! `processed_count` is moved by the atomic `increment_processed` update,
//! so progress stays monotone even with many workers reporting, and is
//! resynced from the properties table when the job completes.

use rusqlite::{params, Row};

use crate::model::JobStatus;

use super::{Database, DatabaseError};

/// A job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub status: JobStatus,
    pub total_count: u32,
    pub processed_count: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    pub fn new(total_count: u32, created_at: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Queued,
            total_count,
            processed_count: 0,
            error: None,
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
            completed_at: None,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status_raw: String = row.get("status")?;
        let status = JobStatus::parse(&status_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown job status '{}'", status_raw).into(),
            )
        })?;

        Ok(Self {
            id: row.get("id")?,
            status,
            total_count: row.get("total_count")?,
            processed_count: row.get("processed_count")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, status, total_count, processed_count, error,
             created_at, updated_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                job.id,
                job.status.as_str(),
                job.total_count,
                job.processed_count,
                job.error,
                job.created_at,
                job.updated_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Updates only the status and updated_at of a job.
pub fn set_status(
    db: &Database,
    id: &str,
    status: JobStatus,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), updated_at],
        )?;
        Ok(())
    })
}

/// Marks a job failed with an infrastructure error message.
pub fn mark_failed(
    db: &Database,
    id: &str,
    error: &str,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET status = 'failed', error = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, error, updated_at],
        )?;
        Ok(())
    })
}

/// Atomically bumps `processed_count` by one. Returns the new count.
pub fn increment_processed(
    db: &Database,
    id: &str,
    updated_at: &str,
) -> Result<u32, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET processed_count = processed_count + 1, updated_at = ?2
             WHERE id = ?1",
            params![id, updated_at],
        )?;
        let count: u32 = conn.query_row(
            "SELECT processed_count FROM jobs WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Completes the job once every property is terminal for the GIS stage.
/// Returns whether the transition happened. Guarded in SQL so concurrent
/// callers cannot complete the same job twice.
///
/// The guard counts property rows rather than trusting `processed_count`:
/// the stage-status write and the counter bump are separate transactions,
/// and a crash between them must not strand the job. The counter is
/// resynced from the same count on completion.
pub fn mark_completed_if_done(
    db: &Database,
    id: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'completed', completed_at = ?2, updated_at = ?2,
                 processed_count = (
                     SELECT COUNT(*) FROM properties
                     WHERE job_id = jobs.id AND gis_status IN ('completed', 'error'))
             WHERE id = ?1 AND status = 'processing'
               AND (SELECT COUNT(*) FROM properties
                    WHERE job_id = jobs.id AND gis_status IN ('completed', 'error'))
                      >= total_count",
            params![id, updated_at],
        )?;
        Ok(changed > 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::property_repo::{self, PropertyRow};
    use crate::model::{PropertyInput, Stage, StageStatus};

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    const TS: &str = "2026-01-01T00:00:00Z";

    fn add_property(db: &Database, job_id: &str, status: StageStatus) -> String {
        let input = PropertyInput {
            street: "1 Main St".to_string(),
            city: "Seneca".to_string(),
            state: "SC".to_string(),
            postal_code: "29672".to_string(),
            contact_id: None,
            owner_name: None,
        };
        let row = PropertyRow::new(job_id, &input, TS);
        let id = row.id.clone();
        property_repo::insert_batch(db, &[row]).unwrap();
        property_repo::set_stage_status(db, &id, Stage::Gis, status, TS).unwrap();
        id
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let job = JobRow::new(5, TS);
        insert(&db, &job).unwrap();

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Queued);
        assert_eq!(found.total_count, 5);
        assert_eq!(found.processed_count, 0);
        assert!(found.completed_at.is_none());
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        let found = find_by_id(&db, "nonexistent").unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_set_status() {
        let db = test_db();
        let job = JobRow::new(1, TS);
        insert(&db, &job).unwrap();

        set_status(&db, &job.id, JobStatus::Processing, TS).unwrap();
        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Processing);
    }

    #[test]
    fn test_increment_processed_is_monotone() {
        let db = test_db();
        let job = JobRow::new(3, TS);
        insert(&db, &job).unwrap();

        assert_eq!(increment_processed(&db, &job.id, TS).unwrap(), 1);
        assert_eq!(increment_processed(&db, &job.id, TS).unwrap(), 2);
        assert_eq!(increment_processed(&db, &job.id, TS).unwrap(), 3);
    }

    #[test]
    fn test_mark_completed_only_when_all_rows_terminal() {
        let db = test_db();
        let job = JobRow::new(2, TS);
        insert(&db, &job).unwrap();
        set_status(&db, &job.id, JobStatus::Processing, TS).unwrap();

        add_property(&db, &job.id, StageStatus::Completed);
        increment_processed(&db, &job.id, TS).unwrap();
        assert!(!mark_completed_if_done(&db, &job.id, TS).unwrap());

        // Errored rows are terminal too.
        add_property(&db, &job.id, StageStatus::Error);
        increment_processed(&db, &job.id, TS).unwrap();
        assert!(mark_completed_if_done(&db, &job.id, TS).unwrap());

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Completed);
        assert_eq!(found.processed_count, 2);
        assert!(found.completed_at.is_some());

        // Second attempt is a no-op.
        assert!(!mark_completed_if_done(&db, &job.id, TS).unwrap());
    }

    #[test]
    fn test_completion_survives_lost_counter_update() {
        // The property's terminal status landed but the counter bump never
        // did; completion must still fire and resync the counter.
        let db = test_db();
        let job = JobRow::new(1, TS);
        insert(&db, &job).unwrap();
        set_status(&db, &job.id, JobStatus::Processing, TS).unwrap();
        add_property(&db, &job.id, StageStatus::Completed);

        assert!(mark_completed_if_done(&db, &job.id, TS).unwrap());
        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Completed);
        assert_eq!(found.processed_count, 1);
    }

    #[test]
    fn test_pending_rows_block_completion() {
        let db = test_db();
        let job = JobRow::new(1, TS);
        insert(&db, &job).unwrap();
        set_status(&db, &job.id, JobStatus::Processing, TS).unwrap();
        add_property(&db, &job.id, StageStatus::Pending);

        assert!(!mark_completed_if_done(&db, &job.id, TS).unwrap());
        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Processing);
    }

    #[test]
    fn test_mark_completed_requires_processing_status() {
        let db = test_db();
        let job = JobRow::new(0, TS);
        insert(&db, &job).unwrap();

        // Still queued: the guard keeps it from completing.
        assert!(!mark_completed_if_done(&db, &job.id, TS).unwrap());
    }

    #[test]
    fn test_mark_failed() {
        let db = test_db();
        let job = JobRow::new(1, TS);
        insert(&db, &job).unwrap();

        mark_failed(&db, &job.id, "scheduler exploded", TS).unwrap();
        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Failed);
        assert_eq!(found.error.as_deref(), Some("scheduler exploded"));
    }
}
