//! Property repository — per-address rows and their per-stage statuses.
//!
//! Stage scheduling queries live here: `find_pending_for_stage` is what makes
//! re-triggering a stage idempotent (completed rows are never returned, rows
//! currently processing are not double-scheduled).

use rusqlite::{params, Row};

use crate::model::{GeocodedAddress, PropertyInput, Stage, StageStatus};

use super::{Database, DatabaseError};

/// A property row from the database.
#[derive(Debug, Clone)]
pub struct PropertyRow {
    pub id: String,
    pub job_id: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub contact_id: Option<String>,
    pub owner_name: Option<String>,
    pub county: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geocode_accuracy: Option<String>,
    pub geocode_source: Option<String>,
    pub gis_status: StageStatus,
    pub ai_status: StageStatus,
    pub skip_trace_status: StageStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl PropertyRow {
    pub fn new(job_id: &str, input: &PropertyInput, created_at: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            street: input.street.clone(),
            city: input.city.clone(),
            state: input.state.clone(),
            postal_code: input.postal_code.clone(),
            contact_id: input.contact_id.clone(),
            owner_name: input.owner_name.clone(),
            county: None,
            latitude: None,
            longitude: None,
            geocode_accuracy: None,
            geocode_source: None,
            gis_status: StageStatus::Pending,
            ai_status: StageStatus::Pending,
            skip_trace_status: StageStatus::Pending,
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
        }
    }

    /// Rebuilds the original input for adapters that work from the address.
    pub fn input(&self) -> PropertyInput {
        PropertyInput {
            street: self.street.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            postal_code: self.postal_code.clone(),
            contact_id: self.contact_id.clone(),
            owner_name: self.owner_name.clone(),
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            street: row.get("street")?,
            city: row.get("city")?,
            state: row.get("state")?,
            postal_code: row.get("postal_code")?,
            contact_id: row.get("contact_id")?,
            owner_name: row.get("owner_name")?,
            county: row.get("county")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            geocode_accuracy: row.get("geocode_accuracy")?,
            geocode_source: row.get("geocode_source")?,
            gis_status: stage_status_from_sql(row, "gis_status")?,
            ai_status: stage_status_from_sql(row, "ai_status")?,
            skip_trace_status: stage_status_from_sql(row, "skip_trace_status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

fn stage_status_from_sql(row: &Row<'_>, column: &str) -> Result<StageStatus, rusqlite::Error> {
    let raw: String = row.get(column)?;
    StageStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown stage status '{}'", raw).into(),
        )
    })
}

fn status_column(stage: Stage) -> &'static str {
    match stage {
        Stage::Gis => "gis_status",
        Stage::AiAnalysis => "ai_status",
        Stage::SkipTrace => "skip_trace_status",
    }
}

/// Inserts a batch of property rows in a single transaction.
pub fn insert_batch(db: &Database, rows: &[PropertyRow]) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute_batch("BEGIN")?;
        for row in rows {
            let result = conn.execute(
                "INSERT INTO properties (id, job_id, street, city, state, postal_code,
                 contact_id, owner_name, county, latitude, longitude, geocode_accuracy,
                 geocode_source, gis_status, ai_status, skip_trace_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    row.id,
                    row.job_id,
                    row.street,
                    row.city,
                    row.state,
                    row.postal_code,
                    row.contact_id,
                    row.owner_name,
                    row.county,
                    row.latitude,
                    row.longitude,
                    row.geocode_accuracy,
                    row.geocode_source,
                    row.gis_status.as_str(),
                    row.ai_status.as_str(),
                    row.skip_trace_status.as_str(),
                    row.created_at,
                    row.updated_at,
                ],
            );
            if let Err(e) = result {
                conn.execute_batch("ROLLBACK").ok();
                return Err(DatabaseError::Sqlite(e));
            }
        }
        conn.execute_batch("COMMIT")?;
        Ok(())
    })
}

/// Finds a property by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<PropertyRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM properties WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], PropertyRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns all properties of a job, oldest first.
pub fn find_by_job(db: &Database, job_id: &str) -> Result<Vec<PropertyRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM properties WHERE job_id = ?1 ORDER BY created_at")?;
        let rows: Vec<PropertyRow> = stmt
            .query_map(params![job_id], PropertyRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Stores geocoding output on the property row.
pub fn set_coordinates(
    db: &Database,
    id: &str,
    geocoded: &GeocodedAddress,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE properties SET latitude = ?2, longitude = ?3, county = ?4,
             geocode_accuracy = ?5, geocode_source = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                geocoded.latitude,
                geocoded.longitude,
                geocoded.county,
                geocoded.accuracy.as_str(),
                geocoded.source,
                updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Sets the status of one stage for one property.
pub fn set_stage_status(
    db: &Database,
    id: &str,
    stage: Stage,
    status: StageStatus,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    let column = status_column(stage);
    db.with_conn(|conn| {
        conn.execute(
            &format!(
                "UPDATE properties SET {} = ?2, updated_at = ?3 WHERE id = ?1",
                column
            ),
            params![id, status.as_str(), updated_at],
        )?;
        Ok(())
    })
}

/// Properties of a job still needing work for the given stage.
///
/// Completed rows are excluded (idempotent re-trigger) and rows currently
/// processing are not handed out twice. Errored rows are eligible again.
pub fn find_pending_for_stage(
    db: &Database,
    job_id: &str,
    stage: Stage,
) -> Result<Vec<PropertyRow>, DatabaseError> {
    let column = status_column(stage);
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM properties WHERE job_id = ?1 AND {} IN ('pending', 'error')
             ORDER BY created_at",
            column
        ))?;
        let rows: Vec<PropertyRow> = stmt
            .query_map(params![job_id], PropertyRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts completed rows of a job for the given stage.
pub fn count_completed_for_stage(
    db: &Database,
    job_id: &str,
    stage: Stage,
) -> Result<u64, DatabaseError> {
    let column = status_column(stage);
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM properties WHERE job_id = ?1 AND {} = 'completed'",
                column
            ),
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Counts all properties of a job.
pub fn count_by_job(db: &Database, job_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM properties WHERE job_id = ?1",
            params![job_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Resets rows stuck in `processing` since before the cutoff back to
/// `pending`. Returns how many were requeued. At-least-once recovery for
/// workers that died mid-property.
pub fn requeue_stalled(
    db: &Database,
    job_id: &str,
    stage: Stage,
    cutoff: &str,
    updated_at: &str,
) -> Result<u64, DatabaseError> {
    let column = status_column(stage);
    db.with_conn(|conn| {
        let changed = conn.execute(
            &format!(
                "UPDATE properties SET {} = 'pending', updated_at = ?3
                 WHERE job_id = ?1 AND {} = 'processing' AND updated_at < ?2",
                column, column
            ),
            params![job_id, cutoff, updated_at],
        )?;
        Ok(changed as u64)
    })
}
