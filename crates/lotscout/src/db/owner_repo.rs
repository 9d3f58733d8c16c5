//! Owner info repository for skip-trace results.
//!
//! `Complete` and `NotFound` are terminal: `upsert` refuses to overwrite a
//! terminal row, which makes re-triggering the stage safe at the storage
//! layer too, not just in the scheduler.

use rusqlite::{params, Row};

use crate::model::{OwnerContact, OwnerRecord, OwnerStatus};

use super::{Database, DatabaseError};

/// An owner info row from the database.
#[derive(Debug, Clone)]
pub struct OwnerInfoRow {
    pub property_id: String,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phones: Vec<OwnerContact>,
    pub emails: Vec<OwnerContact>,
    pub mailing_address: Option<String>,
    pub owner_type: Option<String>,
    pub owner_occupied: Option<bool>,
    pub is_deceased: bool,
    pub is_litigator: bool,
    pub confidence: f64,
    pub source: String,
    pub status: OwnerStatus,
    pub retry_count: u32,
    pub processing_seconds: f64,
    pub error: Option<String>,
}

impl OwnerInfoRow {
    /// A successful trace result.
    pub fn complete(property_id: &str, record: &OwnerRecord, processing_seconds: f64) -> Self {
        Self {
            property_id: property_id.to_string(),
            full_name: record.full_name.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            phones: record.phones.clone(),
            emails: record.emails.clone(),
            mailing_address: record.mailing_address.clone(),
            owner_type: record.owner_type.clone(),
            owner_occupied: record.owner_occupied,
            is_deceased: record.is_deceased,
            is_litigator: record.is_litigator,
            confidence: record.confidence,
            source: record.source.clone(),
            status: OwnerStatus::Complete,
            retry_count: 0,
            processing_seconds,
            error: None,
        }
    }

    /// The provider found nothing for this address. Terminal.
    pub fn not_found(property_id: &str, source: &str, processing_seconds: f64) -> Self {
        Self {
            property_id: property_id.to_string(),
            full_name: None,
            first_name: None,
            last_name: None,
            phones: Vec::new(),
            emails: Vec::new(),
            mailing_address: None,
            owner_type: None,
            owner_occupied: None,
            is_deceased: false,
            is_litigator: false,
            confidence: 0.0,
            source: source.to_string(),
            status: OwnerStatus::NotFound,
            retry_count: 0,
            processing_seconds,
            error: None,
        }
    }

    /// A failed trace attempt; `retry_count` carries how often this property
    /// has errored so far.
    pub fn errored(property_id: &str, error: String, retry_count: u32) -> Self {
        Self {
            property_id: property_id.to_string(),
            full_name: None,
            first_name: None,
            last_name: None,
            phones: Vec::new(),
            emails: Vec::new(),
            mailing_address: None,
            owner_type: None,
            owner_occupied: None,
            is_deceased: false,
            is_litigator: false,
            confidence: 0.0,
            source: String::new(),
            status: OwnerStatus::Error,
            retry_count,
            processing_seconds: 0.0,
            error: Some(error),
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status_raw: String = row.get("status")?;
        let status = OwnerStatus::parse(&status_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown owner status '{}'", status_raw).into(),
            )
        })?;

        let phones_raw: String = row.get("phones")?;
        let emails_raw: String = row.get("emails")?;
        let json_err = |e: serde_json::Error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        };

        Ok(Self {
            property_id: row.get("property_id")?,
            full_name: row.get("full_name")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            phones: serde_json::from_str(&phones_raw).map_err(json_err)?,
            emails: serde_json::from_str(&emails_raw).map_err(json_err)?,
            mailing_address: row.get("mailing_address")?,
            owner_type: row.get("owner_type")?,
            owner_occupied: row.get("owner_occupied")?,
            is_deceased: row.get("is_deceased")?,
            is_litigator: row.get("is_litigator")?,
            confidence: row.get("confidence")?,
            source: row.get("source")?,
            status,
            retry_count: row.get("retry_count")?,
            processing_seconds: row.get("processing_seconds")?,
            error: row.get("error")?,
        })
    }
}

/// Inserts or overwrites the owner info for a property. Returns `false`
/// without writing when the stored row is already terminal.
pub fn upsert(db: &Database, info: &OwnerInfoRow, updated_at: &str) -> Result<bool, DatabaseError> {
    if let Some(existing) = find_by_property(db, &info.property_id)? {
        if existing.status.is_terminal() {
            log::debug!(
                "Skipping owner info write for {}: already {}",
                info.property_id,
                existing.status.as_str()
            );
            return Ok(false);
        }
    }

    let phones = serde_json::to_string(&info.phones).map_err(|e| DatabaseError::CorruptRow {
        table: "owner_info",
        reason: e.to_string(),
    })?;
    let emails = serde_json::to_string(&info.emails).map_err(|e| DatabaseError::CorruptRow {
        table: "owner_info",
        reason: e.to_string(),
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR REPLACE INTO owner_info (
                property_id, full_name, first_name, last_name, phones, emails,
                mailing_address, owner_type, owner_occupied, is_deceased, is_litigator,
                confidence, source, status, retry_count, processing_seconds, error, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18
            )",
            params![
                info.property_id,
                info.full_name,
                info.first_name,
                info.last_name,
                phones,
                emails,
                info.mailing_address,
                info.owner_type,
                info.owner_occupied,
                info.is_deceased,
                info.is_litigator,
                info.confidence,
                info.source,
                info.status.as_str(),
                info.retry_count,
                info.processing_seconds,
                info.error,
                updated_at,
            ],
        )?;
        Ok(true)
    })
}

/// Loads the owner info for a property, if any.
pub fn find_by_property(
    db: &Database,
    property_id: &str,
) -> Result<Option<OwnerInfoRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM owner_info WHERE property_id = ?1")?;
        let mut rows = stmt.query_map(params![property_id], OwnerInfoRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
