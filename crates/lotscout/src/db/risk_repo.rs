//! Risk result repository.
//!
//! One row per property; re-running the GIS stage overwrites. The derived
//! `landlocked` flag is checked against `road_has_access` on every write and
//! re-derived if a caller handed in an inconsistent pair, so a contradictory
//! row can never be persisted.

use log::warn;
use rusqlite::{params, Row};

use crate::model::{
    Confidence, FloodSignal, ProtectedLandSignal, RiskLevel, RiskResult, RoadAccessSignal,
    Severity, SlopeSignal, WetlandsSignal,
};

use super::{Database, DatabaseError};

fn confidence_from_sql(row: &Row<'_>, column: &str) -> Result<Confidence, rusqlite::Error> {
    let raw: String = row.get(column)?;
    Confidence::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown confidence '{}'", raw).into(),
        )
    })
}

fn severity_from_sql(row: &Row<'_>, column: &str) -> Result<Severity, rusqlite::Error> {
    let raw: String = row.get(column)?;
    Severity::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown severity '{}'", raw).into(),
        )
    })
}

fn from_row(row: &Row<'_>) -> Result<RiskResult, rusqlite::Error> {
    let overall_raw: String = row.get("overall_risk")?;
    let overall_risk = RiskLevel::parse(&overall_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown risk level '{}'", overall_raw).into(),
        )
    })?;

    Ok(RiskResult {
        property_id: row.get("property_id")?,
        wetlands: WetlandsSignal {
            present: row.get("wetlands_present")?,
            wetland_type: row.get("wetlands_type")?,
            source: row.get("wetlands_source")?,
            confidence: confidence_from_sql(row, "wetlands_confidence")?,
        },
        flood: FloodSignal {
            zone: row.get("flood_zone")?,
            severity: severity_from_sql(row, "flood_severity")?,
            in_sfha: row.get("flood_in_sfha")?,
            source: row.get("flood_source")?,
            confidence: confidence_from_sql(row, "flood_confidence")?,
        },
        slope: SlopeSignal {
            percent: row.get("slope_percent")?,
            severity: severity_from_sql(row, "slope_severity")?,
            source: row.get("slope_source")?,
            confidence: confidence_from_sql(row, "slope_confidence")?,
        },
        road_access: RoadAccessSignal {
            has_access: row.get("road_has_access")?,
            distance_m: row.get("road_distance_m")?,
            source: row.get("road_source")?,
            confidence: confidence_from_sql(row, "road_confidence")?,
        },
        protected: ProtectedLandSignal {
            is_protected: row.get("protected_is")?,
            kind: row.get("protected_kind")?,
            source: row.get("protected_source")?,
            confidence: confidence_from_sql(row, "protected_confidence")?,
        },
        landlocked: row.get("landlocked")?,
        overall_risk,
        processing_seconds: row.get("processing_seconds")?,
        error: row.get("error")?,
    })
}

/// Inserts or overwrites the risk result for a property.
pub fn upsert(db: &Database, result: &RiskResult, updated_at: &str) -> Result<(), DatabaseError> {
    // landlocked is derived state; never trust a caller that disagrees
    // with its own road signal.
    let derived = !result.road_access.has_access;
    if result.landlocked != derived {
        warn!(
            "Inconsistent landlocked flag for property {} (stored {}, derived {}); re-deriving",
            result.property_id, result.landlocked, derived
        );
    }

    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR REPLACE INTO risk_results (
                property_id,
                wetlands_present, wetlands_type, wetlands_source, wetlands_confidence,
                flood_zone, flood_severity, flood_in_sfha, flood_source, flood_confidence,
                slope_percent, slope_severity, slope_source, slope_confidence,
                road_has_access, road_distance_m, road_source, road_confidence,
                protected_is, protected_kind, protected_source, protected_confidence,
                landlocked, overall_risk, processing_seconds, error, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27
            )",
            params![
                result.property_id,
                result.wetlands.present,
                result.wetlands.wetland_type,
                result.wetlands.source,
                result.wetlands.confidence.as_str(),
                result.flood.zone,
                result.flood.severity.as_str(),
                result.flood.in_sfha,
                result.flood.source,
                result.flood.confidence.as_str(),
                result.slope.percent,
                result.slope.severity.as_str(),
                result.slope.source,
                result.slope.confidence.as_str(),
                result.road_access.has_access,
                result.road_access.distance_m,
                result.road_access.source,
                result.road_access.confidence.as_str(),
                result.protected.is_protected,
                result.protected.kind,
                result.protected.source,
                result.protected.confidence.as_str(),
                derived,
                result.overall_risk.as_str(),
                result.processing_seconds,
                result.error,
                updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Loads the risk result for a property, if any.
pub fn find_by_property(
    db: &Database,
    property_id: &str,
) -> Result<Option<RiskResult>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM risk_results WHERE property_id = ?1")?;
        let mut rows = stmt.query_map(params![property_id], from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
