//! AI analysis result repository.
//!
//! Detection lists (power line sightings, score factors) are stored as JSON
//! text columns; everything scalar gets its own column so summary queries
//! stay cheap.

use rusqlite::{params, Row};

use crate::model::{
    AiAnalysisResult, AiRiskScore, ConditionDetection, ImageRef, PowerLineSighting,
    PropertyCondition, RiskLevel, RoadConditionDetection, RoadSurface, StructureDetection,
};

use super::{Database, DatabaseError};

fn json_column<T: serde::de::DeserializeOwned>(
    raw: &str,
    table: &'static str,
) -> Result<T, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| DatabaseError::CorruptRow {
        table,
        reason: e.to_string(),
    })
}

fn image_ref(url: Option<String>, provider: Option<String>) -> Option<ImageRef> {
    match (url, provider) {
        (Some(url), Some(provider)) => Some(ImageRef { url, provider }),
        _ => None,
    }
}

fn from_row(row: &Row<'_>) -> Result<AiAnalysisResult, rusqlite::Error> {
    let road_condition = match row.get::<_, Option<String>>("road_surface")? {
        Some(raw) => {
            let surface = RoadSurface::parse(&raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    format!("unknown road surface '{}'", raw).into(),
                )
            })?;
            Some(RoadConditionDetection {
                surface,
                confidence: row.get::<_, Option<f64>>("road_confidence")?.unwrap_or(0.0),
            })
        }
        None => None,
    };

    let structures = row
        .get::<_, Option<u32>>("structures_count")?
        .map(|count| -> Result<StructureDetection, rusqlite::Error> {
            Ok(StructureDetection {
                count,
                density: row.get("structures_density")?,
                confidence: row
                    .get::<_, Option<f64>>("structures_confidence")?
                    .unwrap_or(0.0),
            })
        })
        .transpose()?;

    let condition = match row.get::<_, Option<String>>("condition")? {
        Some(raw) => {
            let condition = PropertyCondition::parse(&raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    format!("unknown property condition '{}'", raw).into(),
                )
            })?;
            Some(ConditionDetection {
                condition,
                confidence: row
                    .get::<_, Option<f64>>("condition_confidence")?
                    .unwrap_or(0.0),
            })
        }
        None => None,
    };

    let factors_raw: String = row.get("ai_factors")?;
    let ai_risk = match row.get::<_, Option<String>>("ai_risk_level")? {
        Some(raw) => {
            let level = RiskLevel::parse(&raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    format!("unknown risk level '{}'", raw).into(),
                )
            })?;
            let factors: Vec<String> = serde_json::from_str(&factors_raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    e.to_string().into(),
                )
            })?;
            Some(AiRiskScore {
                level,
                score: row.get::<_, Option<f64>>("ai_score")?.unwrap_or(0.0),
                confidence: row.get::<_, Option<f64>>("ai_confidence")?.unwrap_or(0.0),
                factors,
            })
        }
        None => None,
    };

    let power_lines_raw: String = row.get("power_lines")?;
    let power_lines: Vec<PowerLineSighting> =
        serde_json::from_str(&power_lines_raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        })?;

    Ok(AiAnalysisResult {
        property_id: row.get("property_id")?,
        satellite: image_ref(row.get("satellite_url")?, row.get("satellite_provider")?),
        street: image_ref(row.get("street_url")?, row.get("street_provider")?),
        road_condition,
        power_lines,
        structures,
        condition,
        ai_risk,
        model_version: row.get("model_version")?,
        processing_seconds: row.get("processing_seconds")?,
        error: row.get("error")?,
    })
}

/// Inserts or overwrites the AI analysis result for a property.
pub fn upsert(
    db: &Database,
    result: &AiAnalysisResult,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    let power_lines =
        serde_json::to_string(&result.power_lines).map_err(|e| DatabaseError::CorruptRow {
            table: "ai_results",
            reason: e.to_string(),
        })?;
    let factors = match &result.ai_risk {
        Some(risk) => {
            serde_json::to_string(&risk.factors).map_err(|e| DatabaseError::CorruptRow {
                table: "ai_results",
                reason: e.to_string(),
            })?
        }
        None => "[]".to_string(),
    };

    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR REPLACE INTO ai_results (
                property_id, satellite_url, satellite_provider, street_url, street_provider,
                road_surface, road_confidence, power_lines,
                structures_count, structures_density, structures_confidence,
                condition, condition_confidence,
                ai_risk_level, ai_score, ai_confidence, ai_factors,
                model_version, processing_seconds, error, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21
            )",
            params![
                result.property_id,
                result.satellite.as_ref().map(|i| i.url.clone()),
                result.satellite.as_ref().map(|i| i.provider.clone()),
                result.street.as_ref().map(|i| i.url.clone()),
                result.street.as_ref().map(|i| i.provider.clone()),
                result.road_condition.as_ref().map(|r| r.surface.as_str()),
                result.road_condition.as_ref().map(|r| r.confidence),
                power_lines,
                result.structures.as_ref().map(|s| s.count),
                result.structures.as_ref().and_then(|s| s.density.clone()),
                result.structures.as_ref().map(|s| s.confidence),
                result.condition.as_ref().map(|c| c.condition.as_str()),
                result.condition.as_ref().map(|c| c.confidence),
                result.ai_risk.as_ref().map(|r| r.level.as_str()),
                result.ai_risk.as_ref().map(|r| r.score),
                result.ai_risk.as_ref().map(|r| r.confidence),
                factors,
                result.model_version,
                result.processing_seconds,
                result.error,
                updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Loads the AI analysis result for a property, if any.
pub fn find_by_property(
    db: &Database,
    property_id: &str,
) -> Result<Option<AiAnalysisResult>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM ai_results WHERE property_id = ?1")?;
        let mut rows = stmt.query_map(params![property_id], from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::{self, JobRow};
    use crate::db::property_repo::{self, PropertyRow};
    use crate::model::{PowerLinePosition, PropertyInput};

    const TS: &str = "2026-01-01T00:00:00Z";

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn setup_property(db: &Database) -> String {
        let job = JobRow::new(1, TS);
        job_repo::insert(db, &job).unwrap();
        let input = PropertyInput {
            street: "5 Pine Ln".to_string(),
            city: "Boone".to_string(),
            state: "NC".to_string(),
            postal_code: "28607".to_string(),
            contact_id: None,
            owner_name: None,
        };
        let row = PropertyRow::new(&job.id, &input, TS);
        property_repo::insert_batch(db, std::slice::from_ref(&row)).unwrap();
        row.id
    }

    fn sample_result(property_id: &str) -> AiAnalysisResult {
        AiAnalysisResult {
            property_id: property_id.to_string(),
            satellite: Some(ImageRef {
                url: "https://img.example/sat.png".to_string(),
                provider: "mapbox".to_string(),
            }),
            street: Some(ImageRef {
                url: "https://img.example/street.jpg".to_string(),
                provider: "mapillary".to_string(),
            }),
            road_condition: Some(RoadConditionDetection {
                surface: RoadSurface::Dirt,
                confidence: 0.85,
            }),
            power_lines: vec![PowerLineSighting {
                visible: true,
                position: PowerLinePosition::Nearby,
                line_type: Some("distribution".to_string()),
                confidence: 0.7,
                distance_m: Some(25.0),
            }],
            structures: Some(StructureDetection {
                count: 0,
                density: Some("none".to_string()),
                confidence: 0.9,
            }),
            condition: Some(ConditionDetection {
                condition: PropertyCondition::Overgrown,
                confidence: 0.6,
            }),
            ai_risk: Some(AiRiskScore {
                level: RiskLevel::High,
                score: 70.0,
                confidence: 0.76,
                factors: vec!["dirt road".to_string(), "no structures".to_string()],
            }),
            model_version: "gpt-4o".to_string(),
            processing_seconds: 8.2,
            error: None,
        }
    }

    #[test]
    fn test_upsert_and_find() {
        let db = test_db();
        let pid = setup_property(&db);

        upsert(&db, &sample_result(&pid), TS).unwrap();

        let found = find_by_property(&db, &pid).unwrap().unwrap();
        assert_eq!(found.road_condition.as_ref().unwrap().surface, RoadSurface::Dirt);
        assert_eq!(found.power_lines.len(), 1);
        assert_eq!(found.power_lines[0].position, PowerLinePosition::Nearby);
        assert_eq!(found.structures.as_ref().unwrap().count, 0);
        let risk = found.ai_risk.as_ref().unwrap();
        assert_eq!(risk.level, RiskLevel::High);
        assert_eq!(risk.factors.len(), 2);
        assert_eq!(found.satellite.as_ref().unwrap().provider, "mapbox");
    }

    #[test]
    fn test_upsert_overwrites() {
        let db = test_db();
        let pid = setup_property(&db);

        upsert(&db, &sample_result(&pid), TS).unwrap();
        let failed = AiAnalysisResult::failed(&pid, "gpt-4o", "vision timeout".to_string());
        upsert(&db, &failed, TS).unwrap();

        let found = find_by_property(&db, &pid).unwrap().unwrap();
        assert!(found.road_condition.is_none());
        assert!(found.ai_risk.is_none());
        assert_eq!(found.error.as_deref(), Some("vision timeout"));
    }

    #[test]
    fn test_failed_shell_round_trips() {
        let db = test_db();
        let pid = setup_property(&db);

        let failed = AiAnalysisResult::failed(&pid, "gpt-4o", "malformed payload".to_string());
        upsert(&db, &failed, TS).unwrap();

        let found = find_by_property(&db, &pid).unwrap().unwrap();
        assert!(found.power_lines.is_empty());
        assert!(found.satellite.is_none());
        assert_eq!(found.model_version, "gpt-4o");
    }
}
