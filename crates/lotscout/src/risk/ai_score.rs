//! AI imagery risk scoring.
//!
//! Weights follow the road surface and utility-proximity model: unpaved and
//! degraded roads dominate, power line weight depends on position relative
//! to the parcel (close in front outweighs directly above: lines at the
//! road frontage complicate access and frontage work, lines crossing
//! overhead usually just mean an easement), an empty parcel adds remoteness
//! risk. Absence of power lines is policy-dependent.

use crate::config::PowerLinePolicy;
use crate::model::{
    AiRiskScore, ConditionDetection, PowerLinePosition, PowerLineSighting, PropertyCondition,
    RiskLevel, RoadConditionDetection, RoadSurface, StructureDetection,
};

const SCORE_ROAD_DIRT: f64 = 30.0;
const SCORE_ROAD_POOR: f64 = 25.0;
const SCORE_ROAD_GRAVEL: f64 = 20.0;

const SCORE_LINES_IN_FRONT_CLOSE: f64 = 30.0;
const SCORE_LINES_NEARBY: f64 = 20.0;
const SCORE_LINES_ABOVE_OR_FAR: f64 = 10.0;
const BONUS_NO_LINES: f64 = -10.0;
const SCORE_NO_LINES_AS_RISK: f64 = 15.0;

const SCORE_NO_STRUCTURES: f64 = 20.0;
const SCORE_OVERGROWN: f64 = 10.0;

const HIGH_THRESHOLD: f64 = 50.0;
const MEDIUM_THRESHOLD: f64 = 25.0;

/// Scores one property's detections into an `AiRiskScore`.
pub fn score_ai(
    road: Option<&RoadConditionDetection>,
    power_lines: &[PowerLineSighting],
    structures: Option<&StructureDetection>,
    condition: Option<&ConditionDetection>,
    policy: PowerLinePolicy,
) -> AiRiskScore {
    let mut score = 0.0;
    let mut factors = Vec::new();
    let mut confidences = Vec::new();

    if let Some(road) = road {
        let (points, label) = match road.surface {
            RoadSurface::Dirt => (SCORE_ROAD_DIRT, Some("dirt road access")),
            RoadSurface::Poor => (SCORE_ROAD_POOR, Some("poorly maintained road")),
            RoadSurface::Gravel => (SCORE_ROAD_GRAVEL, Some("gravel road access")),
            RoadSurface::Paved | RoadSurface::Unknown => (0.0, None),
        };
        score += points;
        if let Some(label) = label {
            factors.push(label.to_string());
        }
        confidences.push(road.confidence);
    }

    let worst = worst_sighting(power_lines);
    match worst {
        Some(sighting) => {
            let (points, label) = match sighting.position {
                PowerLinePosition::InFrontClose => {
                    (SCORE_LINES_IN_FRONT_CLOSE, "power lines close in front")
                }
                PowerLinePosition::Nearby => (SCORE_LINES_NEARBY, "power lines nearby"),
                PowerLinePosition::DirectlyAbove => {
                    (SCORE_LINES_ABOVE_OR_FAR, "power lines directly above")
                }
                PowerLinePosition::Far => (SCORE_LINES_ABOVE_OR_FAR, "power lines in the distance"),
                PowerLinePosition::Absent => (0.0, ""),
            };
            if points > 0.0 {
                score += points;
                factors.push(label.to_string());
            }
            confidences.push(sighting.confidence);
        }
        None if !power_lines.is_empty() => {
            // Sightings exist but none saw lines.
            match policy {
                PowerLinePolicy::AbsenceIsBonus => {
                    score += BONUS_NO_LINES;
                    factors.push("no power lines visible".to_string());
                }
                PowerLinePolicy::AbsenceIsRisk => {
                    score += SCORE_NO_LINES_AS_RISK;
                    factors.push("no utility access visible".to_string());
                }
            }
            if let Some(max) = power_lines
                .iter()
                .map(|s| s.confidence)
                .fold(None::<f64>, |acc, c| Some(acc.map_or(c, |a| a.max(c))))
            {
                confidences.push(max);
            }
        }
        None => {}
    }

    if let Some(structures) = structures {
        if structures.count == 0 {
            score += SCORE_NO_STRUCTURES;
            factors.push("no structures on parcel".to_string());
        }
        confidences.push(structures.confidence);
    }

    if let Some(condition) = condition {
        if condition.condition == PropertyCondition::Overgrown {
            score += SCORE_OVERGROWN;
            factors.push("parcel overgrown".to_string());
        }
        confidences.push(condition.confidence);
    }

    let score = score.max(0.0);
    let level = if score >= HIGH_THRESHOLD {
        RiskLevel::High
    } else if score >= MEDIUM_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    AiRiskScore {
        level,
        score,
        confidence,
        factors,
    }
}

/// The highest-weight visible sighting across vantage points.
fn worst_sighting(sightings: &[PowerLineSighting]) -> Option<&PowerLineSighting> {
    sightings
        .iter()
        .filter(|s| s.visible && s.position != PowerLinePosition::Absent)
        .max_by_key(|s| match s.position {
            PowerLinePosition::InFrontClose => 3,
            PowerLinePosition::Nearby => 2,
            PowerLinePosition::DirectlyAbove | PowerLinePosition::Far => 1,
            PowerLinePosition::Absent => 0,
        })
}
