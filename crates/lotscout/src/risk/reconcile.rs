//! GIS vs AI road access reconciliation.
//!
//! Street-level imagery sometimes contradicts the map: a paved driveway
//! where the road graph shows nothing, or no road in sight where the map
//! claims one 40 m away. When the vision model is confident enough, its
//! verdict overrides the GIS road signal. The override rewrites only the
//! road signal; `landlocked` and `overall_risk` are then re-derived through
//! the engine so the stored row can never hold a stale verdict.

use crate::model::{AiAnalysisResult, Confidence, RiskResult, RoadSurface};

use super::engine;

/// GIS distance beyond which a confident `Unknown` road detection is taken
/// to mean the mapped road is not actually usable frontage.
const UNKNOWN_SURFACE_DISTANCE_M: f64 = 100.0;

const OVERRIDE_DISTANCE_PAVED_M: f64 = 30.0;
const OVERRIDE_DISTANCE_UNPAVED_M: f64 = 50.0;

/// Folds a property's AI analysis into its GIS risk result.
///
/// Returns the result unchanged when there is no road detection or its
/// confidence is below `threshold`.
pub fn reconcile(mut risk: RiskResult, ai: &AiAnalysisResult, threshold: f64) -> RiskResult {
    let Some(road) = &ai.road_condition else {
        return risk;
    };
    if road.confidence < threshold {
        return risk;
    }

    let overridden = match road.surface {
        RoadSurface::Paved if !risk.road_access.has_access => {
            risk.road_access.has_access = true;
            risk.road_access.distance_m = OVERRIDE_DISTANCE_PAVED_M;
            Some("paved road visible in imagery")
        }
        RoadSurface::Dirt | RoadSurface::Gravel if !risk.road_access.has_access => {
            risk.road_access.has_access = true;
            risk.road_access.distance_m = OVERRIDE_DISTANCE_UNPAVED_M;
            Some("unpaved road visible in imagery")
        }
        RoadSurface::Unknown
            if risk.road_access.has_access
                && risk.road_access.distance_m > UNKNOWN_SURFACE_DISTANCE_M =>
        {
            risk.road_access.has_access = false;
            Some("no usable road visible in imagery")
        }
        _ => None,
    };

    if let Some(reason) = overridden {
        risk.road_access.source = format!("ai-override: {}", reason);
        risk.road_access.confidence = Confidence::from_score(road.confidence);
        risk.landlocked = engine::derive_landlocked(&risk.road_access);
        risk.overall_risk = engine::overall_risk(
            &risk.wetlands,
            &risk.flood,
            &risk.slope,
            &risk.road_access,
            &risk.protected,
        );
    }

    risk
}
