//! Deterministic risk aggregation.
//!
//! Two signals short-circuit to HIGH before any scoring: a high-severity
//! flood zone, and a landlocked parcel (no road access). Everything else is
//! additive with fixed weights and banded:
//!
//!   wetlands present +2, flood MEDIUM +2, slope HIGH +2, slope MEDIUM +1,
//!   protected land +2; 0-2 LOW, 3-4 MEDIUM, 5+ HIGH.
//!
//! Same inputs always produce the same verdict; there is no randomness and
//! no clock in here.

use crate::model::{
    FloodSignal, ProtectedLandSignal, RiskLevel, RoadAccessSignal, Severity, SlopeSignal,
    WetlandsSignal,
};

const WEIGHT_WETLANDS: u32 = 2;
const WEIGHT_FLOOD_MEDIUM: u32 = 2;
const WEIGHT_SLOPE_HIGH: u32 = 2;
const WEIGHT_SLOPE_MEDIUM: u32 = 1;
const WEIGHT_PROTECTED: u32 = 2;

const MEDIUM_BAND_START: u32 = 3;
const HIGH_BAND_START: u32 = 5;

/// Landlocked is always derived from the road signal, never stored
/// independently.
pub fn derive_landlocked(road: &RoadAccessSignal) -> bool {
    !road.has_access
}

/// Additive score for the non-short-circuit factors.
pub fn additive_score(
    wetlands: &WetlandsSignal,
    flood: &FloodSignal,
    slope: &SlopeSignal,
    protected: &ProtectedLandSignal,
) -> u32 {
    let mut score = 0;

    if wetlands.present {
        score += WEIGHT_WETLANDS;
    }
    if flood.severity == Severity::Medium {
        score += WEIGHT_FLOOD_MEDIUM;
    }
    match slope.severity {
        Severity::High => score += WEIGHT_SLOPE_HIGH,
        Severity::Medium => score += WEIGHT_SLOPE_MEDIUM,
        Severity::Low => {}
    }
    if protected.is_protected {
        score += WEIGHT_PROTECTED;
    }

    score
}

/// Overall verdict for one property.
pub fn overall_risk(
    wetlands: &WetlandsSignal,
    flood: &FloodSignal,
    slope: &SlopeSignal,
    road: &RoadAccessSignal,
    protected: &ProtectedLandSignal,
) -> RiskLevel {
    // Precedence rules come first; no amount of benign signals can
    // average these away.
    if flood.severity == Severity::High {
        return RiskLevel::High;
    }
    if derive_landlocked(road) {
        return RiskLevel::High;
    }

    let score = additive_score(wetlands, flood, slope, protected);
    if score >= HIGH_BAND_START {
        RiskLevel::High
    } else if score >= MEDIUM_BAND_START {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Confidence;

    fn wetlands(present: bool) -> WetlandsSignal {
        WetlandsSignal {
            present,
            wetland_type: None,
            source: "nwi".to_string(),
            confidence: Confidence::High,
        }
    }

    fn flood(severity: Severity) -> FloodSignal {
        FloodSignal {
            zone: match severity {
                Severity::High => "AE",
                Severity::Medium => "X500",
                Severity::Low => "X",
            }
            .to_string(),
            severity,
            in_sfha: severity == Severity::High,
            source: "fema-nfhl".to_string(),
            confidence: Confidence::High,
        }
    }

    fn slope(severity: Severity) -> SlopeSignal {
        SlopeSignal {
            percent: match severity {
                Severity::High => 20.0,
                Severity::Medium => 10.0,
                Severity::Low => 2.0,
            },
            severity,
            source: "usgs-epqs".to_string(),
            confidence: Confidence::High,
        }
    }

    fn road(has_access: bool) -> RoadAccessSignal {
        RoadAccessSignal {
            has_access,
            distance_m: if has_access { 50.0 } else { 999_999.0 },
            source: "overpass".to_string(),
            confidence: Confidence::High,
        }
    }

    fn protected(is_protected: bool) -> ProtectedLandSignal {
        ProtectedLandSignal {
            is_protected,
            kind: None,
            source: "pad-us".to_string(),
            confidence: Confidence::High,
        }
    }

    #[test]
    fn test_all_clear_is_low() {
        let risk = overall_risk(
            &wetlands(false),
            &flood(Severity::Low),
            &slope(Severity::Low),
            &road(true),
            &protected(false),
        );
        assert_eq!(risk, RiskLevel::Low);
    }

    #[test]
    fn test_flood_high_short_circuits() {
        // Every other signal benign, still HIGH.
        let risk = overall_risk(
            &wetlands(false),
            &flood(Severity::High),
            &slope(Severity::Low),
            &road(true),
            &protected(false),
        );
        assert_eq!(risk, RiskLevel::High);
    }

    #[test]
    fn test_landlocked_short_circuits() {
        let risk = overall_risk(
            &wetlands(false),
            &flood(Severity::Low),
            &slope(Severity::Low),
            &road(false),
            &protected(false),
        );
        assert_eq!(risk, RiskLevel::High);
    }

    #[test]
    fn test_band_boundary_two_vs_three() {
        // Wetlands alone: score 2, LOW.
        assert_eq!(
            overall_risk(
                &wetlands(true),
                &flood(Severity::Low),
                &slope(Severity::Low),
                &road(true),
                &protected(false),
            ),
            RiskLevel::Low
        );

        // Wetlands + medium slope: score 3, MEDIUM.
        assert_eq!(
            overall_risk(
                &wetlands(true),
                &flood(Severity::Low),
                &slope(Severity::Medium),
                &road(true),
                &protected(false),
            ),
            RiskLevel::Medium
        );
    }

    #[test]
    fn test_wetlands_plus_medium_flood_is_medium() {
        // Score 4: top of the MEDIUM band.
        let risk = overall_risk(
            &wetlands(true),
            &flood(Severity::Medium),
            &slope(Severity::Low),
            &road(true),
            &protected(false),
        );
        assert_eq!(risk, RiskLevel::Medium);
    }

    #[test]
    fn test_additive_high_band() {
        // Wetlands 2 + medium flood 2 + medium slope 1 = 5: HIGH.
        let risk = overall_risk(
            &wetlands(true),
            &flood(Severity::Medium),
            &slope(Severity::Medium),
            &road(true),
            &protected(false),
        );
        assert_eq!(risk, RiskLevel::High);
    }

    #[test]
    fn test_additive_score_weights() {
        assert_eq!(
            additive_score(
                &wetlands(true),
                &flood(Severity::Medium),
                &slope(Severity::High),
                &protected(true),
            ),
            2 + 2 + 2 + 2
        );
        assert_eq!(
            additive_score(
                &wetlands(false),
                &flood(Severity::Low),
                &slope(Severity::Medium),
                &protected(false),
            ),
            1
        );
    }

    #[test]
    fn test_degraded_defaults_score_low() {
        // All lookups failed: every default is its lowest-risk value, so the
        // verdict must be LOW, only flagged by the Low confidences.
        let risk = overall_risk(
            &WetlandsSignal::unverified(),
            &FloodSignal::unverified(),
            &SlopeSignal::unverified(),
            &RoadAccessSignal::unverified(),
            &ProtectedLandSignal::unverified(),
        );
        assert_eq!(risk, RiskLevel::Low);
    }

    #[test]
    fn test_derive_landlocked() {
        assert!(!derive_landlocked(&road(true)));
        assert!(derive_landlocked(&road(false)));
    }

    #[test]
    fn test_determinism() {
        let w = wetlands(true);
        let f = flood(Severity::Medium);
        let s = slope(Severity::Medium);
        let r = road(true);
        let p = protected(false);
        let first = overall_risk(&w, &f, &s, &r, &p);
        for _ in 0..10 {
            assert_eq!(overall_risk(&w, &f, &s, &r, &p), first);
        }
    }
}
