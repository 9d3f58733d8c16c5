//! GIS point lookups: flood zone, wetlands, slope, road access and
//! protected land.
//!
//! All five queries are independent point-in-polygon or proximity lookups
//! against public feature services. Classification logic (zone codes, slope
//! bands, distance thresholds) is kept in free functions so it can be tested
//! without any HTTP.

use serde::Deserialize;

use crate::model::{
    Confidence, FloodSignal, ProtectedLandSignal, RoadAccessSignal, Severity, SlopeSignal,
    WetlandsSignal,
};

use super::{AdapterError, GisProvider};

/// Offset between elevation sample points, roughly 11 m at mid latitudes.
const SLOPE_SAMPLE_OFFSET_DEG: f64 = 0.0001;
const METERS_PER_DEGREE: f64 = 111_000.0;

/// Distance recorded when no road exists within the search radius.
const NO_ROAD_DISTANCE_M: f64 = 999_999.0;

/// Flood zones that put a parcel in the high-risk band outright.
const HIGH_RISK_ZONES: &[&str] = &["A", "AE", "AH", "AO", "A99", "AR", "V", "VE"];

pub struct GisUrls {
    pub flood_url: String,
    pub wetlands_url: String,
    pub elevation_url: String,
    pub roads_url: String,
    pub protected_url: String,
}

pub struct HttpGisProvider {
    client: reqwest::blocking::Client,
    urls: GisUrls,
    road_distance_threshold_m: f64,
}

impl HttpGisProvider {
    pub fn new(
        client: reqwest::blocking::Client,
        urls: GisUrls,
        road_distance_threshold_m: f64,
    ) -> Self {
        Self {
            client,
            urls,
            road_distance_threshold_m,
        }
    }

    /// Issues an ArcGIS-style point intersection query and returns the
    /// feature attributes.
    fn query_features(
        &self,
        url: &str,
        lat: f64,
        lon: f64,
        out_fields: &str,
        context: &str,
    ) -> Result<Vec<serde_json::Value>, AdapterError> {
        let geometry = format!("{},{}", lon, lat);
        let response = self
            .client
            .get(url)
            .query(&[
                ("geometry", geometry.as_str()),
                ("geometryType", "esriGeometryPoint"),
                ("inSR", "4326"),
                ("spatialRel", "esriSpatialRelIntersects"),
                ("outFields", out_fields),
                ("returnGeometry", "false"),
                ("f", "json"),
            ])
            .send()?;

        if !response.status().is_success() {
            return Err(AdapterError::from_status(response.status(), context));
        }

        let body = response.text()?;
        let parsed: FeatureResponse = serde_json::from_str(&body)
            .map_err(|e| AdapterError::Fatal(format!("Malformed {} payload: {}", context, e)))?;
        Ok(parsed
            .features
            .into_iter()
            .map(|f| f.attributes)
            .collect())
    }

    fn elevation_at(&self, lat: f64, lon: f64) -> Result<f64, AdapterError> {
        let response = self
            .client
            .get(&self.urls.elevation_url)
            .query(&[
                ("x", lon.to_string().as_str()),
                ("y", lat.to_string().as_str()),
                ("units", "Meters"),
                ("output", "json"),
            ])
            .send()?;

        if !response.status().is_success() {
            return Err(AdapterError::from_status(response.status(), "elevation"));
        }

        let body = response.text()?;
        let parsed: ElevationResponse = serde_json::from_str(&body)
            .map_err(|e| AdapterError::Fatal(format!("Malformed elevation payload: {}", e)))?;
        Ok(parsed.value)
    }
}

impl GisProvider for HttpGisProvider {
    fn flood_zone(&self, lat: f64, lon: f64) -> Result<FloodSignal, AdapterError> {
        let attrs = self.query_features(
            &self.urls.flood_url,
            lat,
            lon,
            "FLD_ZONE,ZONE_SUBTY,SFHA_TF",
            "flood zone",
        )?;

        // No intersecting flood polygon is a verified minimal-hazard result,
        // not a degraded one.
        let Some(attr) = attrs.first() else {
            return Ok(FloodSignal {
                zone: "X".to_string(),
                severity: Severity::Low,
                in_sfha: false,
                source: "fema-nfhl".to_string(),
                confidence: Confidence::High,
            });
        };

        let zone = attr
            .get("FLD_ZONE")
            .and_then(|v| v.as_str())
            .unwrap_or("X")
            .to_string();
        let subtype = attr.get("ZONE_SUBTY").and_then(|v| v.as_str()).unwrap_or("");
        let in_sfha = attr
            .get("SFHA_TF")
            .and_then(|v| v.as_str())
            .map(|s| s.eq_ignore_ascii_case("T"))
            .unwrap_or(false);

        Ok(FloodSignal {
            severity: classify_flood_zone(&zone, subtype, in_sfha),
            zone,
            in_sfha,
            source: "fema-nfhl".to_string(),
            confidence: Confidence::High,
        })
    }

    fn wetlands(&self, lat: f64, lon: f64) -> Result<WetlandsSignal, AdapterError> {
        let attrs = self.query_features(
            &self.urls.wetlands_url,
            lat,
            lon,
            "WETLAND_TYPE",
            "wetlands",
        )?;

        let wetland_type = attrs
            .first()
            .and_then(|a| a.get("WETLAND_TYPE"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(WetlandsSignal {
            present: !attrs.is_empty(),
            wetland_type,
            source: "nwi".to_string(),
            confidence: Confidence::High,
        })
    }

    fn slope(&self, lat: f64, lon: f64) -> Result<SlopeSignal, AdapterError> {
        let center = self.elevation_at(lat, lon)?;
        let north = self.elevation_at(lat + SLOPE_SAMPLE_OFFSET_DEG, lon)?;
        let east = self.elevation_at(lat, lon + SLOPE_SAMPLE_OFFSET_DEG)?;

        let percent = slope_percent(center, north, east);
        Ok(SlopeSignal {
            percent,
            severity: classify_slope(percent),
            source: "usgs-epqs".to_string(),
            confidence: Confidence::High,
        })
    }

    fn road_access(&self, lat: f64, lon: f64) -> Result<RoadAccessSignal, AdapterError> {
        let query = format!(
            "[out:json];way(around:{},{},{})[highway];out geom;",
            self.road_distance_threshold_m, lat, lon
        );
        let response = self
            .client
            .post(&self.urls.roads_url)
            .form(&[("data", query.as_str())])
            .send()?;

        if !response.status().is_success() {
            return Err(AdapterError::from_status(response.status(), "road access"));
        }

        let body = response.text()?;
        let parsed: OverpassResponse = serde_json::from_str(&body)
            .map_err(|e| AdapterError::Fatal(format!("Malformed road payload: {}", e)))?;

        Ok(road_signal_from_ways(
            lat,
            lon,
            &parsed.elements,
            self.road_distance_threshold_m,
        ))
    }

    fn protected_land(&self, lat: f64, lon: f64) -> Result<ProtectedLandSignal, AdapterError> {
        let attrs = self.query_features(
            &self.urls.protected_url,
            lat,
            lon,
            "Unit_Nm,Des_Tp",
            "protected land",
        )?;

        let kind = attrs
            .first()
            .and_then(|a| a.get("Des_Tp").or_else(|| a.get("Unit_Nm")))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(ProtectedLandSignal {
            is_protected: !attrs.is_empty(),
            kind,
            source: "pad-us".to_string(),
            confidence: Confidence::High,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FeatureResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    attributes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    value: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverpassResponse {
    #[serde(default)]
    pub(crate) elements: Vec<OverpassWay>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverpassWay {
    #[serde(default)]
    pub(crate) geometry: Vec<OverpassPoint>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverpassPoint {
    pub(crate) lat: f64,
    pub(crate) lon: f64,
}

/// Maps a flood zone code (plus subtype and SFHA flag) to a severity band.
pub(crate) fn classify_flood_zone(zone: &str, subtype: &str, in_sfha: bool) -> Severity {
    let zone_upper = zone.trim().to_ascii_uppercase();

    if HIGH_RISK_ZONES.contains(&zone_upper.as_str())
        || zone_upper.starts_with("A ")
        || zone_upper.starts_with("V ")
        || in_sfha
    {
        return Severity::High;
    }

    let subtype_upper = subtype.trim().to_ascii_uppercase();
    if zone_upper == "B"
        || zone_upper == "X500"
        || subtype_upper.contains("0.2 PCT")
        || subtype_upper.contains("SHADED")
    {
        return Severity::Medium;
    }

    Severity::Low
}

/// Percent grade from a center elevation and two offset samples.
pub(crate) fn slope_percent(center: f64, north: f64, east: f64) -> f64 {
    let run = SLOPE_SAMPLE_OFFSET_DEG * METERS_PER_DEGREE;
    let rise = (north - center).abs().max((east - center).abs());
    rise / run * 100.0
}

/// Slope bands: >15% HIGH, >8% MEDIUM.
pub(crate) fn classify_slope(percent: f64) -> Severity {
    if percent > 15.0 {
        Severity::High
    } else if percent > 8.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Builds the road access signal from the returned way geometries.
pub(crate) fn road_signal_from_ways(
    lat: f64,
    lon: f64,
    ways: &[OverpassWay],
    threshold_m: f64,
) -> RoadAccessSignal {
    let min_distance = ways
        .iter()
        .flat_map(|w| w.geometry.iter())
        .map(|p| haversine_m(lat, lon, p.lat, p.lon))
        .fold(f64::INFINITY, f64::min);

    if min_distance.is_finite() {
        RoadAccessSignal {
            has_access: min_distance <= threshold_m,
            distance_m: min_distance,
            source: "overpass".to_string(),
            confidence: Confidence::High,
        }
    } else {
        // Verified absence: the query covered the search radius and found
        // nothing.
        RoadAccessSignal {
            has_access: false,
            distance_m: NO_ROAD_DISTANCE_M,
            source: "overpass".to_string(),
            confidence: Confidence::High,
        }
    }
}

/// Great-circle distance in meters.
pub(crate) fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}
