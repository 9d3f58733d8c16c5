//! Address geocoding against a structured (census-style) endpoint with a
//! free-text (nominatim-style) fallback.
//!
//! The structured geocoder is authoritative when it matches (HIGH accuracy);
//! the free-text fallback interpolates and gets MEDIUM. A clean miss on both
//! is `Ok(None)` — the caller treats it as a property-level failure, not an
//! infrastructure one.

use log::debug;
use serde::Deserialize;

use crate::model::{Confidence, GeocodedAddress, PropertyInput};

use super::{AdapterError, GeocodeProvider};

pub struct HttpGeocoder {
    client: reqwest::blocking::Client,
    primary_url: String,
    fallback_url: String,
}

impl HttpGeocoder {
    pub fn new(client: reqwest::blocking::Client, primary_url: &str, fallback_url: &str) -> Self {
        Self {
            client,
            primary_url: primary_url.to_string(),
            fallback_url: fallback_url.to_string(),
        }
    }

    fn query_primary(&self, input: &PropertyInput) -> Result<Option<GeocodedAddress>, AdapterError> {
        let response = self
            .client
            .get(&self.primary_url)
            .query(&[
                ("address", input.one_line().as_str()),
                ("benchmark", "Public_AR_Current"),
                ("vintage", "Current_Current"),
                ("format", "json"),
            ])
            .send()?;

        if !response.status().is_success() {
            return Err(AdapterError::from_status(response.status(), "geocode primary"));
        }

        let body = response.text()?;
        parse_structured_response(&body)
    }

    fn query_fallback(&self, input: &PropertyInput) -> Result<Option<GeocodedAddress>, AdapterError> {
        let response = self
            .client
            .get(&self.fallback_url)
            .query(&[
                ("q", input.one_line().as_str()),
                ("format", "json"),
                ("limit", "1"),
                ("addressdetails", "1"),
            ])
            .send()?;

        if !response.status().is_success() {
            return Err(AdapterError::from_status(response.status(), "geocode fallback"));
        }

        let body = response.text()?;
        parse_freetext_response(&body)
    }
}

impl GeocodeProvider for HttpGeocoder {
    fn geocode(&self, input: &PropertyInput) -> Result<Option<GeocodedAddress>, AdapterError> {
        validate_input(input)?;

        if let Some(geocoded) = self.query_primary(input)? {
            return Ok(Some(geocoded));
        }

        debug!(
            "Primary geocoder found no match for '{}', trying fallback",
            input.one_line()
        );
        self.query_fallback(input)
    }
}

fn validate_input(input: &PropertyInput) -> Result<(), AdapterError> {
    if input.street.trim().is_empty() {
        return Err(AdapterError::Validation("street is empty".to_string()));
    }
    if input.city.trim().is_empty() && input.postal_code.trim().is_empty() {
        return Err(AdapterError::Validation(
            "need at least a city or a postal code".to_string(),
        ));
    }
    Ok(())
}

// Census-style response shapes.

#[derive(Debug, Deserialize)]
struct StructuredResponse {
    result: StructuredResult,
}

#[derive(Debug, Deserialize)]
struct StructuredResult {
    #[serde(rename = "addressMatches", default)]
    address_matches: Vec<AddressMatch>,
}

#[derive(Debug, Deserialize)]
struct AddressMatch {
    coordinates: Coordinates,
    #[serde(default)]
    geographies: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Coordinates {
    /// Longitude.
    x: f64,
    /// Latitude.
    y: f64,
}

/// Parses a census-style structured geocoder payload.
pub(crate) fn parse_structured_response(
    body: &str,
) -> Result<Option<GeocodedAddress>, AdapterError> {
    let parsed: StructuredResponse = serde_json::from_str(body)
        .map_err(|e| AdapterError::Fatal(format!("Malformed geocoder payload: {}", e)))?;

    let Some(m) = parsed.result.address_matches.into_iter().next() else {
        return Ok(None);
    };

    // County rides along in the optional geographies block.
    let county = m
        .geographies
        .as_ref()
        .and_then(|g| g.get("Counties"))
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("NAME"))
        .and_then(|n| n.as_str())
        .map(|s| s.to_string());

    Ok(Some(GeocodedAddress {
        latitude: m.coordinates.y,
        longitude: m.coordinates.x,
        county,
        accuracy: Confidence::High,
        source: "census".to_string(),
    }))
}

// Nominatim-style response shapes.

#[derive(Debug, Deserialize)]
struct FreetextHit {
    lat: String,
    lon: String,
    #[serde(default)]
    address: Option<FreetextAddress>,
}

#[derive(Debug, Deserialize)]
struct FreetextAddress {
    #[serde(default)]
    county: Option<String>,
}

/// Parses a nominatim-style free-text geocoder payload.
pub(crate) fn parse_freetext_response(
    body: &str,
) -> Result<Option<GeocodedAddress>, AdapterError> {
    let hits: Vec<FreetextHit> = serde_json::from_str(body)
        .map_err(|e| AdapterError::Fatal(format!("Malformed geocoder payload: {}", e)))?;

    let Some(hit) = hits.into_iter().next() else {
        return Ok(None);
    };

    let latitude: f64 = hit
        .lat
        .parse()
        .map_err(|_| AdapterError::Fatal(format!("Non-numeric latitude '{}'", hit.lat)))?;
    let longitude: f64 = hit
        .lon
        .parse()
        .map_err(|_| AdapterError::Fatal(format!("Non-numeric longitude '{}'", hit.lon)))?;

    Ok(Some(GeocodedAddress {
        latitude,
        longitude,
        county: hit.address.and_then(|a| a.county),
        accuracy: Confidence::Medium,
        source: "nominatim".to_string(),
    }))
}
