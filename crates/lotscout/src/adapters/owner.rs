//! Skip-trace (owner lookup) adapter.
//!
//! Posts the property address to a trace provider and maps the response to
//! an `OwnerRecord`. A `not_found` status is a real answer (`Ok(None)`),
//! not an error; compliance flags ride along so downstream outreach can
//! filter DNC-flagged contacts.

use serde::{Deserialize, Serialize};

use crate::model::{OwnerContact, OwnerRecord, PropertyInput};

use super::{AdapterError, OwnerLookupProvider};

pub struct HttpOwnerLookup {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpOwnerLookup {
    pub fn new(client: reqwest::blocking::Client, url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            url: url.to_string(),
            api_key,
        }
    }
}

impl OwnerLookupProvider for HttpOwnerLookup {
    fn lookup(&self, input: &PropertyInput) -> Result<Option<OwnerRecord>, AdapterError> {
        if input.street.trim().is_empty() {
            return Err(AdapterError::Validation("street is empty".to_string()));
        }

        let request = TraceRequest {
            street: input.street.clone(),
            city: input.city.clone(),
            state: input.state.clone(),
            zip: input.postal_code.clone(),
            owner_name: input.owner_name.clone(),
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }
        let response = builder.send()?;

        if !response.status().is_success() {
            return Err(AdapterError::from_status(response.status(), "skip trace"));
        }

        let body = response.text()?;
        parse_trace_response(&body)
    }
}

#[derive(Debug, Serialize)]
struct TraceRequest {
    street: String,
    city: String,
    state: String,
    zip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TraceResponse {
    status: String,
    #[serde(default)]
    owner: Option<TraceOwner>,
    #[serde(default)]
    confidence_score: Option<f64>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TraceOwner {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    phones: Vec<TraceContact>,
    #[serde(default)]
    emails: Vec<TraceContact>,
    #[serde(default)]
    mailing_address: Option<String>,
    #[serde(default)]
    owner_type: Option<String>,
    #[serde(default)]
    owner_occupied: Option<bool>,
    #[serde(default)]
    is_deceased: bool,
    #[serde(default)]
    is_litigator: bool,
}

#[derive(Debug, Deserialize)]
struct TraceContact {
    value: String,
    #[serde(default)]
    reachable: Option<bool>,
    #[serde(default)]
    dnc: bool,
}

impl From<TraceContact> for OwnerContact {
    fn from(c: TraceContact) -> Self {
        OwnerContact {
            value: c.value,
            reachable: c.reachable,
            dnc_flag: c.dnc,
        }
    }
}

pub(crate) fn parse_trace_response(body: &str) -> Result<Option<OwnerRecord>, AdapterError> {
    let parsed: TraceResponse = serde_json::from_str(body)
        .map_err(|e| AdapterError::Fatal(format!("Malformed skip trace payload: {}", e)))?;

    match parsed.status.as_str() {
        "complete" => {
            let owner = parsed.owner.ok_or_else(|| {
                AdapterError::Fatal("Trace status 'complete' without owner block".to_string())
            })?;
            Ok(Some(OwnerRecord {
                full_name: owner.full_name,
                first_name: owner.first_name,
                last_name: owner.last_name,
                phones: owner.phones.into_iter().map(Into::into).collect(),
                emails: owner.emails.into_iter().map(Into::into).collect(),
                mailing_address: owner.mailing_address,
                owner_type: owner.owner_type,
                owner_occupied: owner.owner_occupied,
                is_deceased: owner.is_deceased,
                is_litigator: owner.is_litigator,
                confidence: parsed.confidence_score.unwrap_or(0.0).clamp(0.0, 1.0),
                source: parsed.source.unwrap_or_else(|| "trace".to_string()),
            }))
        }
        "not_found" => Ok(None),
        "error" => Err(AdapterError::Transient(
            "Trace provider reported an internal error".to_string(),
        )),
        other => Err(AdapterError::Fatal(format!(
            "Unknown trace status '{}'",
            other
        ))),
    }
}
