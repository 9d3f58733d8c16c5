//! Vision model adapter (chat-completions style JSON API).
//!
//! Each classification sends one image URL plus a prompt that demands a
//! bare-JSON answer. Models still love to wrap answers in markdown fences,
//! so those are stripped before parsing. A payload that does not parse into
//! the expected shape is a `Fatal` error — defaulting a garbled detection to
//! "looks fine" would poison the risk score downstream.

use serde::{Deserialize, Serialize};

use crate::model::{
    ConditionDetection, ImageKind, ImageRef, PowerLinePosition, PowerLineSighting,
    PropertyCondition, RoadConditionDetection, RoadSurface, StructureDetection,
};

use super::{AdapterError, VisionProvider};

const ROAD_PROMPT: &str = "Look at this street-level photo. Classify the road surface in front \
of the property as one of: PAVED, DIRT, GRAVEL, POOR, UNKNOWN. Respond with JSON only, no \
markdown: {\"road_surface\": \"...\", \"confidence\": 0.0}";

const POWER_LINES_SATELLITE_PROMPT: &str = "This is a top-down satellite image. The property is \
at the RED MARKER. Are power lines visible, and how far are they from the marker? Respond with \
JSON only, no markdown: {\"visible\": true, \"position\": \
\"directly_above|in_front_close|nearby|far|none\", \"line_type\": \"transmission|distribution\", \
\"confidence\": 0.0, \"distance_meters\": 0.0}";

const POWER_LINES_STREET_PROMPT: &str = "Look at this street-level photo of a property. Are \
power lines visible, and where are they relative to the property? Respond with JSON only, no \
markdown: {\"visible\": true, \"position\": \
\"directly_above|in_front_close|nearby|far|none\", \"line_type\": \"transmission|distribution\", \
\"confidence\": 0.0, \"distance_meters\": 0.0}";

const STRUCTURES_PROMPT: &str = "This is a top-down satellite image. The property is at the RED \
MARKER. Count the buildings/structures on the marked parcel exactly as visible from above. \
Respond with JSON only, no markdown: {\"count\": 0, \"density\": \"none|sparse|dense\", \
\"confidence\": 0.0}";

const CONDITION_PROMPT: &str = "This is a top-down satellite image. The property is at the RED \
MARKER. Classify the parcel's visible upkeep as one of: maintained, overgrown, cleared, \
unknown. Respond with JSON only, no markdown: {\"condition\": \"...\", \"confidence\": 0.0}";

pub struct HttpVisionProvider {
    client: reqwest::blocking::Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpVisionProvider {
    pub fn new(
        client: reqwest::blocking::Client,
        url: &str,
        api_key: Option<String>,
        model: &str,
    ) -> Self {
        Self {
            client,
            url: url.to_string(),
            api_key,
            model: model.to_string(),
        }
    }

    fn complete(&self, prompt: &str, image_url: &str) -> Result<String, AdapterError> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: 500,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_url.to_string(),
                        },
                    },
                ],
            }],
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send()?;

        if !response.status().is_success() {
            return Err(AdapterError::from_status(response.status(), "vision"));
        }

        let body = response.text()?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AdapterError::Fatal(format!("Malformed vision payload: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AdapterError::Fatal("Vision response had no choices".to_string()))
    }
}

impl VisionProvider for HttpVisionProvider {
    fn road_condition(&self, image: &ImageRef) -> Result<RoadConditionDetection, AdapterError> {
        let content = self.complete(ROAD_PROMPT, &image.url)?;
        parse_road_condition(&content)
    }

    fn power_lines(
        &self,
        image: &ImageRef,
        vantage: ImageKind,
    ) -> Result<PowerLineSighting, AdapterError> {
        let prompt = match vantage {
            ImageKind::Satellite => POWER_LINES_SATELLITE_PROMPT,
            ImageKind::Street => POWER_LINES_STREET_PROMPT,
        };
        let content = self.complete(prompt, &image.url)?;
        parse_power_lines(&content)
    }

    fn structures(&self, image: &ImageRef) -> Result<StructureDetection, AdapterError> {
        let content = self.complete(STRUCTURES_PROMPT, &image.url)?;
        parse_structures(&content)
    }

    fn condition(&self, image: &ImageRef) -> Result<ConditionDetection, AdapterError> {
        let content = self.complete(CONDITION_PROMPT, &image.url)?;
        parse_condition(&content)
    }

    fn model_version(&self) -> String {
        self.model.clone()
    }
}

// Wire shapes.

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RoadPayload {
    road_surface: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct PowerLinePayload {
    visible: bool,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    line_type: Option<String>,
    confidence: f64,
    #[serde(default)]
    distance_meters: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StructuresPayload {
    count: u32,
    #[serde(default)]
    density: Option<String>,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionPayload {
    condition: String,
    confidence: f64,
}

/// Strips markdown code fences (``` and ```json) around a model answer.
pub(crate) fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn parse_json<T: serde::de::DeserializeOwned>(content: &str) -> Result<T, AdapterError> {
    serde_json::from_str(strip_code_fences(content)).map_err(|e| {
        AdapterError::Fatal(format!("Vision answer is not the expected JSON: {}", e))
    })
}

pub(crate) fn parse_road_condition(content: &str) -> Result<RoadConditionDetection, AdapterError> {
    let payload: RoadPayload = parse_json(content)?;
    let surface = RoadSurface::parse(&payload.road_surface).ok_or_else(|| {
        AdapterError::Fatal(format!("Unknown road surface '{}'", payload.road_surface))
    })?;
    Ok(RoadConditionDetection {
        surface,
        confidence: payload.confidence.clamp(0.0, 1.0),
    })
}

pub(crate) fn parse_power_lines(content: &str) -> Result<PowerLineSighting, AdapterError> {
    let payload: PowerLinePayload = parse_json(content)?;
    let position = match payload.position.as_deref() {
        Some(raw) => PowerLinePosition::parse(raw)
            .ok_or_else(|| AdapterError::Fatal(format!("Unknown power line position '{}'", raw)))?,
        None if payload.visible => {
            return Err(AdapterError::Fatal(
                "Power lines visible but no position given".to_string(),
            ))
        }
        None => PowerLinePosition::Absent,
    };
    Ok(PowerLineSighting {
        visible: payload.visible,
        position: if payload.visible {
            position
        } else {
            PowerLinePosition::Absent
        },
        line_type: payload.line_type,
        confidence: payload.confidence.clamp(0.0, 1.0),
        distance_m: payload.distance_meters,
    })
}

pub(crate) fn parse_structures(content: &str) -> Result<StructureDetection, AdapterError> {
    let payload: StructuresPayload = parse_json(content)?;
    Ok(StructureDetection {
        count: payload.count,
        density: payload.density,
        confidence: payload.confidence.clamp(0.0, 1.0),
    })
}

pub(crate) fn parse_condition(content: &str) -> Result<ConditionDetection, AdapterError> {
    let payload: ConditionPayload = parse_json(content)?;
    let condition = PropertyCondition::parse(&payload.condition.to_ascii_lowercase())
        .ok_or_else(|| {
            AdapterError::Fatal(format!("Unknown property condition '{}'", payload.condition))
        })?;
    Ok(ConditionDetection {
        condition,
        confidence: payload.confidence.clamp(0.0, 1.0),
    })
}
