//! Per-property progress reporting.
//!
//! Workers report through the `ProgressReporter` seam; production wires a
//! `BroadcastProgress` backed by a tokio broadcast channel so a status UI
//! or SSE stream can subscribe, tests use `NoopProgress`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::RiskLevel;

/// Phase of property processing within a stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PropertyPhase {
    Queued,
    Geocoding,
    GisLookups,
    Scoring,
    Persisting,
    FetchingImagery,
    Analyzing,
    TracingOwner,
    Completed,
    Failed,
}

/// Events emitted by the pipeline during processing.
pub enum ProgressEvent {
    Phase {
        phase: PropertyPhase,
        message: String,
    },
    Completed {
        overall_risk: Option<RiskLevel>,
    },
    Failed {
        error: String,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// One broadcastable progress update for a property.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyProgressEvent {
    pub job_id: String,
    pub property_id: String,
    /// Single-line address for display.
    pub address: String,
    pub phase: PropertyPhase,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_risk: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bridges pipeline events onto a broadcast channel.
pub struct BroadcastProgress {
    job_id: String,
    property_id: String,
    address: String,
    sender: Arc<broadcast::Sender<PropertyProgressEvent>>,
}

impl BroadcastProgress {
    pub fn new(
        job_id: &str,
        property_id: &str,
        address: &str,
        sender: Arc<broadcast::Sender<PropertyProgressEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            property_id: property_id.to_string(),
            address: address.to_string(),
            sender,
        }
    }

    fn send(
        &self,
        phase: PropertyPhase,
        message: String,
        overall_risk: Option<RiskLevel>,
        error: Option<String>,
    ) {
        // No active receivers is fine
        let _ = self.sender.send(PropertyProgressEvent {
            job_id: self.job_id.clone(),
            property_id: self.property_id.clone(),
            address: self.address.clone(),
            phase,
            message,
            timestamp: Utc::now(),
            overall_risk,
            error,
        });
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, message } => {
                self.send(phase, message, None, None);
            }
            ProgressEvent::Completed { overall_risk } => {
                self.send(
                    PropertyPhase::Completed,
                    "Processing completed".to_string(),
                    overall_risk,
                    None,
                );
            }
            ProgressEvent::Failed { error } => {
                self.send(
                    PropertyPhase::Failed,
                    "Processing failed".to_string(),
                    None,
                    Some(error),
                );
            }
        }
    }
}
