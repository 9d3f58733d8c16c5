//! External service adapters.
//!
//! Each external dependency sits behind a trait so the pipeline can be run
//! against fakes in tests and swapped providers in production. The HTTP
//! implementations live next to their traits; construction happens once at
//! startup and the trait objects are shared across workers.
//!
//! Error classification is the contract here: `Validation` is never retried,
//! `Transient` is retried with backoff and then degraded to a safe default
//! by the caller, `Fatal` surfaces immediately.

use thiserror::Error;

use crate::model::{
    ConditionDetection, FloodSignal, GeocodedAddress, ImageKind, ImageRef, OwnerRecord,
    PowerLineSighting, PropertyInput, ProtectedLandSignal, RoadAccessSignal,
    RoadConditionDetection, SlopeSignal, StructureDetection, WetlandsSignal,
};

pub mod geocode;
pub mod gis;
pub mod imagery;
pub mod owner;
pub mod retry;
pub mod vision;

pub use geocode::HttpGeocoder;
pub use gis::HttpGisProvider;
pub use imagery::HttpImageryProvider;
pub use owner::HttpOwnerLookup;
pub use retry::RetryPolicy;
pub use vision::HttpVisionProvider;

/// Errors from external providers, classified by how the caller should react.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The input was bad. Retrying the identical request cannot help.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Network trouble, timeouts, rate limits, provider 5xx. Worth retrying.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Bad credentials or a malformed provider payload. Retrying is useless
    /// and silently defaulting would hide a real defect.
    #[error("Fatal provider error: {0}")]
    Fatal(String),
}

impl AdapterError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }

    /// Classifies an HTTP status code.
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        if status.as_u16() == 429 || status.is_server_error() {
            AdapterError::Transient(format!("{}: HTTP {}", context, status))
        } else {
            AdapterError::Fatal(format!("{}: HTTP {}", context, status))
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        // Connection failures and timeouts are transient by definition;
        // anything that made it to a response body decode is a provider
        // contract problem.
        if e.is_decode() {
            AdapterError::Fatal(format!("Response decode failed: {}", e))
        } else {
            AdapterError::Transient(e.to_string())
        }
    }
}

/// Resolves an address to coordinates. `Ok(None)` is the documented
/// not-found result, distinct from lookup failure.
pub trait GeocodeProvider: Send + Sync {
    fn geocode(&self, input: &PropertyInput) -> Result<Option<GeocodedAddress>, AdapterError>;
}

/// Point lookups against the environmental GIS services.
pub trait GisProvider: Send + Sync {
    fn flood_zone(&self, lat: f64, lon: f64) -> Result<FloodSignal, AdapterError>;
    fn wetlands(&self, lat: f64, lon: f64) -> Result<WetlandsSignal, AdapterError>;
    fn slope(&self, lat: f64, lon: f64) -> Result<SlopeSignal, AdapterError>;
    fn road_access(&self, lat: f64, lon: f64) -> Result<RoadAccessSignal, AdapterError>;
    fn protected_land(&self, lat: f64, lon: f64) -> Result<ProtectedLandSignal, AdapterError>;
}

/// Fetches an image reference for a coordinate.
pub trait ImageryProvider: Send + Sync {
    fn fetch_image(&self, lat: f64, lon: f64, kind: ImageKind) -> Result<ImageRef, AdapterError>;
}

/// Vision-model classifications over fetched imagery.
pub trait VisionProvider: Send + Sync {
    fn road_condition(&self, image: &ImageRef) -> Result<RoadConditionDetection, AdapterError>;
    fn power_lines(
        &self,
        image: &ImageRef,
        vantage: ImageKind,
    ) -> Result<PowerLineSighting, AdapterError>;
    fn structures(&self, image: &ImageRef) -> Result<StructureDetection, AdapterError>;
    fn condition(&self, image: &ImageRef) -> Result<ConditionDetection, AdapterError>;
    fn model_version(&self) -> String;
}

/// Skip-trace lookup. `Ok(None)` means the provider found no owner.
pub trait OwnerLookupProvider: Send + Sync {
    fn lookup(&self, input: &PropertyInput) -> Result<Option<OwnerRecord>, AdapterError>;
}
