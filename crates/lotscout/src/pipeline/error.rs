use thiserror::Error;

use crate::adapters::AdapterError;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    #[error("Geocoding failed: {0}")]
    Geocode(AdapterError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Non-fatal degradations recorded on the context; the property still gets
/// a risk verdict, just with lower confidence.
#[derive(Debug, Clone)]
pub enum PipelineWarning {
    LookupDegraded { signal: String, error: String },
}
