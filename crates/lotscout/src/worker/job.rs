use crate::model::{PropertyInput, RiskLevel};

/// One property queued for a pipeline stage.
#[derive(Debug, Clone)]
pub struct PropertyJob {
    pub property_id: String,
    pub job_id: String,
    pub input: PropertyInput,
    /// Present once geocoding has run; AI and skip-trace stages require it.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl PropertyJob {
    pub fn new(property_id: &str, job_id: &str, input: PropertyInput) -> Self {
        Self {
            property_id: property_id.to_string(),
            job_id: job_id.to_string(),
            input,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }
}

/// Outcome of processing one property through a stage.
#[derive(Debug)]
pub struct PropertyOutcome {
    pub property_id: String,
    pub job_id: String,
    pub success: bool,
    pub overall_risk: Option<RiskLevel>,
    pub error: Option<String>,
}

impl PropertyOutcome {
    pub fn success(job: &PropertyJob, overall_risk: Option<RiskLevel>) -> Self {
        Self {
            property_id: job.property_id.clone(),
            job_id: job.job_id.clone(),
            success: true,
            overall_risk,
            error: None,
        }
    }

    pub fn failure(job: &PropertyJob, error: String) -> Self {
        Self {
            property_id: job.property_id.clone(),
            job_id: job.job_id.clone(),
            success: false,
            overall_risk: None,
            error: Some(error),
        }
    }
}
