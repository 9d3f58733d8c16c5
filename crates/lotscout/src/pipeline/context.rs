use crate::model::{
    FloodSignal, GeocodedAddress, ProtectedLandSignal, RiskResult, RoadAccessSignal, SlopeSignal,
    WetlandsSignal,
};
use crate::worker::job::PropertyJob;

use super::error::PipelineWarning;

pub struct PipelineContext {
    // Input
    pub job: PropertyJob,

    // Step 1 result — guaranteed Some after step_geocode
    pub geocoded: Option<GeocodedAddress>,

    // Step 2 results — each guaranteed Some after step_gis_lookups,
    // degraded to unverified defaults on lookup failure
    pub wetlands: Option<WetlandsSignal>,
    pub flood: Option<FloodSignal>,
    pub slope: Option<SlopeSignal>,
    pub road_access: Option<RoadAccessSignal>,
    pub protected: Option<ProtectedLandSignal>,

    // Step 3 result — guaranteed Some after step_aggregate
    pub risk: Option<RiskResult>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(job: PropertyJob) -> Self {
        Self {
            job,
            geocoded: None,
            wetlands: None,
            flood: None,
            slope: None,
            road_access: None,
            protected: None,
            risk: None,
            warnings: Vec::new(),
        }
    }
}
