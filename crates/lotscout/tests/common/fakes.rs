//! Configurable fake providers for integration tests.
//!
//! Each fake is built per scenario and shared with the orchestrator as a
//! trait object; mutable behavior (outages, call counting) goes through
//! atomics so tests can flip it mid-run.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use lotscout::adapters::{
    AdapterError, GeocodeProvider, GisProvider, ImageryProvider, OwnerLookupProvider,
    VisionProvider,
};
use lotscout::model::{
    ConditionDetection, Confidence, FloodSignal, GeocodedAddress, ImageKind, ImageRef,
    OwnerRecord, PowerLinePosition, PowerLineSighting, PropertyCondition, PropertyInput,
    ProtectedLandSignal, RoadAccessSignal, RoadConditionDetection, RoadSurface, Severity,
    SlopeSignal, StructureDetection, WetlandsSignal,
};

pub struct FakeGeocoder {
    pub found: bool,
}

impl GeocodeProvider for FakeGeocoder {
    fn geocode(&self, _input: &PropertyInput) -> Result<Option<GeocodedAddress>, AdapterError> {
        if !self.found {
            return Ok(None);
        }
        Ok(Some(GeocodedAddress {
            latitude: 34.6834,
            longitude: -82.9532,
            county: Some("Oconee".to_string()),
            accuracy: Confidence::High,
            source: "census".to_string(),
        }))
    }
}

/// GIS responses, benign by default; tests tighten individual signals.
pub struct FakeGis {
    pub flood_severity: Severity,
    pub in_sfha: bool,
    pub wetlands_present: bool,
    pub slope_percent: f64,
    pub slope_severity: Severity,
    pub has_road_access: bool,
    pub road_distance_m: f64,
    pub is_protected: bool,
}

impl FakeGis {
    pub fn benign() -> Self {
        Self {
            flood_severity: Severity::Low,
            in_sfha: false,
            wetlands_present: false,
            slope_percent: 2.0,
            slope_severity: Severity::Low,
            has_road_access: true,
            road_distance_m: 40.0,
            is_protected: false,
        }
    }
}

impl GisProvider for FakeGis {
    fn flood_zone(&self, _lat: f64, _lon: f64) -> Result<FloodSignal, AdapterError> {
        let zone = match self.flood_severity {
            Severity::High => "AE",
            Severity::Medium => "X500",
            Severity::Low => "X",
        };
        Ok(FloodSignal {
            zone: zone.to_string(),
            severity: self.flood_severity,
            in_sfha: self.in_sfha,
            source: "fema-nfhl".to_string(),
            confidence: Confidence::High,
        })
    }

    fn wetlands(&self, _lat: f64, _lon: f64) -> Result<WetlandsSignal, AdapterError> {
        Ok(WetlandsSignal {
            present: self.wetlands_present,
            wetland_type: self.wetlands_present.then(|| "freshwater pond".to_string()),
            source: "nwi".to_string(),
            confidence: Confidence::High,
        })
    }

    fn slope(&self, _lat: f64, _lon: f64) -> Result<SlopeSignal, AdapterError> {
        Ok(SlopeSignal {
            percent: self.slope_percent,
            severity: self.slope_severity,
            source: "usgs-epqs".to_string(),
            confidence: Confidence::High,
        })
    }

    fn road_access(&self, _lat: f64, _lon: f64) -> Result<RoadAccessSignal, AdapterError> {
        Ok(RoadAccessSignal {
            has_access: self.has_road_access,
            distance_m: self.road_distance_m,
            source: "overpass".to_string(),
            confidence: Confidence::High,
        })
    }

    fn protected_land(&self, _lat: f64, _lon: f64) -> Result<ProtectedLandSignal, AdapterError> {
        Ok(ProtectedLandSignal {
            is_protected: self.is_protected,
            kind: self.is_protected.then(|| "state park".to_string()),
            source: "pad-us".to_string(),
            confidence: Confidence::High,
        })
    }
}

/// Counts upstream fetches so cache behavior is observable.
pub struct CountingImagery {
    pub calls: AtomicUsize,
}

impl CountingImagery {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl ImageryProvider for CountingImagery {
    fn fetch_image(&self, lat: f64, lon: f64, kind: ImageKind) -> Result<ImageRef, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ImageRef {
            url: format!("https://img.test/{}/{:.4},{:.4}", kind.as_str(), lat, lon),
            provider: "fake".to_string(),
        })
    }
}

pub struct FakeVision {
    pub surface: RoadSurface,
    pub surface_confidence: f64,
    pub power_position: Option<PowerLinePosition>,
    pub structure_count: u32,
    pub condition: PropertyCondition,
    pub offline: Arc<AtomicBool>,
}

impl FakeVision {
    pub fn calm() -> Self {
        Self {
            surface: RoadSurface::Paved,
            surface_confidence: 0.9,
            power_position: Some(PowerLinePosition::Nearby),
            structure_count: 1,
            condition: PropertyCondition::Maintained,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    fn check_online(&self) -> Result<(), AdapterError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(AdapterError::Transient("vision API unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl VisionProvider for FakeVision {
    fn road_condition(&self, _image: &ImageRef) -> Result<RoadConditionDetection, AdapterError> {
        self.check_online()?;
        Ok(RoadConditionDetection {
            surface: self.surface,
            confidence: self.surface_confidence,
        })
    }

    fn power_lines(
        &self,
        _image: &ImageRef,
        _vantage: ImageKind,
    ) -> Result<PowerLineSighting, AdapterError> {
        self.check_online()?;
        match self.power_position {
            Some(position) => Ok(PowerLineSighting {
                visible: true,
                position,
                line_type: Some("distribution".to_string()),
                confidence: 0.8,
                distance_m: Some(25.0),
            }),
            None => Ok(PowerLineSighting {
                visible: false,
                position: PowerLinePosition::Absent,
                line_type: None,
                confidence: 0.8,
                distance_m: None,
            }),
        }
    }

    fn structures(&self, _image: &ImageRef) -> Result<StructureDetection, AdapterError> {
        self.check_online()?;
        Ok(StructureDetection {
            count: self.structure_count,
            density: Some("sparse".to_string()),
            confidence: 0.85,
        })
    }

    fn condition(&self, _image: &ImageRef) -> Result<ConditionDetection, AdapterError> {
        self.check_online()?;
        Ok(ConditionDetection {
            condition: self.condition,
            confidence: 0.75,
        })
    }

    fn model_version(&self) -> String {
        "fake-vision-1".to_string()
    }
}

pub struct FakeOwner {
    pub record: Option<OwnerRecord>,
    pub offline: Arc<AtomicBool>,
}

impl FakeOwner {
    pub fn with_record() -> Self {
        Self {
            record: Some(OwnerRecord {
                full_name: Some("Jane Smith".to_string()),
                first_name: Some("Jane".to_string()),
                last_name: Some("Smith".to_string()),
                phones: Vec::new(),
                emails: Vec::new(),
                mailing_address: Some("PO Box 12, Seneca, SC 29672".to_string()),
                owner_type: Some("individual".to_string()),
                owner_occupied: Some(false),
                is_deceased: false,
                is_litigator: false,
                confidence: 0.9,
                source: "tracer".to_string(),
            }),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn not_found() -> Self {
        Self {
            record: None,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl OwnerLookupProvider for FakeOwner {
    fn lookup(&self, _input: &PropertyInput) -> Result<Option<OwnerRecord>, AdapterError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AdapterError::Transient("trace API unavailable".to_string()));
        }
        Ok(self.record.clone())
    }
}
