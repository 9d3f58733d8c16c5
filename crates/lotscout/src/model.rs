//! Shared domain types for jobs, properties, risk signals and analysis results.
//!
//! Every environmental signal carries a `source` and a `Confidence` marker so
//! that a verified lookup and a degraded default are always distinguishable
//! downstream. Degraded defaults are constructed via the `unverified()`
//! constructors and never via struct literals in calling code.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Per-property status of a single pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Processing => "processing",
            StageStatus::Completed => "completed",
            StageStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StageStatus::Pending),
            "processing" => Some(StageStatus::Processing),
            "completed" => Some(StageStatus::Completed),
            "error" => Some(StageStatus::Error),
            _ => None,
        }
    }
}

/// Overall or per-factor risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(RiskLevel::Low),
            "MEDIUM" => Some(RiskLevel::Medium),
            "HIGH" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

/// Severity of a single environmental factor (flood zone, slope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            _ => None,
        }
    }
}

/// How much weight a signal's source deserves. Degraded defaults are
/// always `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HIGH" => Some(Confidence::High),
            "MEDIUM" => Some(Confidence::Medium),
            "LOW" => Some(Confidence::Low),
            _ => None,
        }
    }

    /// Maps a numeric detection confidence (0.0..=1.0) to a band.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Confidence::High
        } else if score >= 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Pipeline stages that can be scheduled per property. GIS runs as part of
/// batch submission; AI analysis and skip tracing are triggered separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Gis,
    AiAnalysis,
    SkipTrace,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Gis => "gis",
            Stage::AiAnalysis => "ai_analysis",
            Stage::SkipTrace => "skip_trace",
        }
    }
}

/// A single address as submitted in a batch. Inputs arrive pre-normalized;
/// parsing and normalization of raw uploads is out of scope here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyInput {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
}

impl PropertyInput {
    /// Single-line form used for free-text geocoding queries.
    pub fn one_line(&self) -> String {
        format!(
            "{}, {}, {} {}",
            self.street, self.city, self.state, self.postal_code
        )
    }
}

/// Result of a successful geocoding lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodedAddress {
    pub latitude: f64,
    pub longitude: f64,
    pub county: Option<String>,
    pub accuracy: Confidence,
    pub source: String,
}

/// Wetlands coverage at a point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WetlandsSignal {
    pub present: bool,
    pub wetland_type: Option<String>,
    pub source: String,
    pub confidence: Confidence,
}

impl WetlandsSignal {
    /// Degraded default after lookup failure: assume no wetlands, marked
    /// unverified.
    pub fn unverified() -> Self {
        Self {
            present: false,
            wetland_type: None,
            source: "unverified (wetlands lookup unavailable)".to_string(),
            confidence: Confidence::Low,
        }
    }
}

/// FEMA-style flood zone designation at a point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodSignal {
    /// Zone code, e.g. "AE", "VE", "X".
    pub zone: String,
    pub severity: Severity,
    /// Whether the point lies in a Special Flood Hazard Area.
    pub in_sfha: bool,
    pub source: String,
    pub confidence: Confidence,
}

impl FloodSignal {
    /// Degraded default after lookup failure: minimal-risk zone, marked
    /// unverified.
    pub fn unverified() -> Self {
        Self {
            zone: "X".to_string(),
            severity: Severity::Low,
            in_sfha: false,
            source: "unverified (flood lookup unavailable)".to_string(),
            confidence: Confidence::Low,
        }
    }
}

/// Terrain slope at a point, in percent grade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlopeSignal {
    pub percent: f64,
    pub severity: Severity,
    pub source: String,
    pub confidence: Confidence,
}

impl SlopeSignal {
    pub fn unverified() -> Self {
        Self {
            percent: 0.0,
            severity: Severity::Low,
            source: "unverified (elevation lookup unavailable)".to_string(),
            confidence: Confidence::Low,
        }
    }
}

/// Distance from the parcel to the nearest public road.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadAccessSignal {
    pub has_access: bool,
    pub distance_m: f64,
    pub source: String,
    pub confidence: Confidence,
}

impl RoadAccessSignal {
    /// Degraded default after lookup failure: assume accessible, marked
    /// unverified. Assuming landlocked on a failed lookup would flip the
    /// overall risk to HIGH on infrastructure noise alone.
    pub fn unverified() -> Self {
        Self {
            has_access: true,
            distance_m: 0.0,
            source: "unverified (road lookup unavailable, assumed accessible)".to_string(),
            confidence: Confidence::Low,
        }
    }
}

/// Protected land (conservation/park) coverage at a point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedLandSignal {
    pub is_protected: bool,
    pub kind: Option<String>,
    pub source: String,
    pub confidence: Confidence,
}

impl ProtectedLandSignal {
    pub fn unverified() -> Self {
        Self {
            is_protected: false,
            kind: None,
            source: "unverified (protected-land lookup unavailable)".to_string(),
            confidence: Confidence::Low,
        }
    }
}

/// Full GIS risk assessment for one property.
///
/// `landlocked` is derived from `road_access` and must never be set
/// independently; `risk_repo::upsert` re-derives it if a caller got it wrong.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskResult {
    pub property_id: String,
    pub wetlands: WetlandsSignal,
    pub flood: FloodSignal,
    pub slope: SlopeSignal,
    pub road_access: RoadAccessSignal,
    pub protected: ProtectedLandSignal,
    pub landlocked: bool,
    pub overall_risk: RiskLevel,
    pub processing_seconds: f64,
    pub error: Option<String>,
}

/// Road surface classification from street-level imagery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoadSurface {
    Paved,
    Dirt,
    Gravel,
    Poor,
    Unknown,
}

impl RoadSurface {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoadSurface::Paved => "PAVED",
            RoadSurface::Dirt => "DIRT",
            RoadSurface::Gravel => "GRAVEL",
            RoadSurface::Poor => "POOR",
            RoadSurface::Unknown => "UNKNOWN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PAVED" => Some(RoadSurface::Paved),
            "DIRT" => Some(RoadSurface::Dirt),
            "GRAVEL" => Some(RoadSurface::Gravel),
            "POOR" => Some(RoadSurface::Poor),
            "UNKNOWN" => Some(RoadSurface::Unknown),
            _ => None,
        }
    }
}

/// Where power lines sit relative to the marked parcel in an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerLinePosition {
    DirectlyAbove,
    InFrontClose,
    Nearby,
    Far,
    #[serde(rename = "none")]
    Absent,
}

impl PowerLinePosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerLinePosition::DirectlyAbove => "directly_above",
            PowerLinePosition::InFrontClose => "in_front_close",
            PowerLinePosition::Nearby => "nearby",
            PowerLinePosition::Far => "far",
            PowerLinePosition::Absent => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "directly_above" => Some(PowerLinePosition::DirectlyAbove),
            "in_front_close" => Some(PowerLinePosition::InFrontClose),
            "nearby" => Some(PowerLinePosition::Nearby),
            "far" => Some(PowerLinePosition::Far),
            "none" => Some(PowerLinePosition::Absent),
            _ => None,
        }
    }
}

/// A power line detection from one vantage point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerLineSighting {
    pub visible: bool,
    pub position: PowerLinePosition,
    pub line_type: Option<String>,
    pub confidence: f64,
    pub distance_m: Option<f64>,
}

/// Road surface detection with model confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadConditionDetection {
    pub surface: RoadSurface,
    pub confidence: f64,
}

/// Structure count from the top-down satellite image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureDetection {
    pub count: u32,
    pub density: Option<String>,
    pub confidence: f64,
}

/// Visible upkeep of the parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCondition {
    Maintained,
    Overgrown,
    Cleared,
    Unknown,
}

impl PropertyCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyCondition::Maintained => "maintained",
            PropertyCondition::Overgrown => "overgrown",
            PropertyCondition::Cleared => "cleared",
            PropertyCondition::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "maintained" => Some(PropertyCondition::Maintained),
            "overgrown" => Some(PropertyCondition::Overgrown),
            "cleared" => Some(PropertyCondition::Cleared),
            "unknown" => Some(PropertyCondition::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDetection {
    pub condition: PropertyCondition,
    pub confidence: f64,
}

/// Aggregated AI risk score with its contributing factors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiRiskScore {
    pub level: RiskLevel,
    pub score: f64,
    pub confidence: f64,
    pub factors: Vec<String>,
}

/// A fetched image reference (URL plus which provider served it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub provider: String,
}

/// Which kind of imagery to fetch for a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Satellite,
    Street,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Satellite => "satellite",
            ImageKind::Street => "street",
        }
    }
}

/// Full AI imagery analysis for one property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysisResult {
    pub property_id: String,
    pub satellite: Option<ImageRef>,
    pub street: Option<ImageRef>,
    pub road_condition: Option<RoadConditionDetection>,
    /// Sightings from up to two vantage points (satellite, street).
    pub power_lines: Vec<PowerLineSighting>,
    pub structures: Option<StructureDetection>,
    pub condition: Option<ConditionDetection>,
    pub ai_risk: Option<AiRiskScore>,
    pub model_version: String,
    pub processing_seconds: f64,
    pub error: Option<String>,
}

impl AiAnalysisResult {
    /// An empty shell recording a stage failure.
    pub fn failed(property_id: &str, model_version: &str, error: String) -> Self {
        Self {
            property_id: property_id.to_string(),
            satellite: None,
            street: None,
            road_condition: None,
            power_lines: Vec::new(),
            structures: None,
            condition: None,
            ai_risk: None,
            model_version: model_version.to_string(),
            processing_seconds: 0.0,
            error: Some(error),
        }
    }
}

/// Skip-trace resolution status. `Complete` and `NotFound` are terminal:
/// re-triggering the stage never touches rows in these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerStatus {
    Pending,
    Complete,
    NotFound,
    Error,
}

impl OwnerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerStatus::Pending => "pending",
            OwnerStatus::Complete => "complete",
            OwnerStatus::NotFound => "not_found",
            OwnerStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OwnerStatus::Pending),
            "complete" => Some(OwnerStatus::Complete),
            "not_found" => Some(OwnerStatus::NotFound),
            "error" => Some(OwnerStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OwnerStatus::Complete | OwnerStatus::NotFound)
    }
}

/// A phone number or email with compliance flags from the trace provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerContact {
    pub value: String,
    #[serde(default)]
    pub reachable: Option<bool>,
    /// Do-not-call / do-not-contact flag.
    #[serde(default)]
    pub dnc_flag: bool,
}

/// Owner identity as returned by a skip-trace provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerRecord {
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phones: Vec<OwnerContact>,
    pub emails: Vec<OwnerContact>,
    pub mailing_address: Option<String>,
    pub owner_type: Option<String>,
    pub owner_occupied: Option<bool>,
    pub is_deceased: bool,
    pub is_litigator: bool,
    pub confidence: f64,
    pub source: String,
}
