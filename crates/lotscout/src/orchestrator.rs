//! Job lifecycle orchestration.
//!
//! `submit` records a batch and runs the GIS stage over a worker pool,
//! `process_job` re-enters that stage after a crash or requeue,
//! `trigger_stage` schedules the optional AI and skip-trace stages,
//! `requeue_stalled` recovers properties abandoned mid-flight.
//!
//! All progress lives in the database: `processed_count` is bumped with an
//! atomic SQL update per completion, so `get_status` is crash-consistent and
//! two orchestrators pointed at the same file cannot double-count. Stage
//! failures stay on the property row; a job only fails on infrastructure
//! errors (persistence or scheduling).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{error, info, warn};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::adapters::{
    GeocodeProvider, GisProvider, ImageryProvider, OwnerLookupProvider, RetryPolicy,
    VisionProvider,
};
use crate::cache::CachedImagery;
use crate::config::{Config, PowerLinePolicy};
use crate::db::job_repo::JobRow;
use crate::db::owner_repo::OwnerInfoRow;
use crate::db::property_repo::PropertyRow;
use crate::db::{ai_repo, job_repo, owner_repo, property_repo, risk_repo, Database, DatabaseError};
use crate::error::WorkerError;
use crate::model::{
    AiAnalysisResult, ImageKind, JobStatus, PropertyInput, RiskLevel, Stage, StageStatus,
};
use crate::pipeline::{
    BroadcastProgress, NoopProgress, Pipeline, PipelineContext, ProgressReporter,
    PropertyProgressEvent,
};
use crate::risk::{reconcile, score_ai};
use crate::worker::{PropertyJob, PropertyOutcome, WorkerPool};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid batch: {0}")]
    Validation(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// The external service implementations, constructed once at startup.
pub struct Providers {
    pub geocoder: Arc<dyn GeocodeProvider>,
    pub gis: Arc<dyn GisProvider>,
    pub imagery: Arc<dyn ImageryProvider>,
    pub vision: Arc<dyn VisionProvider>,
    pub owner: Arc<dyn OwnerLookupProvider>,
}

/// What a `trigger_stage` call found and scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerOutcome {
    /// Properties already in a terminal state for the stage, left untouched.
    pub already_done: u64,
    /// Properties scheduled in this call.
    pub to_process: u64,
}

pub struct Orchestrator {
    db: Database,
    config: Config,
    geocoder: Arc<dyn GeocodeProvider>,
    gis: Arc<dyn GisProvider>,
    imagery: Arc<dyn ImageryProvider>,
    vision: Arc<dyn VisionProvider>,
    owner: Arc<dyn OwnerLookupProvider>,
    retry: RetryPolicy,
    progress: Option<Arc<broadcast::Sender<PropertyProgressEvent>>>,
}

impl Orchestrator {
    /// Wires the providers up, putting the TTL imagery cache in front of the
    /// imagery provider so repeated stage re-runs do not refetch.
    pub fn new(db: Database, config: Config, providers: Providers) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        let imagery: Arc<dyn ImageryProvider> = Arc::new(CachedImagery::new(
            providers.imagery,
            Duration::from_secs(config.image_cache_ttl_secs),
        ));

        Self {
            db,
            config,
            geocoder: providers.geocoder,
            gis: providers.gis,
            imagery,
            vision: providers.vision,
            owner: providers.owner,
            retry,
            progress: None,
        }
    }

    /// Attaches a broadcast channel; GIS stage workers emit per-property
    /// progress events into it so a status UI can subscribe.
    pub fn with_progress(
        mut self,
        sender: Arc<broadcast::Sender<PropertyProgressEvent>>,
    ) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Records a batch, runs the GIS stage over it and returns the job id.
    ///
    /// The job and its rows are durable before any processing starts, so a
    /// processing failure is recorded on the job row instead of returned;
    /// callers poll `get_status` either way. `process_job` re-enters the
    /// same path after a crash.
    pub fn submit(&self, inputs: &[PropertyInput]) -> Result<String, OrchestratorError> {
        if inputs.is_empty() {
            return Err(OrchestratorError::Validation("batch is empty".to_string()));
        }
        if inputs.len() > self.config.max_batch_size {
            return Err(OrchestratorError::Validation(format!(
                "batch of {} exceeds max_batch_size {}",
                inputs.len(),
                self.config.max_batch_size
            )));
        }

        let now = Utc::now().to_rfc3339();
        let job = JobRow::new(inputs.len() as u32, &now);
        job_repo::insert(&self.db, &job)?;

        let rows: Vec<PropertyRow> = inputs
            .iter()
            .map(|input| PropertyRow::new(&job.id, input, &now))
            .collect();
        property_repo::insert_batch(&self.db, &rows)?;

        info!("Job {} submitted with {} properties", job.id, rows.len());

        if let Err(e) = self.process_job(&job.id) {
            error!("Job {} failed during processing: {}", job.id, e);
        }
        Ok(job.id)
    }

    /// Runs the GIS stage for every property of the job that is not yet done.
    /// Safe to call again after a crash or partial failure.
    pub fn process_job(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let result = self.run_gis_stage(job_id);
        if let Err(e) = &result {
            let now = Utc::now().to_rfc3339();
            if let Err(db_err) = job_repo::mark_failed(&self.db, job_id, &e.to_string(), &now) {
                error!("Failed to record failure for job {}: {}", job_id, db_err);
            }
        }
        result
    }

    fn run_gis_stage(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let job = self.require_job(job_id)?;
        let now = Utc::now().to_rfc3339();
        job_repo::set_status(&self.db, job_id, JobStatus::Processing, &now)?;

        let pending = property_repo::find_pending_for_stage(&self.db, job_id, Stage::Gis)?;
        info!(
            "Job {}: {} of {} properties pending GIS analysis",
            job_id,
            pending.len(),
            job.total_count
        );

        if pending.is_empty() {
            job_repo::mark_completed_if_done(&self.db, job_id, &now)?;
            return Ok(());
        }

        let jobs = self.schedule_rows(&pending, job_id, Stage::Gis, &now)?;

        let pipeline = Pipeline::new(
            Arc::clone(&self.geocoder),
            Arc::clone(&self.gis),
            self.db.clone(),
            self.retry.clone(),
        );

        let db = self.db.clone();
        let progress = self.progress.clone();
        self.run_pool(
            jobs,
            self.config.workers.gis,
            move |_worker_id, job| {
                let reporter: Box<dyn ProgressReporter> = match &progress {
                    Some(sender) => Box::new(BroadcastProgress::new(
                        &job.job_id,
                        &job.property_id,
                        &job.input.one_line(),
                        Arc::clone(sender),
                    )),
                    None => Box::new(NoopProgress),
                };
                let (outcome, _ctx) = pipeline.run(PipelineContext::new(job), reporter.as_ref());
                outcome
            },
            |outcome| {
                let ts = Utc::now().to_rfc3339();
                job_repo::increment_processed(&db, &outcome.job_id, &ts)?;
                if !outcome.success {
                    warn!(
                        "Property {} failed GIS stage: {}",
                        outcome.property_id,
                        outcome.error.as_deref().unwrap_or("unknown")
                    );
                    property_repo::set_stage_status(
                        &db,
                        &outcome.property_id,
                        Stage::Gis,
                        StageStatus::Error,
                        &ts,
                    )?;
                }
                Ok(())
            },
        )?;

        let now = Utc::now().to_rfc3339();
        if job_repo::mark_completed_if_done(&self.db, job_id, &now)? {
            info!("Job {} completed", job_id);
        }
        Ok(())
    }

    /// Current job state, computed from persisted rows.
    pub fn get_status(&self, job_id: &str) -> Result<JobRow, OrchestratorError> {
        self.require_job(job_id)
    }

    /// Schedules an optional stage over every non-terminal property of the
    /// job. Re-triggering is idempotent: completed rows are skipped and an
    /// empty batch never provisions a pool.
    pub fn trigger_stage(
        &self,
        job_id: &str,
        stage: Stage,
    ) -> Result<TriggerOutcome, OrchestratorError> {
        if stage == Stage::Gis {
            return Err(OrchestratorError::Validation(
                "the GIS stage runs at submission; use process_job to re-run it".to_string(),
            ));
        }
        self.require_job(job_id)?;

        let pending = property_repo::find_pending_for_stage(&self.db, job_id, stage)?;
        let already_done = property_repo::count_completed_for_stage(&self.db, job_id, stage)?;

        if pending.is_empty() {
            info!("Job {}: nothing pending for stage {}", job_id, stage.as_str());
            return Ok(TriggerOutcome {
                already_done,
                to_process: 0,
            });
        }

        let total = property_repo::count_by_job(&self.db, job_id)?;
        let now = Utc::now().to_rfc3339();
        let jobs = self.schedule_rows(&pending, job_id, stage, &now)?;
        let to_process = jobs.len() as u64;
        info!(
            "Job {}: scheduling {} of {} properties for stage {}",
            job_id,
            to_process,
            total,
            stage.as_str()
        );

        let log_failures = |outcome: &PropertyOutcome| {
            if !outcome.success {
                warn!(
                    "Property {} failed stage {}: {}",
                    outcome.property_id,
                    stage.as_str(),
                    outcome.error.as_deref().unwrap_or("unknown")
                );
            }
            Ok(())
        };

        match stage {
            Stage::AiAnalysis => {
                let worker = Arc::new(AiStage {
                    db: self.db.clone(),
                    imagery: Arc::clone(&self.imagery),
                    vision: Arc::clone(&self.vision),
                    retry: self.retry.clone(),
                    override_confidence: self.config.ai_override_confidence,
                    power_line_policy: self.config.power_line_policy,
                });
                self.run_pool(
                    jobs,
                    self.config.workers.ai,
                    move |_, job| worker.process(&job),
                    log_failures,
                )?;
            }
            Stage::SkipTrace => {
                let worker = Arc::new(SkipTraceStage {
                    db: self.db.clone(),
                    owner: Arc::clone(&self.owner),
                    retry: self.retry.clone(),
                });
                self.run_pool(
                    jobs,
                    self.config.workers.skip_trace,
                    move |_, job| worker.process(&job),
                    log_failures,
                )?;
            }
            Stage::Gis => {}
        }

        Ok(TriggerOutcome {
            already_done,
            to_process,
        })
    }

    /// Resets properties stuck in `processing` past the liveness timeout back
    /// to `pending` so the next run picks them up. Returns how many rows were
    /// requeued across all stages.
    pub fn requeue_stalled(&self, job_id: &str) -> Result<u64, OrchestratorError> {
        self.require_job(job_id)?;

        let cutoff = (Utc::now() - chrono::Duration::seconds(self.config.liveness_timeout_secs))
            .to_rfc3339();
        let now = Utc::now().to_rfc3339();

        let mut requeued = 0;
        for stage in [Stage::Gis, Stage::AiAnalysis, Stage::SkipTrace] {
            requeued += property_repo::requeue_stalled(&self.db, job_id, stage, &cutoff, &now)?;
        }
        if requeued > 0 {
            info!("Job {}: requeued {} stalled properties", job_id, requeued);
        }
        Ok(requeued)
    }

    fn require_job(&self, job_id: &str) -> Result<JobRow, OrchestratorError> {
        job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))
    }

    /// Marks rows `processing` and turns them into pool jobs.
    fn schedule_rows(
        &self,
        rows: &[PropertyRow],
        job_id: &str,
        stage: Stage,
        now: &str,
    ) -> Result<Vec<PropertyJob>, OrchestratorError> {
        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            property_repo::set_stage_status(&self.db, &row.id, stage, StageStatus::Processing, now)?;
            let mut job = PropertyJob::new(&row.id, job_id, row.input());
            if let (Some(lat), Some(lon)) = (row.latitude, row.longitude) {
                job = job.with_coordinates(lat, lon);
            }
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// Feeds `jobs` through a fresh pool and drains one result per job.
    ///
    /// Submission happens on a feeder thread: the job channel is bounded, so
    /// submitting a large batch from the receiving thread would deadlock.
    /// A recording error does not abort the drain (that would wedge the
    /// feeder against the full channel); the first one is returned after all
    /// results are in.
    fn run_pool<F>(
        &self,
        jobs: Vec<PropertyJob>,
        worker_count: usize,
        handler: F,
        mut on_outcome: impl FnMut(&PropertyOutcome) -> Result<(), OrchestratorError>,
    ) -> Result<(), OrchestratorError>
    where
        F: Fn(usize, PropertyJob) -> PropertyOutcome + Send + Sync + 'static,
    {
        let total = jobs.len();
        let pool = WorkerPool::new(worker_count, handler);
        let mut first_err: Option<OrchestratorError> = None;

        std::thread::scope(|scope| {
            let feeder = scope.spawn(|| {
                for job in jobs {
                    if pool.submit(job).is_err() {
                        error!("Worker pool rejected a job; channel closed");
                        break;
                    }
                }
            });

            for _ in 0..total {
                match pool.recv_result() {
                    Some(outcome) => {
                        if let Err(e) = on_outcome(&outcome) {
                            error!(
                                "Failed to record outcome for property {}: {}",
                                outcome.property_id, e
                            );
                            if first_err.is_none() {
                                first_err = Some(e);
                            }
                        }
                    }
                    None => break,
                }
            }

            if feeder.join().is_err() {
                error!("Feeder thread panicked");
            }
        });

        pool.shutdown();
        pool.wait();

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Per-worker state for the AI imagery stage.
struct AiStage {
    db: Database,
    imagery: Arc<dyn ImageryProvider>,
    vision: Arc<dyn VisionProvider>,
    retry: RetryPolicy,
    override_confidence: f64,
    power_line_policy: PowerLinePolicy,
}

impl AiStage {
    fn process(&self, job: &PropertyJob) -> PropertyOutcome {
        match self.analyze(job) {
            Ok(result) => match self.persist_success(job, &result) {
                Ok(risk_level) => PropertyOutcome::success(job, risk_level),
                Err(e) => {
                    PropertyOutcome::failure(job, format!("failed to persist AI analysis: {}", e))
                }
            },
            Err(reason) => {
                // The GIS verdict stays authoritative; record the failed
                // attempt and move on.
                let shell = AiAnalysisResult::failed(
                    &job.property_id,
                    &self.vision.model_version(),
                    reason.clone(),
                );
                let ts = Utc::now().to_rfc3339();
                if let Err(e) = ai_repo::upsert(&self.db, &shell, &ts) {
                    error!(
                        "Failed to record AI stage error for {}: {}",
                        job.property_id, e
                    );
                }
                if let Err(e) = property_repo::set_stage_status(
                    &self.db,
                    &job.property_id,
                    Stage::AiAnalysis,
                    StageStatus::Error,
                    &ts,
                ) {
                    error!("Failed to mark AI stage error for {}: {}", job.property_id, e);
                }
                PropertyOutcome::failure(job, reason)
            }
        }
    }

    fn analyze(&self, job: &PropertyJob) -> Result<AiAnalysisResult, String> {
        let started = Instant::now();
        let (lat, lon) = match (job.latitude, job.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err("property has no coordinates; run the GIS stage first".to_string()),
        };

        let satellite = match self.retry.run("satellite imagery", || {
            self.imagery.fetch_image(lat, lon, ImageKind::Satellite)
        }) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("No satellite image for {}: {}", job.property_id, e);
                None
            }
        };
        let street = match self.retry.run("street imagery", || {
            self.imagery.fetch_image(lat, lon, ImageKind::Street)
        }) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("No street image for {}: {}", job.property_id, e);
                None
            }
        };
        if satellite.is_none() && street.is_none() {
            return Err("no imagery available from any provider".to_string());
        }

        // Vision failures after retry fail the stage; a silent partial
        // score would be indistinguishable from a verified one.
        let road_condition = match &street {
            Some(image) => Some(
                self.retry
                    .run("road condition", || self.vision.road_condition(image))
                    .map_err(|e| e.to_string())?,
            ),
            None => None,
        };

        let mut power_lines = Vec::new();
        if let Some(image) = &satellite {
            power_lines.push(
                self.retry
                    .run("power lines (satellite)", || {
                        self.vision.power_lines(image, ImageKind::Satellite)
                    })
                    .map_err(|e| e.to_string())?,
            );
        }
        if let Some(image) = &street {
            power_lines.push(
                self.retry
                    .run("power lines (street)", || {
                        self.vision.power_lines(image, ImageKind::Street)
                    })
                    .map_err(|e| e.to_string())?,
            );
        }

        let structures = match &satellite {
            Some(image) => Some(
                self.retry
                    .run("structures", || self.vision.structures(image))
                    .map_err(|e| e.to_string())?,
            ),
            None => None,
        };
        let condition = match &satellite {
            Some(image) => Some(
                self.retry
                    .run("property condition", || self.vision.condition(image))
                    .map_err(|e| e.to_string())?,
            ),
            None => None,
        };

        let ai_risk = score_ai(
            road_condition.as_ref(),
            &power_lines,
            structures.as_ref(),
            condition.as_ref(),
            self.power_line_policy,
        );

        Ok(AiAnalysisResult {
            property_id: job.property_id.clone(),
            satellite,
            street,
            road_condition,
            power_lines,
            structures,
            condition,
            ai_risk: Some(ai_risk),
            model_version: self.vision.model_version(),
            processing_seconds: started.elapsed().as_secs_f64(),
            error: None,
        })
    }

    fn persist_success(
        &self,
        job: &PropertyJob,
        result: &AiAnalysisResult,
    ) -> Result<Option<RiskLevel>, DatabaseError> {
        let ts = Utc::now().to_rfc3339();
        ai_repo::upsert(&self.db, result, &ts)?;

        // Reconcile against the stored GIS verdict; the override path
        // recomputes overall risk through the engine.
        let risk_level = match risk_repo::find_by_property(&self.db, &job.property_id)? {
            Some(risk) => {
                let updated = reconcile(risk, result, self.override_confidence);
                let level = updated.overall_risk;
                risk_repo::upsert(&self.db, &updated, &ts)?;
                Some(level)
            }
            None => None,
        };

        property_repo::set_stage_status(
            &self.db,
            &job.property_id,
            Stage::AiAnalysis,
            StageStatus::Completed,
            &ts,
        )?;
        Ok(risk_level)
    }
}

/// Per-worker state for the skip-trace stage.
struct SkipTraceStage {
    db: Database,
    owner: Arc<dyn OwnerLookupProvider>,
    retry: RetryPolicy,
}

impl SkipTraceStage {
    fn process(&self, job: &PropertyJob) -> PropertyOutcome {
        let started = Instant::now();
        let input = job.input.clone();

        match self.retry.run("skip trace", || self.owner.lookup(&input)) {
            Ok(lookup) => {
                let secs = started.elapsed().as_secs_f64();
                let row = match &lookup {
                    Some(record) => OwnerInfoRow::complete(&job.property_id, record, secs),
                    None => OwnerInfoRow::not_found(&job.property_id, "trace", secs),
                };
                match self.persist(job, &row, StageStatus::Completed) {
                    Ok(()) => PropertyOutcome::success(job, None),
                    Err(e) => {
                        PropertyOutcome::failure(job, format!("failed to persist owner info: {}", e))
                    }
                }
            }
            Err(e) => {
                let retry_count = owner_repo::find_by_property(&self.db, &job.property_id)
                    .ok()
                    .flatten()
                    .map(|r| r.retry_count + 1)
                    .unwrap_or(1);
                let row = OwnerInfoRow::errored(&job.property_id, e.to_string(), retry_count);
                if let Err(db_err) = self.persist(job, &row, StageStatus::Error) {
                    error!(
                        "Failed to record skip-trace error for {}: {}",
                        job.property_id, db_err
                    );
                }
                PropertyOutcome::failure(job, e.to_string())
            }
        }
    }

    fn persist(
        &self,
        job: &PropertyJob,
        row: &OwnerInfoRow,
        status: StageStatus,
    ) -> Result<(), DatabaseError> {
        let ts = Utc::now().to_rfc3339();
        owner_repo::upsert(&self.db, row, &ts)?;
        property_repo::set_stage_status(&self.db, &job.property_id, Stage::SkipTrace, status, &ts)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterError;
    use crate::db::property_repo::PropertyRow;
    use crate::pipeline::PropertyPhase;
    use crate::model::{
        ConditionDetection, Confidence, FloodSignal, GeocodedAddress, ImageRef, OwnerRecord,
        PowerLinePosition, PowerLineSighting, PropertyCondition, ProtectedLandSignal,
        RoadAccessSignal, RoadConditionDetection, RoadSurface, Severity, SlopeSignal,
        StructureDetection, WetlandsSignal,
    };

    struct StubGeocoder;

    impl GeocodeProvider for StubGeocoder {
        fn geocode(
            &self,
            _input: &PropertyInput,
        ) -> Result<Option<GeocodedAddress>, AdapterError> {
            Ok(Some(GeocodedAddress {
                latitude: 34.68,
                longitude: -82.95,
                county: Some("Oconee".to_string()),
                accuracy: Confidence::High,
                source: "census".to_string(),
            }))
        }
    }

    struct StubGis;

    impl GisProvider for StubGis {
        fn flood_zone(&self, _lat: f64, _lon: f64) -> Result<FloodSignal, AdapterError> {
            Ok(FloodSignal {
                zone: "X".to_string(),
                severity: Severity::Low,
                in_sfha: false,
                source: "fema-nfhl".to_string(),
                confidence: Confidence::High,
            })
        }
        fn wetlands(&self, _lat: f64, _lon: f64) -> Result<WetlandsSignal, AdapterError> {
            Ok(WetlandsSignal {
                present: false,
                wetland_type: None,
                source: "nwi".to_string(),
                confidence: Confidence::High,
            })
        }
        fn slope(&self, _lat: f64, _lon: f64) -> Result<SlopeSignal, AdapterError> {
            Ok(SlopeSignal {
                percent: 2.0,
                severity: Severity::Low,
                source: "usgs-epqs".to_string(),
                confidence: Confidence::High,
            })
        }
        fn road_access(&self, _lat: f64, _lon: f64) -> Result<RoadAccessSignal, AdapterError> {
            Ok(RoadAccessSignal {
                has_access: true,
                distance_m: 40.0,
                source: "overpass".to_string(),
                confidence: Confidence::High,
            })
        }
        fn protected_land(
            &self,
            _lat: f64,
            _lon: f64,
        ) -> Result<ProtectedLandSignal, AdapterError> {
            Ok(ProtectedLandSignal {
                is_protected: false,
                kind: None,
                source: "pad-us".to_string(),
                confidence: Confidence::High,
            })
        }
    }

    struct StubImagery;

    impl ImageryProvider for StubImagery {
        fn fetch_image(
            &self,
            lat: f64,
            lon: f64,
            kind: ImageKind,
        ) -> Result<ImageRef, AdapterError> {
            Ok(ImageRef {
                url: format!("https://img.example/{}/{:.4},{:.4}", kind.as_str(), lat, lon),
                provider: "stub".to_string(),
            })
        }
    }

    struct StubVision {
        fail: bool,
    }

    impl VisionProvider for StubVision {
        fn road_condition(&self, _image: &ImageRef) -> Result<RoadConditionDetection, AdapterError> {
            if self.fail {
                return Err(AdapterError::Transient("vision offline".to_string()));
            }
            Ok(RoadConditionDetection {
                surface: RoadSurface::Paved,
                confidence: 0.9,
            })
        }
        fn power_lines(
            &self,
            _image: &ImageRef,
            _vantage: ImageKind,
        ) -> Result<PowerLineSighting, AdapterError> {
            if self.fail {
                return Err(AdapterError::Transient("vision offline".to_string()));
            }
            Ok(PowerLineSighting {
                visible: false,
                position: PowerLinePosition::Absent,
                line_type: None,
                confidence: 0.8,
                distance_m: None,
            })
        }
        fn structures(&self, _image: &ImageRef) -> Result<StructureDetection, AdapterError> {
            if self.fail {
                return Err(AdapterError::Transient("vision offline".to_string()));
            }
            Ok(StructureDetection {
                count: 1,
                density: Some("sparse".to_string()),
                confidence: 0.85,
            })
        }
        fn condition(&self, _image: &ImageRef) -> Result<ConditionDetection, AdapterError> {
            if self.fail {
                return Err(AdapterError::Transient("vision offline".to_string()));
            }
            Ok(ConditionDetection {
                condition: PropertyCondition::Maintained,
                confidence: 0.7,
            })
        }
        fn model_version(&self) -> String {
            "stub-vision-1".to_string()
        }
    }

    struct StubOwner;

    impl OwnerLookupProvider for StubOwner {
        fn lookup(&self, _input: &PropertyInput) -> Result<Option<OwnerRecord>, AdapterError> {
            Ok(Some(OwnerRecord {
                full_name: Some("Jane Smith".to_string()),
                first_name: Some("Jane".to_string()),
                last_name: Some("Smith".to_string()),
                phones: Vec::new(),
                emails: Vec::new(),
                mailing_address: None,
                owner_type: Some("individual".to_string()),
                owner_occupied: Some(false),
                is_deceased: false,
                is_litigator: false,
                confidence: 0.9,
                source: "tracer".to_string(),
            }))
        }
    }

    fn orchestrator(vision_fails: bool) -> Orchestrator {
        let mut config = Config::default();
        config.workers.gis = 2;
        config.workers.ai = 2;
        config.workers.skip_trace = 2;
        config.retry.base_delay_ms = 0;
        config.retry.max_delay_ms = 0;

        Orchestrator::new(
            Database::open_in_memory().unwrap(),
            config,
            Providers {
                geocoder: Arc::new(StubGeocoder),
                gis: Arc::new(StubGis),
                imagery: Arc::new(StubImagery),
                vision: Arc::new(StubVision { fail: vision_fails }),
                owner: Arc::new(StubOwner),
            },
        )
    }

    fn inputs(n: usize) -> Vec<PropertyInput> {
        (0..n)
            .map(|i| PropertyInput {
                street: format!("{} Lake Rd", i + 1),
                city: "Seneca".to_string(),
                state: "SC".to_string(),
                postal_code: "29672".to_string(),
                contact_id: None,
                owner_name: None,
            })
            .collect()
    }

    #[test]
    fn test_submit_rejects_empty_batch() {
        let orch = orchestrator(false);
        assert!(matches!(
            orch.submit(&[]),
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[test]
    fn test_submit_rejects_oversized_batch() {
        let mut orch = orchestrator(false);
        orch.config.max_batch_size = 2;
        assert!(matches!(
            orch.submit(&inputs(3)),
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[test]
    fn test_submit_runs_gis_stage() {
        let orch = orchestrator(false);
        let job_id = orch.submit(&inputs(2)).unwrap();

        // No separate processing call: submit itself drives the batch to a
        // terminal status.
        let status = orch.get_status(&job_id).unwrap();
        assert_eq!(status.status, JobStatus::Completed);
        assert_eq!(status.processed_count, 2);

        for row in property_repo::find_by_job(orch.db(), &job_id).unwrap() {
            assert_eq!(row.gis_status, StageStatus::Completed);
        }
    }

    #[test]
    fn test_process_job_recovers_partially_recorded_batch() {
        // Crash window: a property's terminal status was persisted but the
        // job counter bump was lost. Re-entering processing must still
        // complete the job.
        let orch = orchestrator(false);
        let now = Utc::now().to_rfc3339();
        let job = JobRow::new(1, &now);
        job_repo::insert(orch.db(), &job).unwrap();
        job_repo::set_status(orch.db(), &job.id, JobStatus::Processing, &now).unwrap();

        let row = PropertyRow::new(&job.id, &inputs(1)[0], &now);
        let property_id = row.id.clone();
        property_repo::insert_batch(orch.db(), &[row]).unwrap();
        property_repo::set_stage_status(
            orch.db(),
            &property_id,
            Stage::Gis,
            StageStatus::Completed,
            &now,
        )
        .unwrap();

        orch.process_job(&job.id).unwrap();

        let status = orch.get_status(&job.id).unwrap();
        assert_eq!(status.status, JobStatus::Completed);
        assert_eq!(status.processed_count, 1);
    }

    #[test]
    fn test_progress_events_reach_subscribers() {
        let (sender, mut rx) = broadcast::channel(64);
        let orch = orchestrator(false).with_progress(Arc::new(sender));
        let job_id = orch.submit(&inputs(2)).unwrap();

        let mut completed = 0;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.job_id, job_id);
            if event.phase == PropertyPhase::Completed {
                completed += 1;
            }
        }
        assert_eq!(completed, 2);
    }

    #[test]
    fn test_process_job_completes_batch() {
        let orch = orchestrator(false);
        let job_id = orch.submit(&inputs(5)).unwrap();

        orch.process_job(&job_id).unwrap();

        let status = orch.get_status(&job_id).unwrap();
        assert_eq!(status.status, JobStatus::Completed);
        assert_eq!(status.processed_count, 5);
        assert!(status.completed_at.is_some());

        for row in property_repo::find_by_job(orch.db(), &job_id).unwrap() {
            assert_eq!(row.gis_status, StageStatus::Completed);
            assert!(risk_repo::find_by_property(orch.db(), &row.id)
                .unwrap()
                .is_some());
        }
    }

    #[test]
    fn test_process_job_rerun_finds_nothing_pending() {
        let orch = orchestrator(false);
        let job_id = orch.submit(&inputs(2)).unwrap();
        orch.process_job(&job_id).unwrap();

        // Second run is a no-op; processed_count stays at total.
        orch.process_job(&job_id).unwrap();
        let status = orch.get_status(&job_id).unwrap();
        assert_eq!(status.processed_count, 2);
        assert_eq!(status.status, JobStatus::Completed);
    }

    #[test]
    fn test_trigger_gis_stage_is_rejected() {
        let orch = orchestrator(false);
        let job_id = orch.submit(&inputs(1)).unwrap();
        assert!(matches!(
            orch.trigger_stage(&job_id, Stage::Gis),
            Err(OrchestratorError::Validation(_))
        ));
    }

    #[test]
    fn test_trigger_ai_stage_persists_analysis() {
        let orch = orchestrator(false);
        let job_id = orch.submit(&inputs(3)).unwrap();
        orch.process_job(&job_id).unwrap();

        let outcome = orch.trigger_stage(&job_id, Stage::AiAnalysis).unwrap();
        assert_eq!(outcome.to_process, 3);
        assert_eq!(outcome.already_done, 0);

        for row in property_repo::find_by_job(orch.db(), &job_id).unwrap() {
            assert_eq!(row.ai_status, StageStatus::Completed);
            let analysis = ai_repo::find_by_property(orch.db(), &row.id)
                .unwrap()
                .unwrap();
            assert!(analysis.ai_risk.is_some());
            assert!(analysis.error.is_none());
        }

        // Re-trigger: everything terminal, no new work.
        let again = orch.trigger_stage(&job_id, Stage::AiAnalysis).unwrap();
        assert_eq!(again.to_process, 0);
        assert_eq!(again.already_done, 3);
    }

    #[test]
    fn test_vision_failure_marks_stage_error_but_job_stays_completed() {
        let orch = orchestrator(true);
        let job_id = orch.submit(&inputs(2)).unwrap();
        orch.process_job(&job_id).unwrap();

        orch.trigger_stage(&job_id, Stage::AiAnalysis).unwrap();

        for row in property_repo::find_by_job(orch.db(), &job_id).unwrap() {
            assert_eq!(row.ai_status, StageStatus::Error);
            let analysis = ai_repo::find_by_property(orch.db(), &row.id)
                .unwrap()
                .unwrap();
            assert!(analysis.error.is_some());
            assert!(analysis.ai_risk.is_none());
            // GIS verdict untouched.
            assert!(risk_repo::find_by_property(orch.db(), &row.id)
                .unwrap()
                .is_some());
        }

        let status = orch.get_status(&job_id).unwrap();
        assert_eq!(status.status, JobStatus::Completed);

        // Errored rows are eligible again on the next trigger.
        let again = orch.trigger_stage(&job_id, Stage::AiAnalysis).unwrap();
        assert_eq!(again.to_process, 2);
    }

    #[test]
    fn test_trigger_skip_trace_stores_owner_info() {
        let orch = orchestrator(false);
        let job_id = orch.submit(&inputs(2)).unwrap();
        orch.process_job(&job_id).unwrap();

        let outcome = orch.trigger_stage(&job_id, Stage::SkipTrace).unwrap();
        assert_eq!(outcome.to_process, 2);

        for row in property_repo::find_by_job(orch.db(), &job_id).unwrap() {
            assert_eq!(row.skip_trace_status, StageStatus::Completed);
            let info = owner_repo::find_by_property(orch.db(), &row.id)
                .unwrap()
                .unwrap();
            assert_eq!(info.full_name.as_deref(), Some("Jane Smith"));
            assert!(info.status.is_terminal());
        }
    }

    #[test]
    fn test_get_status_unknown_job() {
        let orch = orchestrator(false);
        assert!(matches!(
            orch.get_status("nope"),
            Err(OrchestratorError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_requeue_stalled_resets_old_processing_rows() {
        let orch = orchestrator(false);
        let job_id = orch.submit(&inputs(1)).unwrap();

        let rows = property_repo::find_by_job(orch.db(), &job_id).unwrap();
        let stale = (Utc::now() - chrono::Duration::seconds(3600)).to_rfc3339();
        property_repo::set_stage_status(
            orch.db(),
            &rows[0].id,
            Stage::Gis,
            StageStatus::Processing,
            &stale,
        )
        .unwrap();

        let requeued = orch.requeue_stalled(&job_id).unwrap();
        assert_eq!(requeued, 1);

        let row = property_repo::find_by_id(orch.db(), &rows[0].id)
            .unwrap()
            .unwrap();
        assert_eq!(row.gis_status, StageStatus::Pending);
    }

    impl Orchestrator {
        fn db(&self) -> &Database {
            &self.db
        }
    }
}
