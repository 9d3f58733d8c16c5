use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::warn;
use tracing::info_span;

use crate::adapters::{AdapterError, GeocodeProvider, GisProvider, RetryPolicy};
use crate::db::{property_repo, risk_repo, Database};
use crate::model::{
    Confidence, FloodSignal, GeocodedAddress, ProtectedLandSignal, RiskResult, RoadAccessSignal,
    SlopeSignal, Stage, StageStatus, WetlandsSignal,
};
use crate::risk::engine;
use crate::worker::job::PropertyOutcome;

use super::context::PipelineContext;
use super::error::{PipelineError, PipelineWarning};
use super::progress::{ProgressEvent, ProgressReporter, PropertyPhase};

/// Runs one property through the GIS risk stage: geocode, environmental
/// lookups, aggregation, persistence.
pub struct Pipeline {
    geocoder: Arc<dyn GeocodeProvider>,
    gis: Arc<dyn GisProvider>,
    db: Database,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        geocoder: Arc<dyn GeocodeProvider>,
        gis: Arc<dyn GisProvider>,
        db: Database,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            geocoder,
            gis,
            db,
            retry,
        }
    }

    /// Run the full stage for a single property.
    /// Returns a (PropertyOutcome, PipelineContext) pair.
    pub fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (PropertyOutcome, PipelineContext) {
        let started = Instant::now();
        let _pipeline_span = info_span!("pipeline",
            property_id = %ctx.job.property_id,
            job_id = %ctx.job.job_id,
            address = %ctx.job.input.one_line(),
        )
        .entered();

        // Step 1: Geocode. The only hard-failing step: without coordinates
        // there is nothing to look up.
        {
            let _step = info_span!("geocode").entered();
            progress.report(ProgressEvent::Phase {
                phase: PropertyPhase::Geocoding,
                message: "Resolving address to coordinates...".to_string(),
            });
            if let Err(e) = self.step_geocode(&mut ctx) {
                let err_msg = e.to_string();
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                return (PropertyOutcome::failure(&ctx.job, err_msg), ctx);
            }
        }

        // Step 2: Environmental lookups, each degrading independently
        {
            let _step = info_span!("gis_lookups").entered();
            progress.report(ProgressEvent::Phase {
                phase: PropertyPhase::GisLookups,
                message: "Querying flood, wetlands, slope, road, protected land...".to_string(),
            });
            self.step_gis_lookups(&mut ctx);
        }

        // Step 3: Aggregate
        {
            let _step = info_span!("aggregate").entered();
            progress.report(ProgressEvent::Phase {
                phase: PropertyPhase::Scoring,
                message: "Computing risk verdict...".to_string(),
            });
            self.step_aggregate(&mut ctx, started.elapsed().as_secs_f64());
        }

        // Step 4: Persist
        {
            let _step = info_span!("persist").entered();
            progress.report(ProgressEvent::Phase {
                phase: PropertyPhase::Persisting,
                message: "Storing risk result...".to_string(),
            });
            if let Err(e) = self.step_persist(&ctx) {
                let err_msg = e.to_string();
                progress.report(ProgressEvent::Failed {
                    error: err_msg.clone(),
                });
                return (PropertyOutcome::failure(&ctx.job, err_msg), ctx);
            }
        }

        let overall_risk = ctx.risk.as_ref().map(|r| r.overall_risk);
        progress.report(ProgressEvent::Completed { overall_risk });

        (PropertyOutcome::success(&ctx.job, overall_risk), ctx)
    }

    fn step_geocode(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        // Coordinates from a previous run are reused as-is.
        if let (Some(latitude), Some(longitude)) = (ctx.job.latitude, ctx.job.longitude) {
            ctx.geocoded = Some(GeocodedAddress {
                latitude,
                longitude,
                county: None,
                accuracy: Confidence::High,
                source: "stored".to_string(),
            });
            return Ok(());
        }

        let input = ctx.job.input.clone();
        match self.retry.run("geocode", || self.geocoder.geocode(&input)) {
            Ok(Some(geocoded)) => {
                ctx.geocoded = Some(geocoded);
                Ok(())
            }
            Ok(None) => Err(PipelineError::AddressNotFound(input.one_line())),
            Err(e) => Err(PipelineError::Geocode(e)),
        }
    }

    fn step_gis_lookups(&self, ctx: &mut PipelineContext) {
        let geocoded = ctx.geocoded.as_ref().expect("step 1 completed");
        let lat = geocoded.latitude;
        let lon = geocoded.longitude;

        // Independent point lookups; fan out so one slow provider does not
        // serialize the others.
        let (wetlands, flood, slope, road, protected) = std::thread::scope(|s| {
            let wetlands =
                s.spawn(|| self.retry.run("wetlands lookup", || self.gis.wetlands(lat, lon)));
            let flood =
                s.spawn(|| self.retry.run("flood zone lookup", || self.gis.flood_zone(lat, lon)));
            let slope = s.spawn(|| self.retry.run("slope lookup", || self.gis.slope(lat, lon)));
            let road =
                s.spawn(|| self.retry.run("road access lookup", || self.gis.road_access(lat, lon)));
            let protected = s.spawn(|| {
                self.retry
                    .run("protected land lookup", || self.gis.protected_land(lat, lon))
            });
            (
                join_lookup(wetlands),
                join_lookup(flood),
                join_lookup(slope),
                join_lookup(road),
                join_lookup(protected),
            )
        });

        let warnings = &mut ctx.warnings;
        ctx.wetlands = Some(degrade(warnings, "wetlands", wetlands, WetlandsSignal::unverified));
        ctx.flood = Some(degrade(warnings, "flood", flood, FloodSignal::unverified));
        ctx.slope = Some(degrade(warnings, "slope", slope, SlopeSignal::unverified));
        ctx.road_access = Some(degrade(
            warnings,
            "road_access",
            road,
            RoadAccessSignal::unverified,
        ));
        ctx.protected = Some(degrade(
            warnings,
            "protected_land",
            protected,
            ProtectedLandSignal::unverified,
        ));
    }

    fn step_aggregate(&self, ctx: &mut PipelineContext, processing_seconds: f64) {
        let wetlands = ctx.wetlands.clone().expect("step 2 completed");
        let flood = ctx.flood.clone().expect("step 2 completed");
        let slope = ctx.slope.clone().expect("step 2 completed");
        let road_access = ctx.road_access.clone().expect("step 2 completed");
        let protected = ctx.protected.clone().expect("step 2 completed");

        let landlocked = engine::derive_landlocked(&road_access);
        let overall_risk = engine::overall_risk(&wetlands, &flood, &slope, &road_access, &protected);

        ctx.risk = Some(RiskResult {
            property_id: ctx.job.property_id.clone(),
            wetlands,
            flood,
            slope,
            road_access,
            protected,
            landlocked,
            overall_risk,
            processing_seconds,
            error: None,
        });
    }

    fn step_persist(&self, ctx: &PipelineContext) -> Result<(), PipelineError> {
        let geocoded = ctx.geocoded.as_ref().expect("step 1 completed");
        let risk = ctx.risk.as_ref().expect("step 3 completed");
        let now = Utc::now().to_rfc3339();

        property_repo::set_coordinates(&self.db, &ctx.job.property_id, geocoded, &now)?;
        risk_repo::upsert(&self.db, risk, &now)?;
        property_repo::set_stage_status(
            &self.db,
            &ctx.job.property_id,
            Stage::Gis,
            StageStatus::Completed,
            &now,
        )?;

        Ok(())
    }
}

fn join_lookup<T>(
    handle: std::thread::ScopedJoinHandle<'_, Result<T, AdapterError>>,
) -> Result<T, AdapterError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(AdapterError::Transient("lookup thread panicked".to_string())))
}

fn degrade<T>(
    warnings: &mut Vec<PipelineWarning>,
    signal: &str,
    result: Result<T, AdapterError>,
    fallback: impl FnOnce() -> T,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("{} lookup degraded to default: {}", signal, e);
            warnings.push(PipelineWarning::LookupDegraded {
                signal: signal.to_string(),
                error: e.to_string(),
            });
            fallback()
        }
    }
}
