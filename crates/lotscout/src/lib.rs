pub mod adapters;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod risk;
pub mod worker;

pub use adapters::{AdapterError, RetryPolicy};
pub use cache::CachedImagery;
pub use config::{load_config, Config, PowerLinePolicy};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, LotscoutError, Result, WorkerError};
pub use model::{
    AiAnalysisResult, JobStatus, PropertyInput, RiskLevel, RiskResult, Stage, StageStatus,
};
pub use orchestrator::{Orchestrator, OrchestratorError, Providers, TriggerOutcome};
pub use pipeline::{Pipeline, PipelineContext};
