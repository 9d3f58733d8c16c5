pub mod job;
pub mod pool;

pub use job::{PropertyJob, PropertyOutcome};
pub use pool::WorkerPool;

// Re-export crossbeam_channel for callers that wire their own channels
pub use crossbeam_channel;
