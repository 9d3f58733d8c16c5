//! Shared utilities for lotscout integration tests.

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{batch, property, HarnessBuilder};
