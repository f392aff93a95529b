//! Shared test utilities for director integration tests.
//!
//! This module provides:
//! - `TestHarness` with a temp working directory, catalog and simulated agents
//! - Builder patterns for configurations and job definitions

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
pub use harness::{finished, wait_for_status, SeedBackup, JOB_TIMEOUT};
