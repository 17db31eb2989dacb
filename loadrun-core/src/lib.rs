//! Loadrun Core
//!
//! Core types for the loadrun measurement driver.
//!
//! This crate contains:
//! - Job types: references to the remote CI job and its runs
//! - Measure types: the measurement-cycle input sent by the host driver
//! - Metric types: descriptors and the outcome document reported back

pub mod job;
pub mod measure;
pub mod metrics;
