//! Measurement-cycle input
//!
//! Structure of the JSON document the host driver sends on stdin when it
//! requests a measurement. Only the load section matters to this driver;
//! anything else in the document is ignored.

use serde::Deserialize;
use std::time::Duration;

/// Top-level measurement input document
#[derive(Debug, Clone, Deserialize)]
pub struct MeasureInput {
    #[serde(default)]
    pub control: Option<Control>,
}

/// Control section of the measurement input
#[derive(Debug, Clone, Deserialize)]
pub struct Control {
    #[serde(default)]
    pub load: Option<LoadProfile>,
}

/// Load profile for one run, in seconds
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LoadProfile {
    /// Steady-state duration of the load test
    pub duration: u64,
    /// Warmup period before steady state
    pub warmup: u64,
}

impl LoadProfile {
    /// Total expected wall-clock time of the run: warmup plus steady state.
    pub fn total(&self) -> Duration {
        Duration::from_secs(self.duration + self.warmup)
    }
}

impl MeasureInput {
    /// The load section, if the host sent a well-formed one.
    ///
    /// A `None` here is a fatal input error at the driver level: without a
    /// load profile there is nothing to measure.
    pub fn load_profile(&self) -> Option<LoadProfile> {
        self.control.as_ref().and_then(|c| c.load)
    }
}
