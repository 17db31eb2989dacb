//! Metric descriptors and the measurement outcome document

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the single metric this driver produces.
pub const TIME_TAKEN: &str = "time taken";

/// One metric: its unit, and a value once measured.
///
/// The describe document carries metrics without values; the outcome
/// document carries the same metrics with values filled in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    /// A seconds-valued metric with no measurement yet.
    pub fn seconds() -> Self {
        Self {
            unit: "seconds".to_string(),
            value: None,
        }
    }
}

/// Metric set advertised to the host driver by describe.
pub fn supported_metrics() -> BTreeMap<String, Metric> {
    BTreeMap::from([(TIME_TAKEN.to_string(), Metric::seconds())])
}

/// Final document reported to the host driver after a successful cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureOutcome {
    pub metrics: BTreeMap<String, Metric>,
    pub annotations: BTreeMap<String, serde_json::Value>,
}

impl MeasureOutcome {
    /// Outcome with the measured elapsed time and an empty annotation set.
    pub fn time_taken(seconds: f64) -> Self {
        let mut metrics = supported_metrics();
        if let Some(metric) = metrics.get_mut(TIME_TAKEN) {
            metric.value = Some(seconds);
        }
        Self {
            metrics,
            annotations: BTreeMap::new(),
        }
    }
}
