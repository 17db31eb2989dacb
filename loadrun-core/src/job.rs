//! CI job domain types

use serde::{Deserialize, Serialize};

/// Resolved reference to the remote CI job.
///
/// Obtained once at the start of a measurement cycle and reused for all
/// status and start calls during that cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    /// Job name as configured on the server
    pub name: String,
    /// Absolute URL of the job on the server
    pub url: String,
}

/// Reference to a run started by this process.
///
/// Held only while the run is believed to be active. A run discovered
/// already in progress has no `RunRef`; it is observed, not owned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRef {
    /// Queue item URL returned by the server when the run was requested
    pub queue_url: String,
}
