//! Health state report model.
//!
//! A `HealthState` is the nested report produced by every probe. It is
//! serialized with PascalCase field names so that reports from peers which
//! only emit `Name` and `Dependencies` still decode.

use serde::{Deserialize, Serialize};

/// Outcome of probing a single target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The target answered (a leaf with no checks is always ok).
    #[default]
    Ok,
    /// A local detector check returned an error.
    Unhealthy,
    /// The transport could not reach the peer.
    Unreachable,
    /// The peer answered with a non-2xx status or an undecodable report.
    BadResponse,
    /// The node already appears on the query trail.
    LoopDetected,
    /// The query trail exceeded the node's maximum depth.
    TooDeep,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// A node in the health report tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthState {
    pub name: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<HealthState>,
}

impl HealthState {
    /// A healthy state with no children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Ok,
            error: None,
            dependencies: Vec::new(),
        }
    }

    /// A childless state carrying a failure status and message.
    pub fn failed(name: impl Into<String>, status: Status, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            error: Some(error.into()),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<HealthState>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// True when this state and every descendant is `ok`.
    pub fn is_healthy(&self) -> bool {
        self.status.is_ok() && self.dependencies.iter().all(HealthState::is_healthy)
    }

    /// Find a direct child by name.
    pub fn child(&self, name: &str) -> Option<&HealthState> {
        self.dependencies.iter().find(|d| d.name == name)
    }
}
