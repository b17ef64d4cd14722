//! Cluster event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cluster::ClusterRef;

/// Severity of a cluster event, mirroring the orchestrator's event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// Reason tag for exclusion submissions.
pub const REASON_EXCLUDING_PROCESSES: &str = "ExcludingProcesses";

/// An observability event attached to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub cluster: ClusterRef,
    pub event_type: EventType,
    /// Short CamelCase reason tag, e.g. `ExcludingProcesses`.
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ClusterEvent {
    pub fn new(
        cluster: &ClusterRef,
        event_type: EventType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.clone(),
            event_type,
            reason: reason.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn normal(cluster: &ClusterRef, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(cluster, EventType::Normal, reason, message)
    }

    pub fn warning(cluster: &ClusterRef, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(cluster, EventType::Warning, reason, message)
    }
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}: {}",
            self.cluster, self.event_type, self.reason, self.message
        )
    }
}
