//! Requeue decisions.
//!
//! Every reconciliation step returns `Option<Requeue>`:
//!
//! * `None`: nothing left to do for this concern in this pass.
//! * `Some(Requeue::Error(_))`: the step failed; the scheduler retries on its
//!   standard backoff.
//! * `Some(Requeue::Delayed { .. })`: the step is waiting on something
//!   outside its control; the scheduler retries after the configured delay,
//!   which is longer than its standard backoff, so other concerns get a turn.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::config::RequeueConfig;
use crate::error::ReconcileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requeue {
    Error(ReconcileError),
    Delayed { message: String },
}

impl Requeue {
    pub fn error(err: impl Into<ReconcileError>) -> Self {
        Self::Error(err.into())
    }

    pub fn delayed(message: impl Into<String>) -> Self {
        Self::Delayed {
            message: message.into(),
        }
    }

    pub fn is_delayed(&self) -> bool {
        matches!(self, Self::Delayed { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Explicit delay requested from the scheduler. `None` means the
    /// scheduler's own backoff applies.
    pub fn delay(&self, config: &RequeueConfig) -> Option<Duration> {
        match self {
            Self::Delayed { .. } => Some(config.delayed_requeue()),
            Self::Error(_) => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Error(err) => err.to_string(),
            Self::Delayed { message } => message.clone(),
        }
    }

    /// Serializable summary for status output.
    pub fn summary(&self) -> RequeueSummary {
        RequeueSummary {
            kind: if self.is_delayed() { "delayed" } else { "error" },
            message: self.message(),
        }
    }
}

impl fmt::Display for Requeue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(err) => write!(f, "error: {}", err),
            Self::Delayed { message } => write!(f, "delayed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequeueSummary {
    pub kind: &'static str,
    pub message: String,
}
