//! Error type surfaced by reconciliation steps.

use thiserror::Error;

use crate::admin::AdminError;
use crate::lock::LockError;

/// A failure a step hands back to the scheduler unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    Lock(#[from] LockError),
}
