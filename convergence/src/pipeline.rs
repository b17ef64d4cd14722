//! Reconciliation step pipeline.
//!
//! A pass runs every step in order against the same cluster status:
//!
//! ```text
//! step 1 ──None──▶ step 2 ──Delayed──▶ step 3 ──Error──▶ stop
//!                             │
//!                             └─ remembered, pass continues
//! ```
//!
//! A delayed requeue does not stop the pass, so unrelated concerns still make
//! progress while one step waits. An error stops the pass immediately.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::admin::AdminClientProvider;
use crate::cluster::ClusterState;
use crate::config::OperatorConfig;
use crate::error::ReconcileError;
use crate::events::EventRecorder;
use crate::lock::LockClient;
use crate::requeue::Requeue;

/// Collaborators shared by every step of a pass.
#[derive(Clone)]
pub struct ReconcileContext {
    pub admin: Arc<dyn AdminClientProvider>,
    pub locks: Arc<dyn LockClient>,
    pub events: Arc<dyn EventRecorder>,
    pub config: OperatorConfig,
}

impl ReconcileContext {
    pub fn new(
        admin: Arc<dyn AdminClientProvider>,
        locks: Arc<dyn LockClient>,
        events: Arc<dyn EventRecorder>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            admin,
            locks,
            events,
            config,
        }
    }
}

/// One unit of reconciliation work.
///
/// Steps hold no state between invocations and must be safe to run
/// repeatedly.
#[async_trait]
pub trait ReconcileStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reconcile(&self, ctx: &ReconcileContext, cluster: &dyn ClusterState)
        -> Option<Requeue>;
}

/// Result of a full pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every step reported nothing to do.
    Converged,
    /// At least one step asked for a delayed requeue and none failed.
    Delayed {
        after: Duration,
        /// `(step, message)` for each waiting step, in pipeline order.
        waiting: Vec<(&'static str, String)>,
    },
    /// A step failed; later steps did not run.
    Failed {
        step: &'static str,
        error: ReconcileError,
    },
}

impl PassOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// Ordered list of reconciliation steps.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn ReconcileStep>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: impl ReconcileStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Runs every step once against `cluster`.
    pub async fn run(&self, ctx: &ReconcileContext, cluster: &dyn ClusterState) -> PassOutcome {
        let cluster_ref = cluster.cluster_ref();
        let mut waiting = Vec::new();

        for step in &self.steps {
            debug!(cluster = %cluster_ref, step = step.name(), "Running reconcile step");
            match step.reconcile(ctx, cluster).await {
                None => {}
                Some(Requeue::Delayed { message }) => {
                    info!(
                        cluster = %cluster_ref,
                        step = step.name(),
                        message = %message,
                        "Step requested delayed requeue"
                    );
                    waiting.push((step.name(), message));
                }
                Some(Requeue::Error(error)) => {
                    warn!(
                        cluster = %cluster_ref,
                        step = step.name(),
                        error = %error,
                        "Step failed"
                    );
                    return PassOutcome::Failed {
                        step: step.name(),
                        error,
                    };
                }
            }
        }

        if waiting.is_empty() {
            PassOutcome::Converged
        } else {
            PassOutcome::Delayed {
                after: ctx.config.requeue.delayed_requeue(),
                waiting,
            }
        }
    }
}
