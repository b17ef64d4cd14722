//! Exclusion reconciliation step.
//!
//! Per invocation:
//!
//! ```text
//! open admin session ─▶ build candidates ─▶ gate each class ─▶ take lock ─▶ exclude
//!        │                    │                   │               │            │
//!      Error             empty: None         denied: Delayed    Error     timeout: Delayed
//!                                                                          other: Error
//!                                                                          ok: event, None
//! ```
//!
//! The admin session is closed on every path, including when the future is
//! dropped mid-flight. Nothing is mutated before the exclusion call, so an
//! abandoned invocation needs no cleanup.

use async_trait::async_trait;
use tracing::{info, warn};

use super::builder::build_exclusion_candidates;
use super::gate::can_exclude_new_processes;
use crate::admin::AdminSession;
use crate::cluster::{format_addresses, ClusterState};
use crate::events::{ClusterEvent, REASON_EXCLUDING_PROCESSES};
use crate::lock::LockError;
use crate::pipeline::{ReconcileContext, ReconcileStep};
use crate::requeue::Requeue;

/// Excludes the processes of groups marked for removal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExcludeProcesses;

impl ExcludeProcesses {
    pub const NAME: &'static str = "exclude_processes";
}

#[async_trait]
impl ReconcileStep for ExcludeProcesses {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        cluster: &dyn ClusterState,
    ) -> Option<Requeue> {
        let cluster_ref = cluster.cluster_ref();

        let session = match AdminSession::open(ctx.admin.as_ref(), cluster_ref).await {
            Ok(session) => session,
            Err(e) => return Some(Requeue::error(e)),
        };

        let candidates =
            match build_exclusion_candidates(&session, cluster.process_groups()).await {
                Ok(candidates) => candidates,
                Err(e) => return Some(Requeue::error(e)),
            };
        if candidates.is_empty() {
            return None;
        }
        let addresses = format_addresses(&candidates.addresses);

        // Stops at the first class that cannot afford another exclusion.
        for process_class in &candidates.process_classes {
            let decision = can_exclude_new_processes(cluster, *process_class, &ctx.config.gate);
            if !decision.can_exclude {
                info!(
                    namespace = %cluster_ref.namespace,
                    cluster = %cluster_ref.name,
                    reconciler = Self::NAME,
                    process_class = %process_class,
                    valid = decision.valid_count,
                    missing = %decision.missing_list(),
                    "Exclusion blocked by missing processes"
                );
                return Some(Requeue::delayed(format!(
                    "Waiting for missing processes: {}. Addresses to exclude: {}",
                    decision.missing_list(),
                    addresses
                )));
            }
        }

        let reason = format!("excluding processes: {}", addresses);
        match ctx.locks.take_lock(cluster_ref, &reason).await {
            Ok(true) => {}
            Ok(false) => {
                return Some(Requeue::error(LockError::NotGranted {
                    cluster: cluster_ref.to_string(),
                }))
            }
            Err(e) => return Some(Requeue::error(e)),
        }

        info!(
            namespace = %cluster_ref.namespace,
            cluster = %cluster_ref.name,
            reconciler = Self::NAME,
            addresses = %addresses,
            "Excluding processes"
        );

        match session.exclude_processes(&candidates.addresses).await {
            Ok(()) => {
                ctx.events.record(ClusterEvent::normal(
                    cluster_ref,
                    REASON_EXCLUDING_PROCESSES,
                    format!("Excluding {}", addresses),
                ));
                None
            }
            // The exclusion may still be running server-side; back off rather
            // than re-issuing it on the fast cadence.
            Err(e) if e.is_timeout() => {
                info!(
                    namespace = %cluster_ref.namespace,
                    cluster = %cluster_ref.name,
                    reconciler = Self::NAME,
                    error = %e,
                    "Exclusion timed out"
                );
                Some(Requeue::delayed(e.to_string()))
            }
            Err(e) => {
                warn!(
                    namespace = %cluster_ref.namespace,
                    cluster = %cluster_ref.name,
                    reconciler = Self::NAME,
                    error = %e,
                    "Exclusion failed"
                );
                Some(Requeue::error(e))
            }
        }
    }
}
