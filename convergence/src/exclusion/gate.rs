//! Quorum gate for new exclusions.
//!
//! Blocks excluding more processes of a class while too many of the class's
//! remaining members (those not marked for removal) are missing. A class may
//! proceed when either
//!
//! ```text
//! valid >= desired - 1            (one removal in flight is tolerated)
//! valid >= ceil(desired * threshold)
//! ```
//!
//! The first term keeps tiny classes (desired = 1) from blocking forever.
//! If the desired counts cannot be derived the gate stays closed.

use serde::Serialize;
use tracing::{error, info};

use crate::cluster::{ClusterState, ProcessClass};
use crate::config::GateConfig;

/// Outcome of the quorum gate for one process class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuorumDecision {
    pub process_class: ProcessClass,
    pub can_exclude: bool,
    /// Ids of non-removal groups of this class that are missing, in status order.
    pub missing: Vec<String>,
    pub valid_count: usize,
    /// `None` when the desired counts could not be derived.
    pub desired_count: Option<u32>,
}

impl QuorumDecision {
    /// `[id id ...]` rendering of the missing groups.
    pub fn missing_list(&self) -> String {
        format!("[{}]", self.missing.join(" "))
    }
}

/// Whether `valid` healthy processes suffice for a class wanting `desired`.
pub fn quorum_allows(valid: usize, desired: u32, threshold: f64) -> bool {
    let valid = valid as i64;
    let desired = i64::from(desired);
    let required = (desired as f64 * threshold).ceil() as i64;
    valid >= desired - 1 || valid >= required
}

/// Runs the quorum gate for `process_class`.
pub fn can_exclude_new_processes(
    cluster: &dyn ClusterState,
    process_class: ProcessClass,
    config: &GateConfig,
) -> QuorumDecision {
    let cluster_ref = cluster.cluster_ref();
    let mut missing = Vec::new();
    let mut valid_count = 0usize;

    for group in cluster.process_groups() {
        if group.is_marked_for_removal() || group.process_class != process_class {
            continue;
        }

        if group.is_missing() {
            info!(
                namespace = %cluster_ref.namespace,
                cluster = %cluster_ref.name,
                reconciler = "exclude_processes",
                process_group_id = %group.process_group_id,
                "Missing processes"
            );
            missing.push(group.process_group_id.clone());
            continue;
        }

        valid_count += 1;
    }

    let desired_count = match cluster.desired_process_counts() {
        Ok(counts) => counts.count(process_class),
        Err(e) => {
            error!(
                namespace = %cluster_ref.namespace,
                cluster = %cluster_ref.name,
                reconciler = "exclude_processes",
                error = %e,
                "Error calculating process counts"
            );
            return QuorumDecision {
                process_class,
                can_exclude: false,
                missing,
                valid_count,
                desired_count: None,
            };
        }
    };

    QuorumDecision {
        process_class,
        can_exclude: quorum_allows(
            valid_count,
            desired_count,
            config.missing_process_threshold,
        ),
        missing,
        valid_count,
        desired_count: Some(desired_count),
    }
}
