//! Exclusion candidate selection.
//!
//! An address is a candidate iff its group is marked for removal, the group
//! is not yet confirmed excluded, and the address is not already in the live
//! exclusion list. A bare-IP exclusion covers every process on that machine,
//! so an address also counts as excluded when its IP alone is listed. Each
//! address of a multi-address group is judged on its own, so a partially
//! excluded group only contributes what is left.

use std::collections::{BTreeSet, HashSet};
use tracing::info;

use crate::admin::{AdminResult, AdminSession};
use crate::cluster::{format_addresses, ProcessAddress, ProcessClass, ProcessGroup};

/// Addresses to exclude in this pass and the classes they belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionCandidates {
    /// In process-group order, without duplicates.
    pub addresses: Vec<ProcessAddress>,
    pub process_classes: BTreeSet<ProcessClass>,
}

impl ExclusionCandidates {
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }
}

/// Number of process groups marked for removal.
pub fn removal_count(groups: &[ProcessGroup]) -> usize {
    groups.iter().filter(|g| g.is_marked_for_removal()).count()
}

/// Whether `address` is covered by the live exclusion list, either exactly
/// or through an exclusion of its whole machine.
pub fn is_already_excluded(address: &ProcessAddress, current: &HashSet<ProcessAddress>) -> bool {
    current.contains(address) || current.contains(&address.ip_only())
}

/// Pure candidate selection against an already fetched exclusion list.
pub fn select_candidates(
    groups: &[ProcessGroup],
    current_exclusions: &HashSet<ProcessAddress>,
) -> ExclusionCandidates {
    let mut candidates = ExclusionCandidates::default();
    let mut seen = HashSet::new();

    for group in groups {
        for address in &group.addresses {
            if is_already_excluded(address, current_exclusions) {
                continue;
            }

            if group.is_marked_for_removal() && !group.is_excluded() && seen.insert(address) {
                candidates.addresses.push(address.clone());
                candidates.process_classes.insert(group.process_class);
            }
        }
    }

    candidates
}

/// Fetches the live exclusion list once and selects candidates.
///
/// Makes no admin call when no group is marked for removal.
pub async fn build_exclusion_candidates(
    session: &AdminSession,
    groups: &[ProcessGroup],
) -> AdminResult<ExclusionCandidates> {
    if removal_count(groups) == 0 {
        return Ok(ExclusionCandidates::default());
    }

    let exclusions = session.get_exclusions().await?;
    info!(exclusions = %format_addresses(&exclusions), "Current exclusions");
    let current: HashSet<ProcessAddress> = exclusions.into_iter().collect();

    Ok(select_candidates(groups, &current))
}
