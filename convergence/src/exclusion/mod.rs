//! Safe process exclusion.
//!
//! * [`builder`]: which addresses still need excluding.
//! * [`gate`]: whether each affected process class can afford it.
//! * [`step`]: the reconciliation step tying both to the lock and admin ports.

pub mod builder;
pub mod gate;
pub mod step;

pub use builder::{
    build_exclusion_candidates, is_already_excluded, removal_count, select_candidates,
    ExclusionCandidates,
};
pub use gate::{can_exclude_new_processes, quorum_allows, QuorumDecision};
pub use step::ExcludeProcesses;
