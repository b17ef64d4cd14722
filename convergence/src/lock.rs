//! Cluster-scoped lock port.
//!
//! Exclusions must be issued while holding the cluster lock so they cannot
//! interleave with other mutating reconciliation activity. The lock is never
//! released explicitly: leases expire on their own and the owner may refresh
//! its lease by taking the lock again.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

use crate::cluster::ClusterRef;
use crate::config::LockConfig;

/// Longest lease the local client hands out.
const MAX_LEASE_SECS: u64 = 7 * 24 * 60 * 60;

/// Errors from the lock service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("lock for {cluster} is held by {owner} until {expires_at}")]
    HeldByOther {
        cluster: String,
        owner: String,
        expires_at: DateTime<Utc>,
    },

    #[error("lock for {cluster} was not granted")]
    NotGranted { cluster: String },

    #[error("lock service unavailable: {0}")]
    Unavailable(String),
}

/// Acquires the cluster-scoped lock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockClient: Send + Sync {
    /// Attempts to take the lock for `cluster`. `reason` is recorded with the
    /// lease for operators.
    async fn take_lock(&self, cluster: &ClusterRef, reason: &str) -> Result<bool, LockError>;
}

/// A granted lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: String,
    pub reason: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

type LeaseTable = Arc<Mutex<HashMap<ClusterRef, Lease>>>;

/// In-process lock service.
///
/// Clients created with [`LocalLockClient::instance`] share one lease table
/// and behave like separate operator instances contending for the same lock.
#[derive(Debug, Clone)]
pub struct LocalLockClient {
    owner_id: String,
    use_locks: bool,
    lease_duration: Duration,
    leases: LeaseTable,
}

impl LocalLockClient {
    /// New lock service with a random owner id.
    pub fn new(config: &LockConfig) -> Self {
        Self {
            owner_id: uuid::Uuid::new_v4().to_string(),
            use_locks: config.use_locks,
            lease_duration: Duration::seconds(config.lock_duration_secs.min(MAX_LEASE_SECS) as i64),
            leases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Another client over the same lease table with its own owner id.
    pub fn instance(&self, owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            use_locks: self.use_locks,
            lease_duration: self.lease_duration,
            leases: Arc::clone(&self.leases),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<ClusterRef, Lease>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lease for `cluster`, expired or not.
    pub fn current_lease(&self, cluster: &ClusterRef) -> Option<Lease> {
        self.leases().get(cluster).cloned()
    }

    /// Installs a lease for `owner` directly, bypassing contention checks.
    pub fn seed_lease(&self, cluster: &ClusterRef, owner: &str, reason: &str) {
        let now = Utc::now();
        self.leases().insert(
            cluster.clone(),
            Lease {
                owner: owner.to_string(),
                reason: reason.to_string(),
                acquired_at: now,
                expires_at: now + self.lease_duration,
            },
        );
    }

    fn acquire_at(
        &self,
        cluster: &ClusterRef,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, LockError> {
        let mut leases = self.leases();

        if let Some(existing) = leases.get(cluster) {
            if existing.owner != self.owner_id && !existing.is_expired_at(now) {
                debug!(
                    cluster = %cluster,
                    owner = %existing.owner,
                    expires_at = %existing.expires_at,
                    "Lock held by another owner"
                );
                return Err(LockError::HeldByOther {
                    cluster: cluster.to_string(),
                    owner: existing.owner.clone(),
                    expires_at: existing.expires_at,
                });
            }
        }

        leases.insert(
            cluster.clone(),
            Lease {
                owner: self.owner_id.clone(),
                reason: reason.to_string(),
                acquired_at: now,
                expires_at: now + self.lease_duration,
            },
        );
        info!(cluster = %cluster, owner = %self.owner_id, reason, "Lock acquired");
        Ok(true)
    }
}

#[async_trait]
impl LockClient for LocalLockClient {
    async fn take_lock(&self, cluster: &ClusterRef, reason: &str) -> Result<bool, LockError> {
        if !self.use_locks {
            return Ok(true);
        }
        self.acquire_at(cluster, reason, Utc::now())
    }
}
