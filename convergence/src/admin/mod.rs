//! Database administration port.
//!
//! The exclusion step talks to the database only through [`AdminClient`].
//! Failures are tagged so callers can tell a timeout (the request may still be
//! running server-side) from every other failure without inspecting messages.
//!
//! Sessions are scoped: [`AdminSession`] closes its client exactly once, on
//! [`AdminSession::close`] or on drop, so every exit path of a reconcile
//! (including an abandoned future) releases the connection.

pub mod mock;

pub use mock::{MockAdminClient, MockAdminProvider};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cluster::{ClusterRef, ProcessAddress};

/// Result type for admin operations
pub type AdminResult<T> = Result<T, AdminError>;

/// Errors reported by the admin interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    /// The call did not complete in time. The operation may still finish.
    #[error("{operation} timed out: {detail}")]
    Timeout { operation: String, detail: String },

    #[error("cannot connect to {cluster}: {detail}")]
    Connection { cluster: String, detail: String },

    #[error("{operation} rejected by database: {detail}")]
    Rejected { operation: String, detail: String },

    #[error("{operation} failed: {detail}")]
    Other { operation: String, detail: String },
}

impl AdminError {
    pub fn timeout(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn connection(cluster: &ClusterRef, detail: impl Into<String>) -> Self {
        Self::Connection {
            cluster: cluster.to_string(),
            detail: detail.into(),
        }
    }

    pub fn other(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Other {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Administrative operations on one cluster's database.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Addresses currently excluded in the database.
    async fn get_exclusions(&self) -> AdminResult<Vec<ProcessAddress>>;

    /// Excludes all `addresses` in a single request.
    async fn exclude_processes(&self, addresses: &[ProcessAddress]) -> AdminResult<()>;

    /// Releases the underlying connection.
    fn close(&mut self) -> AdminResult<()>;
}

/// Opens admin clients for clusters.
#[async_trait]
pub trait AdminClientProvider: Send + Sync {
    async fn admin_client(&self, cluster: &ClusterRef) -> AdminResult<Box<dyn AdminClient>>;
}

/// Scoped admin connection. Closed on drop if not closed explicitly.
pub struct AdminSession {
    cluster: ClusterRef,
    client: Option<Box<dyn AdminClient>>,
}

impl AdminSession {
    /// Opens a session through `provider`.
    pub async fn open(
        provider: &dyn AdminClientProvider,
        cluster: &ClusterRef,
    ) -> AdminResult<Self> {
        let client = provider.admin_client(cluster).await?;
        debug!(cluster = %cluster, "Admin session opened");
        Ok(Self {
            cluster: cluster.clone(),
            client: Some(client),
        })
    }

    /// Borrow the client. `None` only after the session has been closed,
    /// which consumes it, so callers always see `Some`.
    fn client(&self) -> Option<&dyn AdminClient> {
        self.client.as_deref()
    }

    pub async fn get_exclusions(&self) -> AdminResult<Vec<ProcessAddress>> {
        match self.client() {
            Some(client) => client.get_exclusions().await,
            None => Err(AdminError::other("get_exclusions", "session closed")),
        }
    }

    pub async fn exclude_processes(&self, addresses: &[ProcessAddress]) -> AdminResult<()> {
        match self.client() {
            Some(client) => client.exclude_processes(addresses).await,
            None => Err(AdminError::other("exclude_processes", "session closed")),
        }
    }

    /// Closes the session and reports any close error.
    pub fn close(mut self) -> AdminResult<()> {
        self.release()
    }

    fn release(&mut self) -> AdminResult<()> {
        match self.client.take() {
            Some(mut client) => {
                debug!(cluster = %self.cluster, "Admin session closed");
                client.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for AdminSession {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(cluster = %self.cluster, error = %e, "Failed to close admin session");
        }
    }
}
