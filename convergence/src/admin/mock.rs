//! In-memory admin client.
//!
//! Backs the dry-run tool and the test suites. All clients opened from one
//! [`MockAdminProvider`] share the same exclusion list and call counters, so a
//! test can inspect what the step did after the session is gone.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{AdminClient, AdminClientProvider, AdminError, AdminResult};
use crate::cluster::{ClusterRef, ProcessAddress};

#[derive(Debug, Default)]
struct MockAdminState {
    exclusions: BTreeSet<ProcessAddress>,
    exclude_batches: Vec<Vec<ProcessAddress>>,
    get_exclusions_calls: usize,
    open_sessions: usize,
    closed_sessions: usize,
    connect_error: Option<AdminError>,
    get_exclusions_error: Option<AdminError>,
    exclude_error: Option<AdminError>,
}

/// Provider handing out [`MockAdminClient`]s over shared state.
#[derive(Debug, Clone, Default)]
pub struct MockAdminProvider {
    state: Arc<Mutex<MockAdminState>>,
}

impl MockAdminProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockAdminState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds the live exclusion list.
    pub fn with_exclusions<I>(self, addresses: I) -> Self
    where
        I: IntoIterator<Item = ProcessAddress>,
    {
        self.state().exclusions.extend(addresses);
        self
    }

    /// Makes the next session opens fail with `error`.
    pub fn fail_connect(&self, error: AdminError) {
        self.state().connect_error = Some(error);
    }

    /// Makes `get_exclusions` fail with `error` until cleared.
    pub fn fail_get_exclusions(&self, error: AdminError) {
        self.state().get_exclusions_error = Some(error);
    }

    /// Makes `exclude_processes` fail with `error` until cleared.
    pub fn fail_exclude(&self, error: AdminError) {
        self.state().exclude_error = Some(error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.connect_error = None;
        state.get_exclusions_error = None;
        state.exclude_error = None;
    }

    pub fn exclusions(&self) -> BTreeSet<ProcessAddress> {
        self.state().exclusions.clone()
    }

    /// Every accepted or attempted `exclude_processes` request, in order.
    pub fn exclude_batches(&self) -> Vec<Vec<ProcessAddress>> {
        self.state().exclude_batches.clone()
    }

    pub fn exclude_calls(&self) -> usize {
        self.state().exclude_batches.len()
    }

    pub fn get_exclusions_calls(&self) -> usize {
        self.state().get_exclusions_calls
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.state().open_sessions
    }

    pub fn closed_sessions(&self) -> usize {
        self.state().closed_sessions
    }
}

#[async_trait]
impl AdminClientProvider for MockAdminProvider {
    async fn admin_client(&self, _cluster: &ClusterRef) -> AdminResult<Box<dyn AdminClient>> {
        let mut state = self.state();
        if let Some(err) = state.connect_error.clone() {
            return Err(err);
        }
        state.open_sessions += 1;
        Ok(Box::new(MockAdminClient {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

/// Client view over a [`MockAdminProvider`]'s state.
#[derive(Debug)]
pub struct MockAdminClient {
    state: Arc<Mutex<MockAdminState>>,
    closed: bool,
}

impl MockAdminClient {
    fn state(&self) -> MutexGuard<'_, MockAdminState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AdminClient for MockAdminClient {
    async fn get_exclusions(&self) -> AdminResult<Vec<ProcessAddress>> {
        let mut state = self.state();
        state.get_exclusions_calls += 1;
        if let Some(err) = state.get_exclusions_error.clone() {
            return Err(err);
        }
        Ok(state.exclusions.iter().cloned().collect())
    }

    async fn exclude_processes(&self, addresses: &[ProcessAddress]) -> AdminResult<()> {
        let mut state = self.state();
        state.exclude_batches.push(addresses.to_vec());
        if let Some(err) = state.exclude_error.clone() {
            return Err(err);
        }
        state.exclusions.extend(addresses.iter().cloned());
        Ok(())
    }

    fn close(&mut self) -> AdminResult<()> {
        if self.closed {
            return Err(AdminError::other("close", "client already closed"));
        }
        self.closed = true;
        let mut state = self.state();
        state.open_sessions = state.open_sessions.saturating_sub(1);
        state.closed_sessions += 1;
        Ok(())
    }
}
