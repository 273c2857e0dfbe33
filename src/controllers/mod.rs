//! Controller implementations for watching and reconciling resources

pub mod backoff;
pub mod tenant_controller;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::Config;
use crate::controllers::backoff::Backoff;
use crate::store::ClusterStore;

/// Retry bookkeeping for one incarnation of a Tenant
#[derive(Debug)]
struct RetryState {
    uid: Option<String>,
    generation: i64,
    backoff: Backoff,
    parked: bool,
}

/// Shared context for controllers
pub struct Context {
    /// Access to the cluster API
    pub store: Arc<dyn ClusterStore>,
    /// Operator configuration
    pub config: Config,
    retries: Mutex<HashMap<String, RetryState>>,
}

impl Context {
    /// Create a new context
    pub fn new(store: Arc<dyn ClusterStore>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            retries: Mutex::new(HashMap::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RetryState>> {
        self.retries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fresh_state(&self, uid: Option<&str>, generation: i64) -> RetryState {
        RetryState {
            uid: uid.map(str::to_string),
            generation,
            backoff: Backoff::new(self.config.retry_base_delay, self.config.retry_max_delay),
            parked: false,
        }
    }

    /// Record the object a pass is about to work on and report whether it is
    /// parked after a terminal failure.
    ///
    /// A newer generation, or a different UID because the Tenant was deleted
    /// and recreated under the same name, starts from a clean slate.
    pub fn observe(&self, name: &str, uid: Option<&str>, generation: i64) -> bool {
        let mut retries = self.lock();
        let fresh = self.fresh_state(uid, generation);
        let state = retries.entry(name.to_string()).or_insert(fresh);

        if state.uid.as_deref() != uid || generation > state.generation {
            *state = self.fresh_state(uid, generation);
        }
        state.parked
    }

    /// Next delay of the Tenant's backoff sequence
    pub fn next_retry_delay(&self, name: &str) -> Duration {
        self.lock()
            .get_mut(name)
            .map(|state| state.backoff.next_delay())
            .unwrap_or(self.config.retry_base_delay)
    }

    /// A pass converged; backoff starts over
    pub fn succeeded(&self, name: &str) {
        if let Some(state) = self.lock().get_mut(name) {
            state.backoff.reset();
            state.parked = false;
        }
    }

    /// Stop retrying the current generation until the spec changes
    pub fn park(&self, name: &str) {
        if let Some(state) = self.lock().get_mut(name) {
            state.parked = true;
        }
    }

    /// Drop everything known about a deleted Tenant
    pub fn forget(&self, name: &str) {
        self.lock().remove(name);
    }

    /// Number of Tenants with retry bookkeeping
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }
}
