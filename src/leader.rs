//! Leader election using Kubernetes Leases
//!
//! With several replicas running, only the holder of a
//! coordination.k8s.io/v1 Lease runs the Tenant controller. Writes carry the
//! Lease's resourceVersion, so two candidates racing for the same Lease see a
//! 409 Conflict and only one of them wins.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::{Error, Result};

// Timing follows the usual controller defaults
const LEASE_DURATION: Duration = Duration::from_secs(15);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// What a candidate should do with the Lease as it currently stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseDecision {
    /// Nobody holds a live Lease; take it
    Acquire,
    /// We hold it; extend it
    Renew,
    /// Someone else holds a live Lease
    Wait,
}

/// Decide how `identity` should treat the Lease spec `current` at `now`
pub fn decide(current: Option<&LeaseSpec>, identity: &str, now: DateTime<Utc>) -> LeaseDecision {
    let Some(spec) = current else {
        return LeaseDecision::Acquire;
    };

    match spec.holder_identity.as_deref() {
        Some(holder) if holder == identity => LeaseDecision::Renew,
        // Released by its last holder
        None | Some("") => LeaseDecision::Acquire,
        Some(_) => {
            let expired = match (spec.renew_time.as_ref(), spec.lease_duration_seconds) {
                (Some(renewed), Some(seconds)) => {
                    now > renewed.0 + chrono::Duration::seconds(i64::from(seconds))
                }
                _ => true,
            };
            if expired {
                LeaseDecision::Acquire
            } else {
                LeaseDecision::Wait
            }
        }
    }
}

/// Lease spec after `identity` acquires or renews `current` at `now`
pub fn claim(
    current: Option<&LeaseSpec>,
    identity: &str,
    now: DateTime<Utc>,
    lease_duration: Duration,
) -> LeaseSpec {
    let duration = i32::try_from(lease_duration.as_secs()).unwrap_or(i32::MAX);
    let transitions = current.and_then(|s| s.lease_transitions).unwrap_or(0);

    match current {
        Some(spec) if spec.holder_identity.as_deref() == Some(identity) => LeaseSpec {
            renew_time: Some(MicroTime(now)),
            lease_duration_seconds: Some(duration),
            ..spec.clone()
        },
        _ => LeaseSpec {
            holder_identity: Some(identity.to_string()),
            lease_duration_seconds: Some(duration),
            acquire_time: Some(MicroTime(now)),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(if current.is_some() {
                transitions + 1
            } else {
                0
            }),
            ..Default::default()
        },
    }
}

/// Acquires and holds the operator's leader Lease
pub struct LeaderElector {
    api: Api<Lease>,
    lease_name: String,
    identity: String,
    lease_duration: Duration,
    renew_interval: Duration,
    retry_interval: Duration,
}

impl LeaderElector {
    /// Create an elector for the Lease named in `config`
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            api: Api::namespaced(client, &config.lease_namespace),
            lease_name: config.lease_name.clone(),
            identity: config.identity.clone(),
            lease_duration: LEASE_DURATION,
            renew_interval: RENEW_INTERVAL,
            retry_interval: RETRY_INTERVAL,
        }
    }

    /// Block until this replica holds the Lease
    pub async fn acquire(&self) {
        info!(
            identity = %self.identity,
            lease = %self.lease_name,
            "Waiting for leadership"
        );

        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Leadership acquired");
                    return;
                }
                Ok(false) => debug!(identity = %self.identity, "Lease held by another replica"),
                Err(e) => warn!(identity = %self.identity, error = %e, "Failed to acquire lease"),
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    /// Keep renewing the Lease until `shutdown` is cancelled.
    ///
    /// Returns an error once leadership is lost, either to another replica or
    /// because renewals kept failing for a whole lease duration.
    pub async fn hold(&self, shutdown: CancellationToken) -> Result<()> {
        let mut renewed = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.renew_interval) => {}
            }

            match self.try_acquire_or_renew().await {
                Ok(true) => renewed = Instant::now(),
                Ok(false) => {
                    return Err(Error::LeaderElectionError(format!(
                        "lease {} was taken over",
                        self.lease_name
                    )))
                }
                Err(e) if renewed.elapsed() < self.lease_duration => {
                    warn!(identity = %self.identity, error = %e, "Failed to renew lease");
                }
                Err(e) => {
                    return Err(Error::LeaderElectionError(format!(
                        "lease {} expired while renewals failed: {}",
                        self.lease_name, e
                    )))
                }
            }
        }
    }

    /// Hand the Lease back so a standby can take over without waiting for it
    /// to expire
    pub async fn release(&self) -> Result<()> {
        let Some(mut lease) = self.api.get_opt(&self.lease_name).await? else {
            return Ok(());
        };

        let Some(spec) = lease.spec.as_mut() else {
            return Ok(());
        };
        if spec.holder_identity.as_deref() != Some(self.identity.as_str()) {
            debug!(identity = %self.identity, "Not the lease holder, nothing to release");
            return Ok(());
        }
        spec.holder_identity = None;

        match self
            .api
            .replace(&self.lease_name, &PostParams::default(), &lease)
            .await
        {
            Ok(_) => {
                info!(identity = %self.identity, "Lease released");
                Ok(())
            }
            // Already taken by someone else
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<bool> {
        let now = Utc::now();
        let existing = self.api.get_opt(&self.lease_name).await?;
        let current = existing.as_ref().and_then(|lease| lease.spec.as_ref());

        let decision = decide(current, &self.identity, now);
        if decision == LeaseDecision::Wait {
            return Ok(false);
        }
        let desired = claim(current, &self.identity, now, self.lease_duration);

        let result = match existing {
            None => {
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(self.lease_name.clone()),
                        ..Default::default()
                    },
                    spec: Some(desired),
                };
                self.api.create(&PostParams::default(), &lease).await
            }
            // Replacing with the read resourceVersion fails if anyone wrote since
            Some(mut lease) => {
                lease.spec = Some(desired);
                self.api
                    .replace(&self.lease_name, &PostParams::default(), &lease)
                    .await
            }
        };

        match result {
            Ok(_) => {
                debug!(identity = %self.identity, ?decision, "Lease written");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "Lost a race for the lease");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
