//! Operator configuration loaded from environment variables

use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Name of the Lease used for leader election
pub const LEADER_ELECTION_ID: &str = "tenant-operator.platform.xyz.com";

/// Operator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of parallel reconciliation workers
    pub workers: usize,
    /// Interval between full resyncs of every Tenant
    pub resync_interval: Duration,
    /// First retry delay after a transient failure
    pub retry_base_delay: Duration,
    /// Upper bound of the retry delay
    pub retry_max_delay: Duration,
    /// Deadline for every call to the cluster API
    pub call_timeout: Duration,
    /// Port of the metrics and health server
    pub metrics_port: u16,
    /// Only reconcile while holding the leader Lease
    pub leader_elect: bool,
    /// Name of the leader Lease
    pub lease_name: String,
    /// Namespace of the leader Lease
    pub lease_namespace: String,
    /// Holder identity written into the Lease
    pub identity: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 4,
            resync_interval: Duration::from_secs(300),
            retry_base_delay: Duration::from_millis(1000),
            retry_max_delay: Duration::from_secs(300),
            call_timeout: Duration::from_secs(10),
            metrics_port: 8080,
            leader_elect: false,
            lease_name: LEADER_ELECTION_ID.to_string(),
            lease_namespace: "default".to_string(),
            identity: "tenant-operator".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Config {
            workers: parse_var(&lookup, "WORKER_COUNT")?.unwrap_or(defaults.workers),
            resync_interval: parse_var(&lookup, "RESYNC_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.resync_interval),
            retry_base_delay: parse_var(&lookup, "RETRY_BASE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
            retry_max_delay: parse_var(&lookup, "RETRY_MAX_DELAY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_max_delay),
            call_timeout: parse_var(&lookup, "CALL_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.call_timeout),
            metrics_port: parse_var(&lookup, "METRICS_PORT")?.unwrap_or(defaults.metrics_port),
            leader_elect: parse_var(&lookup, "LEADER_ELECT")?.unwrap_or(defaults.leader_elect),
            lease_name: lookup("LEASE_NAME").unwrap_or(defaults.lease_name),
            lease_namespace: lookup("LEASE_NAMESPACE")
                .or_else(|| lookup("POD_NAMESPACE"))
                .unwrap_or(defaults.lease_namespace),
            identity: lookup("POD_NAME")
                .or_else(|| lookup("HOSTNAME"))
                .unwrap_or(defaults.identity),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("WORKER_COUNT must be at least 1");
        }
        if self.resync_interval.is_zero() {
            bail!("RESYNC_INTERVAL_SECS must be at least 1");
        }
        if self.retry_base_delay.is_zero() {
            bail!("RETRY_BASE_DELAY_MS must be at least 1");
        }
        if self.retry_max_delay < self.retry_base_delay {
            bail!("RETRY_MAX_DELAY_SECS must not be below RETRY_BASE_DELAY_MS");
        }
        if self.call_timeout.is_zero() {
            bail!("CALL_TIMEOUT_SECS must be at least 1");
        }
        if self.leader_elect && (self.lease_name.is_empty() || self.lease_namespace.is_empty()) {
            bail!("LEASE_NAME and LEASE_NAMESPACE must be set when LEADER_ELECT is on");
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{} has an invalid value {:?}", key, raw))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        assert_eq!(load(&[]).unwrap(), Config::default());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("WORKER_COUNT", "8"),
            ("RESYNC_INTERVAL_SECS", "60"),
            ("RETRY_BASE_DELAY_MS", "250"),
            ("RETRY_MAX_DELAY_SECS", "30"),
            ("CALL_TIMEOUT_SECS", "5"),
            ("METRICS_PORT", "9090"),
        ])
        .unwrap();

        assert_eq!(config.workers, 8);
        assert_eq!(config.resync_interval, Duration::from_secs(60));
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
        assert_eq!(config.retry_max_delay, Duration::from_secs(30));
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    fn leader_election_is_off_by_default() {
        let config = load(&[]).unwrap();
        assert!(!config.leader_elect);
        assert_eq!(config.lease_name, "tenant-operator.platform.xyz.com");
    }

    #[test]
    fn leader_election_reads_pod_identity() {
        let config = load(&[
            ("LEADER_ELECT", "true"),
            ("POD_NAME", "tenant-operator-7d9f"),
            ("POD_NAMESPACE", "platform-system"),
        ])
        .unwrap();

        assert!(config.leader_elect);
        assert_eq!(config.identity, "tenant-operator-7d9f");
        assert_eq!(config.lease_namespace, "platform-system");
    }

    #[test]
    fn rejects_unparsable_values() {
        let err = load(&[("WORKER_COUNT", "many")]).unwrap_err();
        assert!(err.to_string().contains("WORKER_COUNT"));
    }

    #[test]
    fn rejects_inconsistent_values() {
        assert!(load(&[("WORKER_COUNT", "0")]).is_err());
        assert!(load(&[("RETRY_BASE_DELAY_MS", "5000"), ("RETRY_MAX_DELAY_SECS", "1")]).is_err());
    }
}
