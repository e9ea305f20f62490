// Cluster configuration, loaded from JSON

use crate::{Error, Result};
use leasepool::config::{DEFAULT_LEASE_DURATION, DEFAULT_RENEW_DEADLINE, DEFAULT_RETRY_PERIOD};
use leasepool::{record::DEFAULT_NAMESPACE, Identity, LeaseConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Process-wide settings. Every field has a default, so an empty JSON
/// object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Free-form name, only used in logs and status output
    pub cluster_name: String,

    pub election: ElectionConfig,

    /// Address the status endpoint listens on
    pub status_addr: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: "steward".to_string(),
            election: ElectionConfig::default(),
            status_addr: "127.0.0.1:9443".to_string(),
        }
    }
}

impl ClusterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.election
            .lease_config()
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        if self.status_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(Error::Config(format!(
                "status_addr {:?} is not a socket address",
                self.status_addr
            )));
        }
        Ok(())
    }
}

/// Lease settings shared by every elector in the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    pub namespace: String,

    /// Holder identity; generated per elector when unset
    pub identity: Option<String>,

    pub lease_duration_secs: u64,
    pub renew_deadline_secs: u64,
    pub retry_period_secs: u64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            identity: None,
            lease_duration_secs: DEFAULT_LEASE_DURATION.as_secs(),
            renew_deadline_secs: DEFAULT_RENEW_DEADLINE.as_secs(),
            retry_period_secs: DEFAULT_RETRY_PERIOD.as_secs(),
        }
    }
}

impl ElectionConfig {
    pub fn lease_config(&self) -> LeaseConfig {
        let identity = match &self.identity {
            Some(id) => Identity::new(id.clone()),
            None => Identity::generate(),
        };
        LeaseConfig::default()
            .with_namespace(self.namespace.clone())
            .with_identity(identity)
            .with_lease_duration(Duration::from_secs(self.lease_duration_secs))
            .with_renew_deadline(Duration::from_secs(self.renew_deadline_secs))
            .with_retry_period(Duration::from_secs(self.retry_period_secs))
    }
}
