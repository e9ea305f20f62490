// Lease record as persisted in the shared store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "kube-node-lease";

/// Address of a lease record: `namespace/name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseKey {
    pub namespace: String,
    pub name: String,
}

impl LeaseKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Ownership record for one lease
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Current holder; empty when the lease has been released
    pub holder_identity: String,

    /// How long other contenders must wait after the last observed change
    pub lease_duration_secs: u32,

    /// When the current holder first acquired the lease
    pub acquire_time: DateTime<Utc>,

    /// Last successful renewal by the current holder
    pub renew_time: DateTime<Utc>,

    /// Number of times the lease changed hands
    pub leader_transitions: u32,
}

impl LeaseRecord {
    /// A fresh record held by `holder`
    pub fn new(holder: impl Into<String>, lease_duration: Duration, now: DateTime<Utc>) -> Self {
        Self {
            holder_identity: holder.into(),
            lease_duration_secs: duration_secs(lease_duration),
            acquire_time: now,
            renew_time: now,
            leader_transitions: 0,
        }
    }

    pub fn is_released(&self) -> bool {
        self.holder_identity.is_empty()
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        !self.is_released() && self.holder_identity == holder
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.lease_duration_secs))
    }
}

/// A value together with the store version it was read at.
///
/// The version is the compare-and-swap token passed back on update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Whole seconds, rounded up so sub-second durations never become zero.
pub(crate) fn duration_secs(duration: Duration) -> u32 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}
