// Lease timing and identity settings

use crate::{record::DEFAULT_NAMESPACE, Error, Identity, Result};
use std::time::Duration;

/// How long a lease is valid after its holder was last observed renewing
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(60);

/// How long the holder keeps retrying a failed renewal before giving up
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(15);

/// Interval between acquire/renew attempts
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(5);

/// Upper bound of the random extra wait added to acquire attempts,
/// as a multiple of the retry period
pub const JITTER_FACTOR: f64 = 1.2;

/// Settings for one lease pool
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    pub namespace: String,
    pub identity: Identity,
    pub lease_duration: Duration,
    pub renew_deadline: Duration,
    pub retry_period: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            identity: Identity::generate(),
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
        }
    }
}

impl LeaseConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_lease_duration(mut self, duration: Duration) -> Self {
        self.lease_duration = duration;
        self
    }

    pub fn with_renew_deadline(mut self, deadline: Duration) -> Self {
        self.renew_deadline = deadline;
        self
    }

    pub fn with_retry_period(mut self, period: Duration) -> Self {
        self.retry_period = period;
        self
    }

    /// Checks the timing relation that keeps two holders from overlapping:
    /// a holder must give up (renew deadline) before others may take over
    /// (lease duration), and must get more than one jittered attempt in
    /// before giving up.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::InvalidConfig("namespace must not be empty".into()));
        }
        if self.identity.as_str().is_empty() {
            return Err(Error::InvalidConfig("identity must not be empty".into()));
        }
        if self.lease_duration.is_zero()
            || self.renew_deadline.is_zero()
            || self.retry_period.is_zero()
        {
            return Err(Error::InvalidConfig("lease timings must be positive".into()));
        }
        if self.lease_duration <= self.renew_deadline {
            return Err(Error::InvalidConfig(format!(
                "lease duration {:?} must be greater than renew deadline {:?}",
                self.lease_duration, self.renew_deadline
            )));
        }
        if self.renew_deadline <= self.retry_period.mul_f64(JITTER_FACTOR) {
            return Err(Error::InvalidConfig(format!(
                "renew deadline {:?} must be greater than {JITTER_FACTOR} * retry period {:?}",
                self.renew_deadline, self.retry_period
            )));
        }
        Ok(())
    }
}
