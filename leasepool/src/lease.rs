// Lease primitive - conditional acquire, renew and release of one record

use crate::{
    record::{duration_secs, LeaseKey, LeaseRecord, Versioned},
    store::LeaseStore,
    Identity, Result,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// The last record version we saw, and when we first saw it.
///
/// Expiry of a foreign lease is measured from `observed_at` on our own
/// monotonic clock, so wall-clock skew between replicas never shortens or
/// extends someone else's lease.
#[derive(Debug, Clone)]
struct Observation {
    record: Versioned<LeaseRecord>,
    observed_at: Instant,
}

/// Lock over a single named lease record.
#[derive(Debug)]
pub struct LeaseLock {
    store: Arc<dyn LeaseStore>,
    key: LeaseKey,
    identity: Identity,
    lease_duration: Duration,
    observed: Option<Observation>,
}

impl LeaseLock {
    pub fn new(
        store: Arc<dyn LeaseStore>,
        key: LeaseKey,
        identity: Identity,
        lease_duration: Duration,
    ) -> Self {
        Self {
            store,
            key,
            identity,
            lease_duration,
            observed: None,
        }
    }

    pub fn key(&self) -> &LeaseKey {
        &self.key
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Tries to become or stay the holder.
    ///
    /// Returns `Ok(true)` if we hold the lease after the call and `Ok(false)`
    /// if someone else holds a live lease or won a concurrent write. Store
    /// failures are returned as errors.
    pub async fn try_acquire_or_renew(&mut self) -> Result<bool> {
        let now = Utc::now();

        let current = match self.store.get(&self.key).await? {
            Some(current) => current,
            None => {
                let record = LeaseRecord::new(self.identity.as_str(), self.lease_duration, now);
                return match self.store.create(&self.key, record).await {
                    Ok(created) => {
                        self.observe(created);
                        Ok(true)
                    }
                    Err(e) if e.is_conflict() => {
                        debug!(lease = %self.key, "lost race creating lease record");
                        Ok(false)
                    }
                    Err(e) => Err(e),
                };
            }
        };

        if self.observed_version() != Some(current.version) {
            self.observe(current.clone());
        }

        let held_by_me = current.value.is_held_by(self.identity.as_str());
        if !held_by_me && !current.value.is_released() && !self.observed_expired() {
            debug!(
                lease = %self.key,
                holder = %current.value.holder_identity,
                "lease is held by another identity"
            );
            return Ok(false);
        }

        let record = if held_by_me {
            LeaseRecord {
                lease_duration_secs: duration_secs(self.lease_duration),
                renew_time: now,
                ..current.value.clone()
            }
        } else {
            LeaseRecord {
                leader_transitions: current.value.leader_transitions.saturating_add(1),
                ..LeaseRecord::new(self.identity.as_str(), self.lease_duration, now)
            }
        };

        match self.store.update(&self.key, record, current.version).await {
            Ok(updated) => {
                self.observe(updated);
                Ok(true)
            }
            Err(e) if e.is_conflict() => {
                debug!(lease = %self.key, "lease record changed underneath us");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Gives the lease up so contenders need not wait for it to expire.
    ///
    /// Returns `Ok(false)` if we did not hold it or it changed hands first.
    pub async fn release(&mut self) -> Result<bool> {
        let Some(observed) = self.observed.as_ref() else {
            return Ok(false);
        };
        if !observed.record.value.is_held_by(self.identity.as_str()) {
            return Ok(false);
        }

        let now = Utc::now();
        let record = LeaseRecord {
            holder_identity: String::new(),
            lease_duration_secs: 1,
            acquire_time: now,
            renew_time: now,
            leader_transitions: observed.record.value.leader_transitions,
        };

        match self
            .store
            .update(&self.key, record, observed.record.version)
            .await
        {
            Ok(updated) => {
                self.observe(updated);
                Ok(true)
            }
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether the last record we saw names us as holder.
    pub fn holds_lease(&self) -> bool {
        self.observed_record()
            .is_some_and(|record| record.is_held_by(self.identity.as_str()))
    }

    /// Whether the last record we saw names somebody else as holder.
    pub fn is_held_by_other(&self) -> bool {
        self.observed_record().is_some_and(|record| {
            !record.is_released() && !record.is_held_by(self.identity.as_str())
        })
    }

    pub fn observed_record(&self) -> Option<&LeaseRecord> {
        self.observed.as_ref().map(|o| &o.record.value)
    }

    fn observed_version(&self) -> Option<u64> {
        self.observed.as_ref().map(|o| o.record.version)
    }

    fn observed_expired(&self) -> bool {
        match &self.observed {
            Some(o) => o.observed_at + o.record.value.lease_duration() <= Instant::now(),
            None => true,
        }
    }

    fn observe(&mut self, record: Versioned<LeaseRecord>) {
        self.observed = Some(Observation {
            record,
            observed_at: Instant::now(),
        });
    }
}
