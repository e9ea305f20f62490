use crate::{
    record::{LeaseKey, LeaseRecord, Versioned},
    store::{InMemoryStore, LeaseStore},
    Identity, LeaseConfig, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::sleep};

/// Short timings that still satisfy the validation rules: 10s lease,
/// 6s renew deadline, 2s retry period.
pub fn fast_config(identity: &str) -> LeaseConfig {
    LeaseConfig::default()
        .with_namespace("test")
        .with_identity(Identity::new(identity))
        .with_lease_duration(Duration::from_secs(10))
        .with_renew_deadline(Duration::from_secs(6))
        .with_retry_period(Duration::from_secs(2))
}

/// Waits up to `within` for the next signal. `None` on timeout or when
/// the channel closed.
pub async fn recv_within(rx: &mut mpsc::Receiver<()>, within: Duration) -> Option<()> {
    tokio::time::timeout(within, rx.recv()).await.ok().flatten()
}

/// Store wrapper that delays every call, simulating a slow or hung link
/// between one replica and the shared store.
#[derive(Debug)]
pub struct SlowStore {
    inner: Arc<InMemoryStore>,
    latency: Mutex<Duration>,
}

impl SlowStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            latency: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            sleep(latency).await;
        }
    }
}

#[async_trait]
impl LeaseStore for SlowStore {
    async fn get(&self, key: &LeaseKey) -> Result<Option<Versioned<LeaseRecord>>> {
        self.delay().await;
        self.inner.get(key).await
    }

    async fn create(&self, key: &LeaseKey, record: LeaseRecord) -> Result<Versioned<LeaseRecord>> {
        self.delay().await;
        self.inner.create(key, record).await
    }

    async fn update(
        &self,
        key: &LeaseKey,
        record: LeaseRecord,
        expected_version: u64,
    ) -> Result<Versioned<LeaseRecord>> {
        self.delay().await;
        self.inner.update(key, record, expected_version).await
    }
}
