//! Leader elector component.
//!
//! Contends for one well-known lease and keeps an atomically readable flag
//! telling whether this process currently holds it. Singleton duties check
//! [`LeaderElector::is_leader`] before doing any work.

use crate::{component::Component, config::ClusterConfig, factory::ClientFactory, Error, Result};
use async_trait::async_trait;
use leasepool::{CancelHandle, EventStream, Identity, LeaseConfig, LeasePool};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

/// Lease guarding the endpoint reconciler
pub const ENDPOINT_RECONCILER_LEASE: &str = "steward-endpoint-reconciler";

pub trait LeaderElector: Component {
    /// Most recently observed leadership. Never blocks.
    ///
    /// May lag the shared store by up to one renew deadline plus the time
    /// it takes to deliver the event.
    fn is_leader(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectorState {
    NotStarted,
    Starting,
    Watching,
    Stopped,
}

pub struct LeaseElector {
    cluster_config: ClusterConfig,
    lease_name: String,
    lease_config: LeaseConfig,
    client_factory: Arc<dyn ClientFactory>,
    // Written only by the event loop
    leader_status: Arc<AtomicBool>,
    state: Mutex<ElectorState>,
    lease_cancel: Mutex<Option<CancelHandle>>,
}

impl LeaseElector {
    /// Creates an elector for [`ENDPOINT_RECONCILER_LEASE`]. Performs no I/O.
    pub fn new(cluster_config: ClusterConfig, client_factory: Arc<dyn ClientFactory>) -> Self {
        let lease_config = cluster_config.election.lease_config();
        Self {
            cluster_config,
            lease_name: ENDPOINT_RECONCILER_LEASE.to_string(),
            lease_config,
            client_factory,
            leader_status: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(ElectorState::NotStarted),
            lease_cancel: Mutex::new(None),
        }
    }

    /// Binds the elector to a different lease, for other singleton duties.
    #[must_use]
    pub fn with_lease_name(mut self, lease_name: impl Into<String>) -> Self {
        self.lease_name = lease_name.into();
        self
    }

    pub fn lease_name(&self) -> &str {
        &self.lease_name
    }

    pub fn identity(&self) -> &Identity {
        &self.lease_config.identity
    }

    pub fn cluster_config(&self) -> &ClusterConfig {
        &self.cluster_config
    }

    pub fn state(&self) -> ElectorState {
        *self.state.lock()
    }

    fn start_watch(&self) -> Result<(EventStream, CancelHandle)> {
        let store = self.client_factory.create().map_err(Error::ClientFactory)?;
        let pool = LeasePool::new(store, self.lease_name.clone(), self.lease_config.clone())?
            .with_span(tracing::Span::current());
        Ok(pool.watch()?)
    }
}

#[async_trait]
impl Component for LeaseElector {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Starts contending for the lease and returns without waiting for it.
    async fn run(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != ElectorState::NotStarted {
                return Err(Error::AlreadyStarted);
            }
            *state = ElectorState::Starting;
        }

        let span = info_span!(
            "leader_elector",
            component = "leader-elector",
            lease = %self.lease_name,
            identity = %self.lease_config.identity,
        );

        let (events, cancel) = match span.in_scope(|| self.start_watch()) {
            Ok(watch) => watch,
            Err(e) => {
                *self.state.lock() = ElectorState::Stopped;
                return Err(e);
            }
        };

        *self.lease_cancel.lock() = Some(cancel);
        tokio::spawn(consume_events(events, self.leader_status.clone()).instrument(span));
        *self.state.lock() = ElectorState::Watching;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(cancel) = self.lease_cancel.lock().take() {
            cancel.cancel();
            *self.state.lock() = ElectorState::Stopped;
        }
        Ok(())
    }

    async fn healthy(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "leader-elector"
    }
}

impl LeaderElector for LeaseElector {
    fn is_leader(&self) -> bool {
        self.leader_status.load(Ordering::SeqCst)
    }
}

/// Applies lease events to the flag, in delivery order, until the stream
/// closes.
async fn consume_events(mut events: EventStream, leader_status: Arc<AtomicBool>) {
    loop {
        tokio::select! {
            Some(()) = events.acquired_lease.recv() => {
                info!("acquired leader lease");
                leader_status.store(true, Ordering::SeqCst);
            }
            Some(()) = events.lost_lease.recv() => {
                info!("lost leader lease");
                leader_status.store(false, Ordering::SeqCst);
            }
            else => break,
        }
    }
    debug!("leader lease events closed");
}
