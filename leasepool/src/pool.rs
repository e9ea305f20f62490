// Lease pool - drives a lease lock in the background and reports transitions

use crate::{
    config::{LeaseConfig, JITTER_FACTOR},
    lease::LeaseLock,
    record::LeaseKey,
    store::LeaseStore,
    Error, Identity, Result,
};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Ownership transitions of one lease.
///
/// `acquired_lease` fires once each time this process becomes the holder and
/// `lost_lease` once each time it stops being the holder, so the two strictly
/// alternate. A signal is only sent after the previous one was received,
/// which keeps the order intact across the two channels. Both channels close
/// when the watch ends; dropping the stream ends the watch and releases the
/// lease.
#[derive(Debug)]
pub struct EventStream {
    pub acquired_lease: mpsc::Receiver<()>,
    pub lost_lease: mpsc::Receiver<()>,
}

/// Stops a lease watch. Cloneable; cancelling more than once has no
/// further effect. Dropping every handle without cancelling leaves the
/// watch running.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Contends for one named lease on behalf of this process.
#[derive(Debug)]
pub struct LeasePool {
    key: LeaseKey,
    config: LeaseConfig,
    parent_span: Option<Span>,
    // Taken by the first call to `watch`
    lock: Mutex<Option<LeaseLock>>,
}

impl LeasePool {
    /// Creates a pool for `name`. Performs no I/O.
    pub fn new(
        store: Arc<dyn LeaseStore>,
        name: impl Into<String>,
        config: LeaseConfig,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidConfig("lease name must not be empty".into()));
        }
        config.validate()?;

        let key = LeaseKey::new(config.namespace.clone(), name);
        let lock = LeaseLock::new(
            store,
            key.clone(),
            config.identity.clone(),
            config.lease_duration,
        );

        Ok(Self {
            key,
            config,
            parent_span: None,
            lock: Mutex::new(Some(lock)),
        })
    }

    /// Logs from the watch task are emitted inside a child of `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.parent_span = Some(span);
        self
    }

    pub fn key(&self) -> &LeaseKey {
        &self.key
    }

    pub fn identity(&self) -> &Identity {
        &self.config.identity
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    /// Starts contending for the lease on a background task.
    ///
    /// Must be called from within a tokio runtime. A pool can only be
    /// watched once.
    pub fn watch(&self) -> Result<(EventStream, CancelHandle)> {
        let runtime = tokio::runtime::Handle::try_current().map_err(anyhow::Error::from)?;
        let lock = self.lock.lock().take().ok_or(Error::AlreadyWatching)?;

        let (acquired_tx, acquired_rx) = mpsc::channel(1);
        let (lost_tx, lost_rx) = mpsc::channel(1);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let (lease, identity) = (&self.key, &self.config.identity);
        let span = match &self.parent_span {
            Some(parent) => {
                info_span!(parent: parent, "lease_pool", lease = %lease, identity = %identity)
            }
            None => info_span!("lease_pool", lease = %lease, identity = %identity),
        };

        let task = WatchTask {
            lock,
            retry_period: self.config.retry_period,
            renew_deadline: self.config.renew_deadline,
            events: EventSender {
                acquired: acquired_tx,
                lost: lost_tx,
            },
            cancelled: cancel_rx,
            leading: false,
            renewed_at: Instant::now(),
        };
        runtime.spawn(task.run().instrument(span));

        Ok((
            EventStream {
                acquired_lease: acquired_rx,
                lost_lease: lost_rx,
            },
            CancelHandle {
                tx: Arc::new(cancel_tx),
            },
        ))
    }
}

struct EventSender {
    acquired: mpsc::Sender<()>,
    lost: mpsc::Sender<()>,
}

impl EventSender {
    /// Returns false once the receiving side is gone.
    async fn send(&self, leading: bool) -> bool {
        let (to, previous) = if leading {
            (&self.acquired, &self.lost)
        } else {
            (&self.lost, &self.acquired)
        };
        // Both channels hold one signal, so a free slot on the other channel
        // means its last signal has been received.
        match previous.reserve().await {
            Ok(permit) => drop(permit),
            Err(_) => return false,
        }
        to.send(()).await.is_ok()
    }

    /// Resolves once the whole event stream has been dropped.
    async fn closed(&self) {
        tokio::join!(self.acquired.closed(), self.lost.closed());
    }
}

enum Step {
    Continue,
    Stop,
}

struct WatchTask {
    lock: LeaseLock,
    retry_period: Duration,
    renew_deadline: Duration,
    events: EventSender,
    cancelled: watch::Receiver<bool>,
    // Whether the last delivered signal was `acquired_lease`
    leading: bool,
    // Start of the last successful acquire or renew attempt; the renew
    // deadline counts from here
    renewed_at: Instant,
}

impl WatchTask {
    async fn run(mut self) {
        info!("watching lease");
        loop {
            if let Step::Stop = self.acquire().await {
                break;
            }
            info!("acquired lease");
            if let Step::Stop = self.announce(true).await {
                break;
            }
            if let Step::Stop = self.renew().await {
                break;
            }
            info!("lost lease");
            if let Step::Stop = self.announce(false).await {
                break;
            }
        }
        self.shutdown().await;
        debug!("lease watch stopped");
    }

    /// Retries with jitter until we hold the lease.
    async fn acquire(&mut self) -> Step {
        loop {
            let started = Instant::now();
            let attempt = tokio::select! {
                biased;
                () = cancelled(&mut self.cancelled) => return Step::Stop,
                result = self.lock.try_acquire_or_renew() => result,
            };
            match attempt {
                Ok(true) => {
                    self.renewed_at = started;
                    return Step::Continue;
                }
                Ok(false) => debug!("lease is held elsewhere, retrying"),
                Err(e) => warn!(error = %e, "failed to acquire lease"),
            }
            if let Step::Stop = self.pause(jittered(self.retry_period)).await {
                return Step::Stop;
            }
        }
    }

    /// Renews every retry period. Returns `Continue` once the lease is lost,
    /// either because no renewal succeeded within the renew deadline of the
    /// last successful one or because another identity was observed as
    /// holder.
    async fn renew(&mut self) -> Step {
        loop {
            let deadline = self.renewed_at + self.renew_deadline;
            let wait = self.retry_period.min(deadline.saturating_duration_since(Instant::now()));
            if let Step::Stop = self.pause(wait).await {
                return Step::Stop;
            }

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    warn!(
                        renew_deadline = ?self.renew_deadline,
                        "failed to renew lease before deadline"
                    );
                    return Step::Continue;
                }

                let started = Instant::now();
                let attempt = tokio::select! {
                    biased;
                    () = cancelled(&mut self.cancelled) => return Step::Stop,
                    result = timeout(remaining, self.lock.try_acquire_or_renew()) => result,
                };
                match attempt {
                    Ok(Ok(true)) => {
                        self.renewed_at = started;
                        break;
                    }
                    Ok(Ok(false)) if self.lock.is_held_by_other() => {
                        let holder = self.lock.observed_record().map(|r| r.holder_identity.clone());
                        info!(?holder, "lease taken over by another identity");
                        return Step::Continue;
                    }
                    Ok(Ok(false)) => debug!("lease renewal raced with another write, retrying"),
                    Ok(Err(e)) => warn!(error = %e, "failed to renew lease"),
                    Err(_) => debug!("lease renewal attempt timed out"),
                }

                let remaining = deadline.saturating_duration_since(Instant::now());
                if let Step::Stop = self.pause(self.retry_period.min(remaining)).await {
                    return Step::Stop;
                }
            }
        }
    }

    async fn announce(&mut self, leading: bool) -> Step {
        let delivered = tokio::select! {
            biased;
            () = cancelled(&mut self.cancelled) => return Step::Stop,
            delivered = self.events.send(leading) => delivered,
        };
        if delivered {
            self.leading = leading;
            Step::Continue
        } else {
            debug!("event stream dropped, stopping lease watch");
            Step::Stop
        }
    }

    async fn pause(&mut self, period: Duration) -> Step {
        tokio::select! {
            biased;
            () = cancelled(&mut self.cancelled) => Step::Stop,
            () = self.events.closed() => {
                debug!("event stream dropped, stopping lease watch");
                Step::Stop
            }
            () = sleep(period) => Step::Continue,
        }
    }

    /// Releases a held lease and reports the loss, both bounded by one retry
    /// period.
    async fn shutdown(&mut self) {
        if self.lock.holds_lease() {
            match timeout(self.retry_period, self.lock.release()).await {
                Ok(Ok(true)) => info!("released lease"),
                Ok(Ok(false)) => debug!("lease changed hands before release"),
                Ok(Err(e)) => warn!(error = %e, "failed to release lease"),
                Err(_) => warn!("timed out releasing lease"),
            }
        }

        if self.leading {
            info!("lost lease");
            let delivered = timeout(self.retry_period, self.events.send(false))
                .await
                .unwrap_or(false);
            if !delivered {
                debug!("final lost lease signal not delivered");
            }
            self.leading = false;
        }
    }
}

/// Resolves once cancellation is requested. Never resolves if every
/// handle was dropped without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn jittered(period: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.0..JITTER_FACTOR);
    period + period.mul_f64(factor)
}
