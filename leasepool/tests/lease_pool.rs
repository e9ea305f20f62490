use leasepool::{
    test_utils::{fast_config, recv_within, SlowStore},
    InMemoryStore, LeaseKey, LeasePool,
};
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "pool-test";

fn key() -> LeaseKey {
    LeaseKey::new("test", NAME)
}

#[tokio::test(start_paused = true)]
async fn test_single_pool_acquires() {
    let store = Arc::new(InMemoryStore::new());
    let pool = LeasePool::new(store.clone(), NAME, fast_config("node-a")).unwrap();

    let (mut events, cancel) = pool.watch().unwrap();
    assert!(recv_within(&mut events.acquired_lease, Duration::from_secs(1)).await.is_some());
    assert_eq!(store.snapshot(&key()).unwrap().holder_identity, "node-a");

    // Renewals keep the lease without further signals
    assert!(recv_within(&mut events.lost_lease, Duration::from_secs(30)).await.is_none());
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_only_one_contender_leads() {
    let store = Arc::new(InMemoryStore::new());
    let a = LeasePool::new(store.clone(), NAME, fast_config("node-a")).unwrap();
    let b = LeasePool::new(store.clone(), NAME, fast_config("node-b")).unwrap();

    let (mut a_events, a_cancel) = a.watch().unwrap();
    assert!(recv_within(&mut a_events.acquired_lease, Duration::from_secs(1)).await.is_some());

    let (mut b_events, b_cancel) = b.watch().unwrap();
    assert!(recv_within(&mut b_events.acquired_lease, Duration::from_secs(60)).await.is_none());
    assert_eq!(store.snapshot(&key()).unwrap().holder_identity, "node-a");

    a_cancel.cancel();
    b_cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_releases_and_reports_loss() {
    let store = Arc::new(InMemoryStore::new());
    let a = LeasePool::new(store.clone(), NAME, fast_config("node-a")).unwrap();
    let b = LeasePool::new(store.clone(), NAME, fast_config("node-b")).unwrap();

    let (mut a_events, a_cancel) = a.watch().unwrap();
    assert!(recv_within(&mut a_events.acquired_lease, Duration::from_secs(1)).await.is_some());
    let (mut b_events, _b_cancel) = b.watch().unwrap();

    a_cancel.cancel();
    assert!(recv_within(&mut a_events.lost_lease, Duration::from_secs(2)).await.is_some());

    // Channels close once the watch task is done
    assert!(a_events.acquired_lease.recv().await.is_none());
    assert!(a_events.lost_lease.recv().await.is_none());

    // Released lease is taken over well before it would have expired
    assert!(recv_within(&mut b_events.acquired_lease, Duration::from_secs(5)).await.is_some());
    assert_eq!(store.snapshot(&key()).unwrap().holder_identity, "node-b");
    assert_eq!(store.snapshot(&key()).unwrap().leader_transitions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_acquiring_sends_nothing() {
    let store = Arc::new(InMemoryStore::new());
    store.set_available(false);
    let pool = LeasePool::new(store.clone(), NAME, fast_config("node-a")).unwrap();

    let (mut events, cancel) = pool.watch().unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    cancel.cancel();

    assert!(events.acquired_lease.recv().await.is_none());
    assert!(events.lost_lease.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_loses_and_regains() {
    let store = Arc::new(InMemoryStore::new());
    let pool = LeasePool::new(store.clone(), NAME, fast_config("node-a")).unwrap();

    let (mut events, cancel) = pool.watch().unwrap();
    assert!(recv_within(&mut events.acquired_lease, Duration::from_secs(1)).await.is_some());

    store.set_available(false);
    // retry period + renew deadline
    assert!(recv_within(&mut events.lost_lease, Duration::from_secs(9)).await.is_some());

    store.set_available(true);
    assert!(recv_within(&mut events.acquired_lease, Duration::from_secs(5)).await.is_some());
    assert_eq!(store.snapshot(&key()).unwrap().holder_identity, "node-a");

    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_partitioned_leader_steps_down_before_takeover() {
    let shared = Arc::new(InMemoryStore::new());
    let partitioned = Arc::new(SlowStore::new(shared.clone()));

    let a = LeasePool::new(partitioned.clone(), NAME, fast_config("node-a")).unwrap();
    let b = LeasePool::new(shared.clone(), NAME, fast_config("node-b")).unwrap();

    let (mut a_events, a_cancel) = a.watch().unwrap();
    assert!(recv_within(&mut a_events.acquired_lease, Duration::from_secs(1)).await.is_some());
    let (mut b_events, b_cancel) = b.watch().unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    // node-a's requests now hang
    partitioned.set_latency(Duration::from_secs(3600));

    assert!(recv_within(&mut a_events.lost_lease, Duration::from_secs(9)).await.is_some());
    assert!(
        b_events.acquired_lease.try_recv().is_err(),
        "node-b must not lead while node-a may still believe it leads"
    );

    assert!(recv_within(&mut b_events.acquired_lease, Duration::from_secs(15)).await.is_some());
    assert_eq!(shared.snapshot(&key()).unwrap().holder_identity, "node-b");

    a_cancel.cancel();
    b_cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_renew_deadline_counts_from_last_renewal() {
    // Renew deadline close to the lease duration, retry period close to the
    // renew deadline. Still a valid configuration.
    let config = |identity: &str| {
        fast_config(identity)
            .with_lease_duration(Duration::from_secs(10))
            .with_renew_deadline(Duration::from_secs(9))
            .with_retry_period(Duration::from_secs(7))
    };
    assert!(config("node-a").validate().is_ok());

    let shared = Arc::new(InMemoryStore::new());
    let partitioned = Arc::new(SlowStore::new(shared.clone()));
    let a = LeasePool::new(partitioned.clone(), NAME, config("node-a")).unwrap();
    let b = LeasePool::new(shared.clone(), NAME, config("node-b")).unwrap();

    let (mut a_events, a_cancel) = a.watch().unwrap();
    assert!(recv_within(&mut a_events.acquired_lease, Duration::from_secs(1)).await.is_some());
    partitioned.set_latency(Duration::from_secs(3600));
    let (mut b_events, b_cancel) = b.watch().unwrap();

    // node-a acquired at t=0, so it must give up by t=9
    assert!(recv_within(&mut a_events.lost_lease, Duration::from_millis(9500)).await.is_some());
    assert!(
        b_events.acquired_lease.try_recv().is_err(),
        "node-b must not lead while node-a may still believe it leads"
    );

    assert!(recv_within(&mut b_events.acquired_lease, Duration::from_secs(40)).await.is_some());
    assert_eq!(shared.snapshot(&key()).unwrap().holder_identity, "node-b");

    a_cancel.cancel();
    b_cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_dropping_events_stops_watch() {
    let store = Arc::new(InMemoryStore::new());
    let a = LeasePool::new(store.clone(), NAME, fast_config("node-a")).unwrap();
    let b = LeasePool::new(store.clone(), NAME, fast_config("node-b")).unwrap();

    let (mut a_events, _a_cancel) = a.watch().unwrap();
    assert!(recv_within(&mut a_events.acquired_lease, Duration::from_secs(1)).await.is_some());
    drop(a_events);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(store.snapshot(&key()).unwrap().is_released());

    let (mut b_events, b_cancel) = b.watch().unwrap();
    assert!(recv_within(&mut b_events.acquired_lease, Duration::from_secs(1)).await.is_some());
    b_cancel.cancel();
}
