use anyhow::Context;
use clap::Parser;
use leasepool::{InMemoryStore, LeaseStore};
use std::sync::Arc;
use std::time::Duration;
use steward::{
    logging,
    status::{self, StatusState},
    Cli, ClusterConfig, LeaderElector, LeaseElector, Manager, SharedStoreFactory,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbosity);

    let mut config = match &cli.config {
        Some(path) => ClusterConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ClusterConfig::default(),
    };
    if let Some(addr) = &cli.listen {
        config.status_addr = addr.clone();
    }
    config.validate().context("invalid configuration")?;
    anyhow::ensure!(cli.replicas > 0, "at least one replica is required");

    // Replicas share one in-process store in place of the cluster API
    let store: Arc<dyn LeaseStore> = Arc::new(InMemoryStore::new());
    let factory = Arc::new(SharedStoreFactory::new(store));

    let mut manager = Manager::new();
    let mut electors = Vec::with_capacity(cli.replicas);
    for replica in 0..cli.replicas {
        let mut replica_config = config.clone();
        if let Some(identity) = &config.election.identity {
            replica_config.election.identity = Some(format!("{identity}-{replica}"));
        }
        let elector = Arc::new(LeaseElector::new(replica_config, factory.clone()));
        manager.add(elector.clone());
        electors.push(elector);
    }
    let manager = Arc::new(manager);
    let electors = Arc::new(electors);

    manager.init().await?;
    manager.start().await?;
    info!(
        cluster = %config.cluster_name,
        replicas = cli.replicas,
        "leader election started"
    );

    let duty = tokio::spawn(singleton_duty(
        electors.clone(),
        Duration::from_secs(cli.duty_interval.max(1)),
    ));

    let state = StatusState {
        cluster_name: config.cluster_name.clone(),
        manager: manager.clone(),
        electors,
    };
    let served = status::serve(&config.status_addr, state, shutdown_signal())
        .await
        .with_context(|| format!("status endpoint {}", config.status_addr));

    duty.abort();
    // Give the lease watches a moment to release their leases
    tokio::time::sleep(Duration::from_millis(200)).await;

    served
}

/// Stand-in for the endpoint reconciler: work that must only run on the
/// replica holding the lease.
async fn singleton_duty(electors: Arc<Vec<Arc<LeaseElector>>>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        for elector in electors.iter() {
            if elector.is_leader() {
                info!(identity = %elector.identity(), "reconciling endpoints");
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
