//! HTTP status endpoint.

use crate::{
    component::Manager,
    elector::{LeaderElector, LeaseElector},
    Result,
};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaStatus {
    pub identity: String,
    pub lease: String,
    pub is_leader: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderStatus {
    pub cluster_name: String,
    pub leader: Option<String>,
    pub replicas: Vec<ReplicaStatus>,
}

#[derive(Clone)]
pub struct StatusState {
    pub cluster_name: String,
    pub manager: Arc<Manager>,
    pub electors: Arc<Vec<Arc<LeaseElector>>>,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/leader", get(leader))
        .with_state(state)
}

/// Serves the status endpoint on `addr` until `shutdown` resolves, then
/// stops every component of the manager. Components are stopped even when
/// the endpoint fails, so held leases get released instead of expiring.
pub async fn serve(
    addr: &str,
    state: StatusState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let manager = state.manager.clone();
    let served = listen(addr, state, shutdown).await;
    if let Err(e) = manager.stop().await {
        error!(error = %e, "failed to stop components");
    }
    served
}

async fn listen(
    addr: &str,
    state: StatusState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "serving status");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn healthz(State(state): State<StatusState>) -> (StatusCode, String) {
    match state.manager.healthy().await {
        Ok(()) => (StatusCode::OK, "ok".to_string()),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn leader(State(state): State<StatusState>) -> Json<LeaderStatus> {
    let replicas: Vec<ReplicaStatus> = state
        .electors
        .iter()
        .map(|elector| ReplicaStatus {
            identity: elector.identity().to_string(),
            lease: elector.lease_name().to_string(),
            is_leader: elector.is_leader(),
        })
        .collect();
    let leader = replicas
        .iter()
        .find(|replica| replica.is_leader)
        .map(|replica| replica.identity.clone());

    Json(LeaderStatus {
        cluster_name: state.cluster_name.clone(),
        leader,
        replicas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ClusterConfig, factory::SharedStoreFactory, ElectorState, Error};
    use leasepool::{InMemoryStore, LeaseStore};

    fn state(replicas: usize) -> StatusState {
        let store: Arc<dyn LeaseStore> = Arc::new(InMemoryStore::new());
        let factory = Arc::new(SharedStoreFactory::new(store));
        let mut manager = Manager::new();
        let mut electors = Vec::new();
        for _ in 0..replicas {
            let elector = Arc::new(LeaseElector::new(ClusterConfig::default(), factory.clone()));
            manager.add(elector.clone());
            electors.push(elector);
        }
        StatusState {
            cluster_name: "test".into(),
            manager: Arc::new(manager),
            electors: Arc::new(electors),
        }
    }

    #[tokio::test]
    async fn test_healthz_ok() {
        let (status, body) = healthz(State(state(2))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_no_leader_before_start() {
        let Json(status) = leader(State(state(3))).await;
        assert_eq!(status.cluster_name, "test");
        assert_eq!(status.replicas.len(), 3);
        assert!(status.leader.is_none());
        assert!(status.replicas.iter().all(|r| !r.is_leader));
    }

    #[tokio::test]
    async fn test_serve_stops_components_when_bind_fails() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let state = state(2);
        state.manager.start().await.unwrap();
        assert!(state.electors.iter().all(|e| e.state() == ElectorState::Watching));

        let result = serve(&addr, state.clone(), std::future::pending()).await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(state.electors.iter().all(|e| e.state() == ElectorState::Stopped));
    }

    #[tokio::test]
    async fn test_serve_stops_components_on_shutdown() {
        let state = state(1);
        state.manager.start().await.unwrap();

        serve("127.0.0.1:0", state.clone(), async {}).await.unwrap();
        assert_eq!(state.electors[0].state(), ElectorState::Stopped);
    }
}
