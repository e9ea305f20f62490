//! Lease-based leader election for controller replicas.
//!
//! Several replicas of a controller run side by side for availability, but
//! some duties, like reconciling a cluster-wide resource, must run on exactly
//! one of them. Each replica runs a [`LeaseElector`] and checks
//! [`LeaderElector::is_leader`] before doing such work.

pub mod cli;
pub mod component;
pub mod config;
pub mod elector;
pub mod error;
pub mod factory;
pub mod logging;
pub mod status;

pub use cli::Cli;
pub use component::{Component, Manager};
pub use config::{ClusterConfig, ElectionConfig};
pub use elector::{ElectorState, LeaderElector, LeaseElector, ENDPOINT_RECONCILER_LEASE};
pub use error::{Error, Result};
pub use factory::{ClientFactory, SharedStoreFactory};
