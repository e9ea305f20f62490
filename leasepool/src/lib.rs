#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Lease primitive and lease pool.
//!
//! A [`LeaseLock`](lease::LeaseLock) performs conditional acquire, renew and
//! release of one named record in a [`LeaseStore`](store::LeaseStore). A
//! [`LeasePool`](pool::LeasePool) drives a lock from a background task and
//! reports ownership transitions on an [`EventStream`](pool::EventStream).

pub mod config;
pub mod error;
pub mod lease;
pub mod pool;
pub mod record;
pub mod store;

pub mod test_utils;

pub use config::LeaseConfig;
pub use error::{Error, Result};
pub use pool::{CancelHandle, EventStream, LeasePool};
pub use record::{LeaseKey, LeaseRecord, Versioned};
pub use store::{InMemoryStore, LeaseStore};

/// Holder identity written into lease records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<hostname>_<uuid>`, unique per process even when replicas share a host.
    pub fn generate() -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        Self(format!("{}_{}", host, uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
