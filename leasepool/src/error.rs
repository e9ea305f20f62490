use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Lease conflict: record {key} was modified concurrently")]
    Conflict { key: String },

    #[error("Lease record {key} not found")]
    NotFound { key: String },

    #[error("Lease store unavailable")]
    Unavailable,

    #[error("Invalid lease configuration: {0}")]
    InvalidConfig(String),

    #[error("Lease pool is already being watched")]
    AlreadyWatching,

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Errors that mean "somebody else won the write", as opposed to a failed store.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. } | Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
