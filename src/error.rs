use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("can't create store client for lease pool: {0}")]
    ClientFactory(#[source] leasepool::Error),

    #[error("Lease pool error: {0}")]
    LeasePool(#[from] leasepool::Error),

    #[error("Leader elector has already been started")]
    AlreadyStarted,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
