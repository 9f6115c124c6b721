use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Timed out acquiring lease {key:?} after {waited:?}")]
    AcquisitionTimeout { key: String, waited: Duration },

    #[error("Lease store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Acquisition of lease {key:?} was cancelled")]
    Cancelled { key: String },

    #[error("Invalid lock configuration: {0}")]
    InvalidConfig(String),

    /// The store answered but refused the command (wrong type, script error)
    #[error("Lease store rejected the command: {0:#}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// The resource is held by someone else; retrying later may succeed.
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::AcquisitionTimeout { .. })
    }

    /// The store itself could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        let unreachable = err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout();
        if unreachable {
            Error::StoreUnavailable(err.to_string())
        } else {
            Error::Other(anyhow::Error::new(err))
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
