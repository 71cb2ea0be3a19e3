use thiserror::Error;

use crate::slot::SlotId;

/// Errors surfaced synchronously by pool operations, or to a waiter's callback.
///
/// Transport failures during read/write/shutdown are never mapped onto this
/// type; they reach the operation's callback as a plain `std::io::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// A waiter's deadline passed before a slot became available.
    #[error("timed out waiting for a connection")]
    Timeout,

    /// A reservation for pool bookkeeping could not be satisfied.
    #[error("out of memory")]
    NoMemory,

    #[error("socket {0} does not exist")]
    SocketNotExist(SlotId),

    /// Reserved. Connect failures are retried internally and never reach callers.
    #[error("failed to connect to remote endpoint")]
    ConnectFail,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("pool has been shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, PoolError>;
