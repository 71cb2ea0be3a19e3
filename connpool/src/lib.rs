//! connpool: fixed-capacity pool of outbound TCP connections to one endpoint.
//!
//! The pool runs on a single-threaded tokio reactor (`LocalSet`). Callers
//! either take an idle connection immediately with `get_socket`, or register
//! with `wait_socket` and are resumed by deadline order when a connection
//! becomes available. Connections are opened lazily, one attempt at a time,
//! and failed attempts are retried on a fixed interval within a retry budget.
//!
//! ```ignore
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     let pool = ConnectionPool::new(PoolConfig::new(4, "127.0.0.1", 8000))?;
//!     let id = match pool.get_socket() {
//!         Some(id) => id,
//!         None => pool.wait_for(Duration::from_secs(1)).await?,
//!     };
//!     pool.write_socket(id, b"hello", |status| println!("write: {status:?}"))?;
//!     pool.put_socket(id)?;
//!     Ok::<_, PoolError>(())
//! }).await?;
//! ```

pub mod config;
pub mod connector;
pub mod error;
mod io;
mod pool;
mod reconnect;
pub mod slot;
mod timer;
mod waitqueue;

#[cfg(test)]
mod testing;

pub use config::PoolConfig;
pub use connector::{Connector, TcpConnector};
pub use error::{PoolError, Result};
pub use io::{READ_BUFFER_SIZE, ReadEvent};
pub use pool::{ConnectionPool, PoolStats};
pub use slot::{SlotContext, SlotId, SlotInfo, SlotState};
