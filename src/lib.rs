//! # Connpool - Bounded, Shared Connection Pools
//!
//! Connpool keeps reusable connections to a small set of remote servers so
//! that many short requests do not pay for a fresh connect, handshake and
//! TLS setup each time.
//!
//! ## Features
//!
//! - **Bounded Pools**: at most `max_connections` live connections per target,
//!   with deadline-bounded waiting when all of them are lent out
//! - **RAII Entries**: borrowed connections go back to their pool on drop,
//!   or are discarded when marked unhealthy
//! - **Shared Registry**: callers asking for the same configuration share one
//!   pool for as long as any of them holds it
//! - **Replica Failover**: optional pool variant that tries replicas by
//!   priority and past errors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use connpool::config::load_config;
//! use connpool::connection::{ConnectionTimeouts, TcpConnection};
//! use connpool::pool::{ConnectionSource, PoolHandle, PoolRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("connpool.toml")?;
//!     let registry = PoolRegistry::<TcpConnection>::new();
//!     let handle = PoolHandle::from_config(&config, &registry)?;
//!
//!     let mut entry = handle.get(&ConnectionTimeouts::from_config(&config.timeouts)).await?;
//!     // talk to the server through entry.stream_mut()
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! caller -> PoolRegistry -> ConnectionPool -> PoolEntry -> Connection
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use connection::{Connection, ConnectionSettings, ConnectionTimeouts, TcpConnection};
pub use error::{ConnectionError, PoolError};
pub use pool::{ConnectionPool, ConnectionSource, PoolEntry, PoolHandle, PoolKey, PoolRegistry};

/// Version of the Connpool library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
