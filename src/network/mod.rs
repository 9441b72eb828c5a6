//! Network side of the page-load model
//!
//! Turns a DevTools protocol network log into normalized request records,
//! derives per-origin latency from them, and provides the simulated DNS,
//! TCP and connection-pool machinery the simulator replays requests on.

pub mod analyzer;
pub mod connection;
pub mod dns;
pub mod pool;
pub mod priority;
pub mod recorder;
pub mod request;

pub use analyzer::NetworkAnalysis;
pub use connection::{ConnectionTiming, DownloadOptions, DownloadResults, TcpConnection};
pub use dns::DnsCache;
pub use pool::{ConnectionId, ConnectionPool, ConnectionReuse, PoolOptions};
pub use priority::{Priority, ResourceType};
pub use recorder::{LogEntry, NetworkLog, NetworkRecorder};
pub use request::{Initiator, InitiatorType, NetworkRequestRecord, Protocol, ResourceTiming};
