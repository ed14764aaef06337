pub mod cache;
pub mod config;
pub mod metrics;
pub mod name;
pub mod packet;
pub mod reader;
pub mod records;
pub mod resolver;
pub mod server;
pub mod upstream;

use std::net::Ipv4Addr;
use std::sync::Arc;

/// Shared per-process state handed to every worker.
pub struct ServerState {
    /// Root nameserver addresses, loaded once at startup.
    pub roots: Vec<Ipv4Addr>,
    pub transport: upstream::UpstreamTransport,
    pub metrics: Arc<metrics::Metrics>,
}

pub type SharedState = Arc<ServerState>;
