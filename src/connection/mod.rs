//! Client connections: establishment, transport links and per-connection
//! traffic state.
//!
//! ## Lifecycle
//!
//! 1. [`ConnectionPool`] opens `ccu` sockets with bounded concurrency.
//! 2. Each success becomes a [`Connection`]; message links first wait for
//!    the server's connection-established marker.
//! 3. Traffic workers wrap connections in [`TrafficConnState`] and own them
//!    until the run ends.

mod link;
mod pool;
mod role;
mod state;

pub use link::{Connection, Link, MessageLink, OUTBOUND_LIMIT};
pub use pool::{ConnectionPool, PoolOutcome};
pub use role::Role;
pub use state::{PendingSend, RecvState, TrafficConnState};
