//! Connection state: identities, per-connection handles and the registry of
//! live connections.

mod registry;
mod stats;
mod types;

pub use registry::ConnectionRegistry;
pub use stats::{ConnectionInfo, ConnectionStats};
pub use types::{ConnectionHandle, ConnectionId};
