// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;
pub mod transport;

// Domain layer (relay logic)
pub mod connection_manager;
pub mod lifecycle;
pub mod router;
pub mod tasks;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
