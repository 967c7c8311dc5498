//! Duplex channel boundary between the relay core and the network transport.
//!
//! The core never touches a socket directly. An accepted connection is handed
//! over as a [`FrameSink`] (writes and close) plus a [`FrameStream`] (reads).
//! Liveness acknowledgments arrive on the stream as [`Frame::Pong`].

#[doc(hidden)]
pub mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

/// A single transport-level frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

impl Frame {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Text content of a text frame
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_ping(&self) -> bool {
        matches!(self, Self::Ping(_))
    }
}

/// Errors reported by the transport layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("write timed out after {0} ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Io(String),
}

/// Write half of an accepted connection.
///
/// Implementations serialize concurrent writers internally; the router and
/// the heartbeat monitor may write to the same sink at the same time.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Write one frame to the peer
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Close the underlying channel
    async fn close(&self) -> Result<(), TransportError>;
}

/// Read half of an accepted connection. The stream ending means the peer is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;
