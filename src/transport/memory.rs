//! In-process transport used to drive sessions without a network.
//!
//! [`channel`] returns the relay side (sink + stream) and a [`MemoryPeer`]
//! that plays the remote client: it injects inbound frames, observes outbound
//! frames and can simulate write failures, read failures and hang-ups.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{Frame, FrameSink, FrameStream, TransportError};

/// Relay-side write half backed by an unbounded channel
pub struct MemorySink {
    outbound: mpsc::UnboundedSender<Frame>,
    fail_writes: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io("broken pipe".to_string()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Remote end of an in-memory connection
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Frame>,
    sink: Arc<MemorySink>,
}

/// Create a connected sink/stream pair and the peer that drives it
pub fn channel() -> (Arc<MemorySink>, FrameStream, MemoryPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    let sink = Arc::new(MemorySink {
        outbound: out_tx,
        fail_writes: AtomicBool::new(false),
        closed: AtomicBool::new(false),
        close_calls: AtomicUsize::new(0),
    });
    let stream: FrameStream = Box::pin(UnboundedReceiverStream::new(in_rx));

    let peer = MemoryPeer {
        inbound: Some(in_tx),
        outbound: out_rx,
        sink: sink.clone(),
    };

    (sink, stream, peer)
}

impl MemoryPeer {
    /// Deliver a frame to the relay. Returns false once the peer has hung up.
    pub fn send(&self, frame: Frame) -> bool {
        match &self.inbound {
            Some(tx) => tx.send(Ok(frame)).is_ok(),
            None => false,
        }
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }

    /// Make the relay's next read fail, then end the stream
    pub fn fail_read(&mut self, reason: &str) {
        if let Some(tx) = self.inbound.take() {
            let _ = tx.send(Err(TransportError::Io(reason.to_string())));
        }
    }

    /// End the inbound stream as if the peer went away
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Make every subsequent relay write fail
    pub fn fail_writes(&self, fail: bool) {
        self.sink.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Next frame written by the relay
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Next text frame written by the relay, skipping probes
    pub async fn recv_text(&mut self) -> Option<String> {
        while let Some(frame) = self.outbound.recv().await {
            if let Frame::Text(text) = frame {
                return Some(text);
            }
        }
        None
    }

    /// All frames written so far
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Number of times the relay called `close` on this connection
    pub fn close_count(&self) -> usize {
        self.sink.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.sink.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (sink, mut stream, mut peer) = channel();

        sink.send(Frame::text("out")).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::text("out")));

        assert!(peer.send_text("in"));
        assert_eq!(stream.next().await, Some(Ok(Frame::text("in"))));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (sink, mut stream, mut peer) = channel();

        peer.fail_writes(true);
        assert!(sink.send(Frame::text("x")).await.is_err());

        peer.fail_read("reset by peer");
        assert!(matches!(stream.next().await, Some(Err(TransportError::Io(_)))));
        assert!(stream.next().await.is_none());
        assert!(!peer.send_text("late"));
    }

    #[tokio::test]
    async fn test_close_rejects_writes() {
        let (sink, _stream, peer) = channel();

        sink.close().await.unwrap();
        assert_eq!(peer.close_count(), 1);
        assert!(peer.is_closed());
        assert_eq!(
            sink.send(Frame::text("x")).await,
            Err(TransportError::Closed)
        );
    }
}
