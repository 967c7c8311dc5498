use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::server::AppState;
use crate::transport::{Frame, FrameSink, FrameStream, TransportError};

use super::session::run_session;

/// Write half of an upgraded WebSocket. Writers queue on the mutex, so the
/// router and the heartbeat monitor never interleave partial frames.
pub struct WsSink {
    inner: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.inner
            .lock()
            .await
            .send(Message::from(frame))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner
            .lock()
            .await
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

/// Split an upgraded socket into the relay's sink/stream pair
pub fn split_socket(socket: WebSocket) -> (Arc<dyn FrameSink>, FrameStream) {
    let (ws_sender, ws_receiver) = socket.split();
    let sink: Arc<dyn FrameSink> = Arc::new(WsSink::new(ws_sender));
    let stream: FrameStream = Box::pin(ws_receiver.map(|result| {
        result
            .map(Frame::from)
            .map_err(|e| TransportError::Io(e.to_string()))
    }));
    (sink, stream)
}

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_failed_upgrade(|e| {
        tracing::warn!(error = %e, "Error upgrading connection");
    })
    .on_upgrade(move |socket| {
        let (sink, stream) = split_socket(socket);
        run_session(state, sink, stream)
    })
}
