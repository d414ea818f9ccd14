//! Telemetry/video ingest loop
//!
//! Drains the inbound frame stream, counting arrivals. Frame payloads are
//! opaque at this layer; nothing is decoded or stored. A receive timeout is
//! a normal condition and keeps the loop alive; only transport errors or a
//! remote close end it.

use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TeleopError;
use crate::session::{SessionCounters, ShutdownFlag};

/// Inbound transport yielding opaque frames.
///
/// `Ok(None)` means the remote closed the stream cleanly.
pub trait TelemetrySource {
    fn recv(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Option<Bytes>, TeleopError>> + Send;
}

/// Read half of the video-channel websocket
pub struct WsTelemetrySource {
    inner: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WsTelemetrySource {
    pub fn new(inner: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>) -> Self {
        Self { inner }
    }
}

impl TelemetrySource for WsTelemetrySource {
    async fn recv(&mut self) -> Result<Option<Bytes>, TeleopError> {
        // Control frames (ping/pong) are not telemetry; skip them.
        while let Some(message) = self.inner.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(Bytes::from(text))),
                Message::Binary(data) => return Ok(Some(Bytes::from(data))),
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }
}

/// Run the ingest loop until shutdown is requested or the source fails.
///
/// Each receive attempt is bounded by `recv_timeout`; elapsing it just
/// means no frame arrived and the loop waits again.
pub async fn telemetry_loop<S: TelemetrySource>(
    mut source: S,
    recv_timeout: Duration,
    shutdown: ShutdownFlag,
    counters: SessionCounters,
) -> Result<(), TeleopError> {
    loop {
        tokio::select! {
            _ = shutdown.requested() => break,
            attempt = tokio::time::timeout(recv_timeout, source.recv()) => {
                match attempt {
                    Err(_elapsed) => {
                        log::debug!("[VID] no frame within {:?}, still waiting", recv_timeout);
                    }
                    Ok(Ok(Some(frame))) => {
                        let received = counters.record_frame();
                        log::trace!("[VID] frame {} ({} bytes)", received, frame.len());
                    }
                    Ok(Ok(None)) => return Err(TeleopError::ChannelClosed),
                    Ok(Err(e)) => return Err(e),
                }
            }
        }
    }
    Ok(())
}
