//! Per-connection session state machine
//!
//! A session starts unidentified: the first complete frame's signature picks
//! a decoder from the registry and the decoder resolves the device IMEI.
//! Every frame after that is decoded by the bound decoder. Transport errors,
//! end-of-stream, idle timeout and an unidentifiable protocol all terminate
//! the session; termination closes the connection and emits exactly one
//! `Finished` event.

use super::dispatcher::SessionEvent;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, trace, warn};
use trackwire_shared::{Decoder, DecoderRegistry, Framer};
use uuid::Uuid;

/// State of one connected device, owned exclusively by its session task
pub(super) struct Session {
    id: Uuid,
    stream: TcpStream,
    framer: Framer,
    decoder: Option<Box<dyn Decoder>>,
    imei: Option<String>,
    registry: Arc<DecoderRegistry>,
    idle_timeout: Duration,
    events: mpsc::Sender<SessionEvent>,
}

impl Session {
    pub(super) fn new(
        id: Uuid,
        stream: TcpStream,
        registry: Arc<DecoderRegistry>,
        idle_timeout: Duration,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(session = %id, "set_nodelay failed: {e}");
        }

        Self {
            id,
            stream,
            framer: Framer::new(),
            decoder: None,
            imei: None,
            registry,
            idle_timeout,
            events,
        }
    }

    /// Drive the session until termination
    ///
    /// Emits `Started` before any data event and `Finished` exactly once at
    /// the end, whatever the termination reason.
    pub(super) async fn run(mut self) {
        let id = self.id;

        if self.events.send(SessionEvent::Started { id }).await.is_err() {
            return;
        }

        if let Err(reason) = self.read_loop().await {
            debug!(session = %id, "session terminated: {reason}");
        }

        // Dropping the stream closes the transport
        debug!(
            session = %id,
            imei = self.imei.as_deref().unwrap_or("unidentified"),
            "session closed"
        );
        let _ = self.events.send(SessionEvent::Finished { id }).await;
    }

    /// Read chunks until the transport ends, errors, or goes idle
    ///
    /// `Ok(())` is a normal transport end; `Err` is a protocol-level
    /// termination. Both end the session.
    async fn read_loop(&mut self) -> Result<()> {
        let mut buf = vec![0u8; 4096];

        loop {
            let n = match timeout(self.idle_timeout, self.stream.read(&mut buf)).await {
                Err(_) => {
                    debug!(session = %self.id, "idle timeout");
                    return Ok(());
                }
                Ok(Ok(0)) => {
                    debug!(session = %self.id, "end of stream");
                    return Ok(());
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    warn!(session = %self.id, "read error: {e}");
                    return Ok(());
                }
            };

            for frame in self.framer.feed(&buf[..n])? {
                self.handle_frame(&frame).await?;
            }
        }
    }

    /// Dispatch one complete frame through the session state machine
    async fn handle_frame(&mut self, frame: &str) -> Result<()> {
        trace!(session = %self.id, frame, "frame received");

        if self.decoder.is_none() {
            self.bind_decoder(frame)?;
        }
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| anyhow!("no decoder bound"))?;

        let decoded = decoder.decode(frame);

        for reply in decoded.replies {
            trace!(session = %self.id, reply = %String::from_utf8_lossy(&reply), "sending reply");
            // Fire-and-forget: a failed reply write does not end the session
            if let Err(e) = self.stream.write_all(&reply).await {
                warn!(session = %self.id, "reply write failed: {e}");
            }
        }

        self.events
            .send(SessionEvent::Data {
                id: self.id,
                message: decoded.message,
            })
            .await
            .map_err(|_| anyhow!("event channel closed"))
    }

    /// Bind a decoder from the first frame's signature and resolve the
    /// device identity, or give up on the session
    fn bind_decoder(&mut self, frame: &str) -> Result<()> {
        let mut decoder = self
            .registry
            .lookup(frame)
            .ok_or_else(|| anyhow!("unknown protocol"))?;
        let imei = decoder
            .identify(frame)
            .ok_or_else(|| anyhow!("device did not identify"))?;
        debug!(session = %self.id, imei, "protocol identified");
        self.imei = Some(imei);
        self.decoder = Some(decoder);
        Ok(())
    }
}
