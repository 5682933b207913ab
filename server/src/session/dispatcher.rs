//! TCP listener and session event multiplexing

use super::connection::Session;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use trackwire_shared::{timing, DecoderRegistry, Message};
use uuid::Uuid;

/// Configuration for the dispatch server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to
    pub bind_addr: String,
    /// Close a session after this long without received bytes
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".into(),
            idle_timeout: timing::IDLE_TIMEOUT,
        }
    }
}

/// Lifecycle and data events emitted for each session
///
/// Per session the order is always: one `Started`, then `Data` events in the
/// order their frames completed on the wire, then exactly one `Finished`.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A device connected
    Started { id: Uuid },
    /// The session's bound decoder produced a message
    Data { id: Uuid, message: Message },
    /// The session terminated and its connection was closed
    Finished { id: Uuid },
}

/// Accepts device connections and multiplexes their session events
///
/// Each accepted connection gets its own session task owning all of that
/// session's state; events from all sessions arrive interleaved on one
/// channel.
pub struct Dispatcher {
    local_addr: SocketAddr,
    event_rx: mpsc::Receiver<SessionEvent>,
}

impl Dispatcher {
    /// Bind the listener and start accepting device connections
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let registry = Arc::new(DecoderRegistry::with_builtin());
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(100);

        info!("track dispatcher listening on {local_addr}");

        tokio::spawn(accept_loop(listener, config, registry, event_tx));

        Ok(Self {
            local_addr,
            event_rx,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive the next session event
    ///
    /// Returns `None` once the dispatcher has shut down and all pending
    /// events are drained.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }
}

/// Accept connections until the event channel closes
///
/// A single session's failure never reaches this loop; each session runs in
/// its own task.
async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<DecoderRegistry>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("accept failed: {e}");
                continue;
            }
        };

        if event_tx.is_closed() {
            return;
        }

        let id = Uuid::new_v4();
        debug!(session = %id, "connection from {addr}");

        let session = Session::new(
            id,
            stream,
            registry.clone(),
            config.idle_timeout,
            event_tx.clone(),
        );
        tokio::spawn(session.run());
    }
}
