//! Relay WebSocket server.
//!
//! Listens on a TCP port, upgrades every incoming connection to WebSocket
//! and serves all of them concurrently.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async_with_config;
use tokio_util::sync::CancellationToken;

use filedrop_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::ServerError;
use crate::connection;
use crate::handler::Handler;
use crate::registry::ConnectionRegistry;

/// Server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
}

/// The relay WebSocket server.
///
/// Every accepted connection gets a fresh id, is added to the shared
/// [`ConnectionRegistry`], and has its messages dispatched to the
/// [`Handler`].
pub struct RelayServer<H: Handler> {
    port: u16,
    handler: Arc<H>,
    registry: Arc<ConnectionRegistry>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl<H: Handler> RelayServer<H> {
    /// Creates a new server. The handler typically holds a clone of
    /// `registry` to broadcast through it.
    pub fn new(config: ServerConfig, handler: Arc<H>, registry: Arc<ConnectionRegistry>) -> Arc<Self> {
        Arc::new(Self {
            port: config.port,
            handler,
            registry,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Returns the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Stops accepting and closes every connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = TcpListener::bind(addr).await?;

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("relay server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::warn!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Upgrades a TCP connection to WebSocket and starts its pumps.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;

        let connection_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(%peer_addr, %connection_id, "client connected");

        connection::spawn_connection(
            ws_stream,
            connection_id,
            Arc::clone(&self.handler),
            Arc::clone(&self.registry),
            self.cancel.clone(),
        )
        .await;

        Ok(())
    }
}
