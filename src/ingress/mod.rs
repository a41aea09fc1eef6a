//! Local producer ingress.
//!
//! Producers are other processes on this host: they connect to a loopback
//! TCP socket and stream framed messages at the agent. The contract is
//! fire-and-forget: a producer learns whether its message was accepted into
//! the dispatch path (the connection stays open) or the agent is shutting
//! down (the connection closes); oversize rejection and queue-pressure
//! eviction happen later and are deliberately invisible here.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, trace, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::config::IngressConfig;
use crate::frame::{self, FrameError};
use crate::logutil::{escape_log, hex_preview};
use crate::qos::{Handler, QosError};

/// Accept loop for local producer connections.
pub struct ProducerListener {
    listener: TcpListener,
    handler: Arc<Handler>,
    max_frame_bytes: usize,
}

impl ProducerListener {
    /// Bind the configured address. Binding up front lets startup fail fast
    /// instead of discovering a bad address after the agent is "running".
    pub async fn bind(config: &IngressConfig, handler: Arc<Handler>) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind)
            .await
            .with_context(|| format!("failed to bind producer listener on {}", config.bind))?;
        info!("producer listener on {}", config.bind);
        Ok(ProducerListener {
            listener,
            handler,
            max_frame_bytes: config.max_frame_bytes,
        })
    }

    /// Address actually bound, useful when configured with port 0.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept producers until the shutdown signal fires. Each connection is
    /// served on its own task; a bad connection never disturbs the others.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("producer listener shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("producer connected from {}", peer);
                            let handler = Arc::clone(&self.handler);
                            let max_frame_bytes = self.max_frame_bytes;
                            tokio::spawn(async move {
                                serve_producer(stream, handler, max_frame_bytes).await;
                                debug!("producer {} disconnected", peer);
                            });
                        }
                        Err(err) => warn!("producer accept failed: {}", err),
                    }
                }
            }
        }
    }
}

/// Read frames off one producer connection and enqueue them until the
/// producer hangs up, the stream corrupts, or the handler shuts down.
async fn serve_producer(mut stream: TcpStream, handler: Arc<Handler>, max_frame_bytes: usize) {
    loop {
        match frame::read_frame(&mut stream, max_frame_bytes).await {
            Ok(Some(msg)) => {
                trace!(
                    "producer frame {} dest={} priority={} payload={}",
                    msg.id,
                    escape_log(&msg.dest),
                    msg.priority,
                    hex_preview(&msg.payload)
                );
                match handler.enqueue(msg).await {
                    Ok(()) => {}
                    Err(QosError::Shutdown) => {
                        debug!("handler is shut down, closing producer connection");
                        break;
                    }
                    Err(err) => {
                        // Enqueue only ever reports shutdown today; anything
                        // else is logged and the connection kept.
                        debug!("enqueue refused: {}", err);
                    }
                }
            }
            Ok(None) => break,
            Err(FrameError::Io(err)) => {
                debug!("producer connection error: {}", err);
                break;
            }
            Err(err) => {
                warn!("malformed producer frame, closing connection: {}", err);
                break;
            }
        }
    }
}
