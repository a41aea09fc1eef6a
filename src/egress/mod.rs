//! Egress: the downstream sink the dispatcher delivers into.
//!
//! The dispatcher guarantees `handle_message` is invoked from at most one
//! task at a time, so implementations never see concurrent calls. Any error
//! returned here is treated as transient by the caller and triggers a retry
//! of the same message; a sink that wants a message gone must accept it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration};

use crate::config::EndpointConfig;
use crate::frame;
use crate::message::Message;

/// Single-writer delivery target for the QoS dispatcher.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver one message. Errors are transient; the message is retried.
    async fn handle_message(&self, msg: &Message) -> Result<()>;
}

/// Long-lived framed TCP connection to the remote service.
///
/// Connects lazily on first delivery and reconnects after failures with a
/// jittered backoff schedule. Failed attempts surface as errors so the
/// dispatcher keeps the message; the next attempt re-dials.
pub struct TcpEgress {
    endpoint: EndpointConfig,
    conn: Mutex<ConnState>,
}

struct ConnState {
    stream: Option<TcpStream>,
    /// Consecutive failed connect attempts; indexes the backoff schedule.
    failed_attempts: usize,
}

impl TcpEgress {
    pub fn new(endpoint: EndpointConfig) -> Self {
        TcpEgress {
            endpoint,
            conn: Mutex::new(ConnState {
                stream: None,
                failed_attempts: 0,
            }),
        }
    }

    /// One-shot connectivity check for the `check-endpoint` command.
    pub async fn probe(&self) -> Result<()> {
        self.connect().await.map(|_| ())
    }

    async fn connect(&self) -> Result<TcpStream> {
        let addr = self.endpoint.addr();
        let stream = timeout(
            Duration::from_secs(self.endpoint.connect_timeout_seconds),
            TcpStream::connect(&addr),
        )
        .await
        .with_context(|| format!("timed out connecting to {}", addr))?
        .with_context(|| format!("failed to connect to {}", addr))?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    fn backoff_delay(&self, failed_attempts: usize) -> Duration {
        let schedule = &self.endpoint.reconnect_backoff_seconds;
        let base_secs = schedule
            .get(failed_attempts.saturating_sub(1))
            .or_else(|| schedule.last())
            .copied()
            .unwrap_or(1);
        let base_ms = base_secs * 1000;
        // Jitter up to +50% so a fleet of agents doesn't redial in lockstep.
        let jitter = rand::thread_rng().gen_range(0..=base_ms / 2);
        Duration::from_millis(base_ms + jitter)
    }
}

#[async_trait]
impl MessageSink for TcpEgress {
    async fn handle_message(&self, msg: &Message) -> Result<()> {
        let mut conn = self.conn.lock().await;

        if conn.stream.is_none() {
            if conn.failed_attempts > 0 {
                let delay = self.backoff_delay(conn.failed_attempts);
                debug!(
                    "egress reconnect attempt {} after {:?}",
                    conn.failed_attempts + 1,
                    delay
                );
                sleep(delay).await;
            }
            match self.connect().await {
                Ok(stream) => {
                    info!("egress connected to {}", self.endpoint.addr());
                    conn.stream = Some(stream);
                    conn.failed_attempts = 0;
                }
                Err(err) => {
                    conn.failed_attempts += 1;
                    warn!("egress connect failed: {:#}", err);
                    return Err(err);
                }
            }
        }

        if let Some(stream) = conn.stream.as_mut() {
            if let Err(err) = frame::write_frame(stream, msg).await {
                warn!("egress write failed, dropping connection: {}", err);
                conn.stream = None;
                conn.failed_attempts = 1;
                return Err(err.into());
            }
        }
        Ok(())
    }
}
