//! Agent assembly and supervision.
//!
//! Builds the egress, the QoS handler, and the producer listener from
//! configuration, then runs until a shutdown signal arrives (Ctrl-C or an
//! internal request from a lifecycle guard). Start and stop go through the
//! panic-recovering hook wrappers in [`lifecycle`]; a start failure rolls
//! the handler back to idle before the error propagates.

pub mod lifecycle;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info};

use crate::config::Config;
use crate::egress::{MessageSink, TcpEgress};
use crate::ingress::ProducerListener;
use crate::metrics;
use crate::qos::{Handler, QosConfig};

use lifecycle::ShutdownHandle;

const STATS_INTERVAL: Duration = Duration::from_secs(60);

pub struct Agent {
    config: Config,
    handler: Arc<Handler>,
}

impl Agent {
    /// Build the egress and the QoS handler from configuration. Fails on
    /// invalid QoS limits; nothing is spawned yet.
    pub fn new(config: Config) -> Result<Self> {
        let egress: Arc<dyn MessageSink> = Arc::new(TcpEgress::new(config.endpoint.clone()));
        let handler = Handler::new(
            QosConfig {
                max_queue_bytes: config.qos.max_queue_bytes,
                max_message_bytes: config.qos.max_message_bytes,
                prioritize_oldest: config.qos.prioritize_oldest,
            },
            egress,
        )
        .context("invalid qos configuration")?;

        Ok(Agent {
            config,
            handler: Arc::new(handler),
        })
    }

    /// Run until shutdown. Returns once stop has been signalled to every
    /// component; queued-but-undelivered messages are dropped by design.
    pub async fn run(self) -> Result<()> {
        info!(
            "agent '{}' forwarding to {}",
            self.config.agent.name,
            self.config.endpoint.addr()
        );

        let (shutdown, mut shutdown_rx) = ShutdownHandle::new();

        let handler = Arc::clone(&self.handler);
        if let Err(err) = lifecycle::guard_start(async move { handler.start().await }).await {
            // Roll back to idle so a retried start sees a clean slate.
            self.handler.stop().await;
            return Err(err.into());
        }

        let listener =
            ProducerListener::bind(&self.config.ingress, Arc::clone(&self.handler)).await?;
        let (listener_stop_tx, listener_stop_rx) = tokio::sync::oneshot::channel();
        let listener_task = tokio::spawn(listener.run(listener_stop_rx));

        let mut stats = tokio::time::interval(STATS_INTERVAL);
        stats.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        stats.tick().await; // swallow the immediate first tick

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Internal shutdown requested");
                    break;
                }
                _ = stats.tick() => {
                    metrics::log_summary();
                }
            }
        }

        let _ = listener_stop_tx.send(());
        let handler = Arc::clone(&self.handler);
        if let Err(err) = lifecycle::guard_stop(async move { handler.stop().await }, &shutdown).await
        {
            error!("stop hook failed: {}", err);
        }
        let _ = listener_task.await;
        metrics::log_summary();
        info!("agent stopped");
        Ok(())
    }

    /// The QoS handler, for embedding the agent in tests or other binaries.
    pub fn handler(&self) -> Arc<Handler> {
        Arc::clone(&self.handler)
    }
}
