//! # Uplink - Store-and-Forward Relay Agent
//!
//! Uplink is a small agent that accepts messages from local producers and
//! forwards them, one at a time and in priority order, to a single remote
//! service over a long-lived duplex connection.
//!
//! ## Features
//!
//! - **Priority Dispatch**: Four QoS classes with strict priority ordering
//!   and configurable tie-breaking within a class.
//! - **Bounded Buffering**: A byte-budgeted queue that sheds the least
//!   important traffic first under memory pressure.
//! - **Transparent Retry**: Delivery failures are transient by definition;
//!   messages re-enter the queue until delivered or shed.
//! - **Single-Writer Egress**: At most one delivery in flight, so the remote
//!   connection never sees concurrent writers.
//! - **Async Design**: Built with Tokio; producers get backpressure, not
//!   threads.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use uplink::agent::Agent;
//! use uplink::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("uplink.toml").await?;
//!     Agent::new(config)?.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - supervisor wiring the pieces together, with
//!   panic-recovering lifecycle hooks
//! - [`qos`] - the priority queue, dispatcher task, and handler façade
//! - [`ingress`] - local producer listener
//! - [`egress`] - the sink trait and the framed TCP egress
//! - [`frame`] - wire framing shared by ingress and egress
//! - [`config`] - configuration management
//! - [`message`] - the message model and priority classes
//!
//! ## Architecture
//!
//! ```text
//! producers ──▶ ingress listener ──▶ qos handler ──▶ dispatcher
//!                                                       │  ▲
//!                                                 queue ─┘  │ retry
//!                                                       ▼   │
//!                                                     egress sink ──▶ remote
//! ```

pub mod agent;
pub mod config;
pub mod egress;
pub mod frame;
pub mod ingress;
pub mod logutil;
pub mod message;
pub mod metrics;
pub mod qos;
