//! Chat Stream Client
//!
//! A resilient client for token-streaming chat endpoints that answer with
//! newline-delimited JSON:
//! - Heartbeat monitoring of silent connections
//! - Automatic reconnection with exponential backoff and jitter
//! - Sequence-number continuity so replayed chunks are delivered once
//! - Typed event bus for UI consumers
//! - Connection telemetry with Prometheus text export
//!
//! ```rust,no_run
//! use chat_stream_client::{ChatMessage, ClientConfig, EventKind, StreamClient, StreamEvent};
//!
//! # async fn run() -> chat_stream_client::Result<()> {
//! let client = StreamClient::from_config(ClientConfig::from_env())?;
//! client.on(EventKind::Delta, |event| {
//!     if let StreamEvent::Delta { content, .. } = event {
//!         print!("{content}");
//!     }
//! });
//! client
//!     .stream_chat(vec![ChatMessage::user("What is my tax bracket?")], None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod stream;
pub mod telemetry;
pub mod transport;

pub use client::{StreamClient, StreamOutcome, StreamState};
pub use config::ClientConfig;
pub use error::{DisconnectReason, Result, StreamError};
pub use events::{EventBus, EventKind, StreamEvent, SubscriptionId};
pub use stream::{ChatMessage, Role, SessionContext};
pub use telemetry::TelemetrySnapshot;
