//! Stream event system
//!
//! This module provides:
//! - `StreamEvent`: typed events emitted on every lifecycle transition and chunk
//! - `EventBus`: broadcast channel plus per-kind handler registry

mod bus;
mod types;

pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use types::{EventKind, StreamEvent};
