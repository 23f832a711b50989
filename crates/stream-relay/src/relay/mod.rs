//! Relay: drains a value stream into listener channels.
//!
//! Ties together:
//! - `RelayOptions` (channel name, value transform)
//! - the drain task (pull → transform → publish → cancel check)
//! - `ListenerRegistry` (per-relay channel fan-out)

mod options;
mod pipeline;
mod types;

pub use options::RelayOptions;
pub use pipeline::Relay;
pub use types::{DrainHandle, RelayStats};
