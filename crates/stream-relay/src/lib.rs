//! Stream Relay
//!
//! Drains a lazily produced value stream in a background task and
//! republishes it as events on named channels:
//! - each value (optionally transformed) on the value channel, `"value"` by
//!   default
//! - the first source or transform failure on `"error"`
//! - a single terminal signal on `"end"`, always last
//!
//! Cancellation is cooperative and best effort; see [`Relay::cancel`]. On a
//! multi-thread runtime, register listeners through [`Relay::with_listeners`]
//! so none of them misses an early value.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use stream_relay::{Relay, RelayOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let options = RelayOptions::new().map_value(|v: i32| v * 10);
//!     let relay = Relay::from_values(vec![1, 2, 3], options);
//!
//!     let seen = Arc::new(Mutex::new(Vec::new()));
//!     let sink = Arc::clone(&seen);
//!     relay.on_value(move |v| sink.lock().unwrap().push(*v));
//!
//!     relay.finished().await;
//!     assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30]);
//! }
//! ```

pub mod config;
pub mod error;
pub mod listener;
pub mod relay;
pub mod tracing_init;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use listener::{END_CHANNEL, ERROR_CHANNEL, Event, ListenerId, VALUE_CHANNEL};
pub use relay::{DrainHandle, Relay, RelayOptions, RelayStats};
