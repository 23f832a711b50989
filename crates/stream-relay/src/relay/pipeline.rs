//! Drain pipeline: source stream → transform → listener fan-out.
//!
//! Data flow:
//! ```text
//! source.next() → Transform::apply → publish(event_name) → cancel check
//!       └── Err ────────┴──────────→ publish("error") ──┐      │
//!                                                       └──────┴→ publish("end")
//! ```

use std::any::Any;
use std::convert::Infallible;
use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::watch;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::listener::{END_CHANNEL, ERROR_CHANNEL, Event, ListenerId, ListenerRegistry};

use super::options::{RelayOptions, Transform};
use super::types::{DrainHandle, RelayStats};

#[derive(Debug, Default)]
struct Counters {
    values: AtomicU64,
    errors: AtomicU64,
}

/// Republishes a value stream as events on named channels.
///
/// Construction spawns the drain task on the current tokio runtime. The task
/// yields once before its first pull, so on a current-thread runtime every
/// listener registered before the caller's next `.await` sees every event.
/// On a multi-thread runtime the task may start pulling on another worker
/// right away; use [`Relay::with_listeners`] to register listeners before
/// the task is spawned.
///
/// A panicking listener does not take the drain task down: the panic is
/// logged, nothing more is pulled, and `end` is still published.
///
/// Dropping the relay does not stop the drain task. Use [`Relay::cancel`].
pub struct Relay<U, E = Infallible> {
    event_name: Arc<str>,
    listeners: Arc<ListenerRegistry<U, E>>,
    cancelled: Arc<AtomicBool>,
    counters: Arc<Counters>,
    done_rx: watch::Receiver<bool>,
}

impl<U, E> Relay<U, E>
where
    U: Send + 'static,
    E: Send + 'static,
{
    /// Start draining `source`, publishing per `options`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new<S, T>(source: S, options: RelayOptions<T, U, E>) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Send + 'static,
    {
        Self::with_listeners(source, options, |_| {})
    }

    /// Like [`Relay::new`], but `register` runs against the relay before
    /// the drain task is spawned, so the listeners it adds see every event
    /// on any runtime flavour.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_listeners<S, T, R>(
        source: S,
        options: RelayOptions<T, U, E>,
        register: R,
    ) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        R: FnOnce(&Self),
    {
        let event_name: Arc<str> = Arc::from(options.event_name.as_str());
        let (done_tx, done_rx) = watch::channel(false);
        let relay = Self {
            event_name,
            listeners: Arc::new(ListenerRegistry::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            done_rx,
        };

        register(&relay);

        debug!(
            event_name = %relay.event_name,
            transform = options.transform.kind(),
            listeners = ?relay.listeners,
            "Relay created"
        );

        tokio::spawn(drain(DrainContext {
            source,
            transform: options.transform,
            event_name: Arc::clone(&relay.event_name),
            warn_unobserved_errors: options.warn_unobserved_errors,
            listeners: Arc::clone(&relay.listeners),
            cancelled: Arc::clone(&relay.cancelled),
            counters: Arc::clone(&relay.counters),
            done_tx,
        }));

        relay
    }

    /// Register a listener for every event published on `channel`.
    pub fn on<F>(&self, channel: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event<U, E>) + Send + Sync + 'static,
    {
        self.listeners.on(channel, listener)
    }

    /// Register a listener for the next event published on `channel` only.
    pub fn once<F>(&self, channel: &str, listener: F) -> ListenerId
    where
        F: Fn(&Event<U, E>) + Send + Sync + 'static,
    {
        self.listeners.once(channel, listener)
    }

    /// Remove a listener registered with `on`/`once` or a typed variant.
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }

    /// Listen for values on the configured value channel.
    pub fn on_value<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&U) + Send + Sync + 'static,
    {
        self.on(&self.event_name, move |event| {
            if let Event::Value(value) = event {
                listener(value);
            }
        })
    }

    /// Listen for the failure that stops the relay, if any.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.on(ERROR_CHANNEL, move |event| {
            if let Event::Error(err) = event {
                listener(err);
            }
        })
    }

    /// Listen for the terminal `end` signal.
    pub fn on_end<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(END_CHANNEL, move |event| {
            if event.is_end() {
                listener();
            }
        })
    }

    /// Number of listeners currently registered on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.listeners.listener_count(channel)
    }
}

impl<U, E> Relay<U, E> {
    /// Ask the drain task to stop and return a handle that resolves once it
    /// has.
    ///
    /// Best effort: the flag is checked only after a value has been pulled
    /// and published, so at most one more value is published after this
    /// call. A pull that never completes cannot be interrupted. Calling it
    /// again, or after termination, is a no-op that returns a fresh handle.
    pub fn cancel(&self) -> DrainHandle {
        let already = self.cancelled.swap(true, Ordering::AcqRel);
        if !already && !self.is_terminated() {
            debug!(event_name = %self.event_name, "Relay cancellation requested");
        }
        self.finished()
    }

    /// Handle that resolves once the drain task terminates, without
    /// requesting cancellation.
    pub fn finished(&self) -> DrainHandle {
        DrainHandle::new(self.done_rx.clone())
    }

    /// Whether [`Relay::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether the drain task has published `end` and stopped.
    pub fn is_terminated(&self) -> bool {
        self.finished().is_finished()
    }

    /// Channel values are published on.
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Get relay statistics.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            values_emitted: self.counters.values.load(Ordering::Acquire),
            errors_emitted: self.counters.errors.load(Ordering::Acquire),
            cancelled: self.is_cancelled(),
            terminated: self.is_terminated(),
        }
    }
}

impl<T, E> Relay<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Relay `source` untransformed on the `"value"` channel.
    pub fn with_defaults<S>(source: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
    {
        Self::new(source, RelayOptions::new())
    }
}

impl<U> Relay<U, Infallible>
where
    U: Send + 'static,
{
    /// Relay the items of an infallible iterator.
    pub fn from_values<I>(values: I, options: RelayOptions<I::Item, U, Infallible>) -> Self
    where
        I: IntoIterator,
        I::IntoIter: Send + 'static,
        I::Item: Send + 'static,
    {
        Self::new(
            tokio_stream::iter(values.into_iter().map(Ok::<_, Infallible>)),
            options,
        )
    }
}

impl<U, E> std::fmt::Debug for Relay<U, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("event_name", &self.event_name)
            .field("listeners", &self.listeners)
            .field("stats", &self.stats())
            .finish()
    }
}

struct DrainContext<S, T, U, E> {
    source: S,
    transform: Transform<T, U, E>,
    event_name: Arc<str>,
    warn_unobserved_errors: bool,
    listeners: Arc<ListenerRegistry<U, E>>,
    cancelled: Arc<AtomicBool>,
    counters: Arc<Counters>,
    done_tx: watch::Sender<bool>,
}

/// Why the drain loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Exhausted,
    Failed,
    Cancelled,
    ListenerPanicked,
}

/// Publish `event`, containing a panic raised by one of the listeners.
///
/// Returns the number of listeners invoked, or `None` if one panicked; the
/// listeners after it on the channel are skipped for this event.
fn publish_guarded<U, E>(
    listeners: &ListenerRegistry<U, E>,
    event_name: &str,
    channel: &str,
    event: &Event<U, E>,
) -> Option<usize> {
    match panic::catch_unwind(AssertUnwindSafe(|| listeners.publish(channel, event))) {
        Ok(invoked) => Some(invoked),
        Err(payload) => {
            error!(
                event_name = %event_name,
                channel,
                panic = panic_message(payload.as_ref()),
                "Relay listener panicked"
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

async fn drain<S, T, U, E>(ctx: DrainContext<S, T, U, E>)
where
    S: Stream<Item = Result<T, E>>,
{
    let DrainContext {
        source,
        transform,
        event_name,
        warn_unobserved_errors,
        listeners,
        cancelled,
        counters,
        done_tx,
    } = ctx;

    // Let the constructing caller register listeners first.
    tokio::task::yield_now().await;

    let stop = {
        let mut source = pin!(source);
        loop {
            let outcome = match source.next().await {
                None => break Stop::Exhausted,
                Some(Ok(value)) => transform.apply(value).await,
                Some(Err(err)) => Err(err),
            };

            match outcome {
                Ok(value) => {
                    let event = Event::Value(value);
                    let published = publish_guarded(&listeners, &event_name, &event_name, &event);
                    counters.values.fetch_add(1, Ordering::AcqRel);
                    if published.is_none() {
                        break Stop::ListenerPanicked;
                    }
                    if cancelled.load(Ordering::Acquire) {
                        break Stop::Cancelled;
                    }
                }
                Err(err) => {
                    let event = Event::Error(err);
                    let observed = publish_guarded(&listeners, &event_name, ERROR_CHANNEL, &event);
                    counters.errors.fetch_add(1, Ordering::AcqRel);
                    if observed == Some(0) && warn_unobserved_errors {
                        warn!(
                            event_name = %event_name,
                            error_type = std::any::type_name::<E>(),
                            "Relay error published with no error listener"
                        );
                    }
                    break Stop::Failed;
                }
            }
        }
    };

    publish_guarded(&listeners, &event_name, END_CHANNEL, &Event::End);
    done_tx.send_replace(true);

    info!(
        event_name = %event_name,
        emitted = counters.values.load(Ordering::Acquire),
        reason = ?stop,
        "Relay drained"
    );
}
