//! Relay construction options.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use crate::config::RelayConfig;
use crate::listener::VALUE_CHANNEL;

type BoxFuture<R> = Pin<Box<dyn Future<Output = R> + Send>>;

/// How each pulled value becomes the published value.
pub(crate) enum Transform<T, U, E> {
    Identity(fn(T) -> U),
    Map(Box<dyn Fn(T) -> U + Send + Sync>),
    Then(Box<dyn Fn(T) -> BoxFuture<Result<U, E>> + Send + Sync>),
}

impl<T, U, E> Transform<T, U, E> {
    pub(crate) async fn apply(&self, value: T) -> Result<U, E> {
        match self {
            Self::Identity(f) => Ok(f(value)),
            Self::Map(f) => Ok(f(value)),
            Self::Then(f) => f(value).await,
        }
    }

    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Identity(_) => "identity",
            Self::Map(_) => "map",
            Self::Then(_) => "async",
        }
    }
}

/// Options for [`Relay::new`](crate::Relay::new).
///
/// `T` is the source's value type, `U` the published value type and `E` the
/// failure type shared by the source and the transform.
pub struct RelayOptions<T, U = T, E = Infallible> {
    pub(crate) event_name: String,
    pub(crate) transform: Transform<T, U, E>,
    pub(crate) warn_unobserved_errors: bool,
}

impl<T, E> RelayOptions<T, T, E> {
    /// Publish untransformed values on the `"value"` channel.
    pub fn new() -> Self {
        Self {
            event_name: VALUE_CHANNEL.to_string(),
            transform: Transform::Identity(std::convert::identity),
            warn_unobserved_errors: true,
        }
    }

    /// Options taking the channel name and diagnostics from a loaded config.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new()
            .with_event_name(config.event_name.clone())
            .warn_unobserved_errors(config.warn_unobserved_errors)
    }
}

impl<T, E> Default for RelayOptions<T, T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, U, E> RelayOptions<T, U, E> {
    /// Publish values on `name` instead of `"value"`.
    #[must_use]
    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = name.into();
        self
    }

    /// Log a warning when a failure is published with no `"error"` listener.
    /// Enabled by default.
    #[must_use]
    pub fn warn_unobserved_errors(mut self, enabled: bool) -> Self {
        self.warn_unobserved_errors = enabled;
        self
    }

    /// Apply a synchronous, infallible function to each value before it is
    /// published. Replaces any previously configured transform.
    pub fn map_value<V, F>(self, f: F) -> RelayOptions<T, V, E>
    where
        F: Fn(T) -> V + Send + Sync + 'static,
    {
        RelayOptions {
            event_name: self.event_name,
            transform: Transform::Map(Box::new(f)),
            warn_unobserved_errors: self.warn_unobserved_errors,
        }
    }

    /// Apply an asynchronous, fallible function to each value before it is
    /// published. A failure is published on `"error"` and ends the relay.
    /// Replaces any previously configured transform.
    pub fn transform_value<V, F, Fut>(self, f: F) -> RelayOptions<T, V, E>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        RelayOptions {
            event_name: self.event_name,
            transform: Transform::Then(Box::new(move |value| -> BoxFuture<Result<V, E>> {
                Box::pin(f(value))
            })),
            warn_unobserved_errors: self.warn_unobserved_errors,
        }
    }

    /// Channel values will be published on.
    pub fn event_name(&self) -> &str {
        &self.event_name
    }
}

impl<T, U, E> std::fmt::Debug for RelayOptions<T, U, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayOptions")
            .field("event_name", &self.event_name)
            .field("transform", &self.transform.kind())
            .field("warn_unobserved_errors", &self.warn_unobserved_errors)
            .finish()
    }
}
