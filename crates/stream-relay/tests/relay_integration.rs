#![allow(clippy::unwrap_used, clippy::expect_used)] // Integration tests use unwrap for brevity

//! Integration tests for the relay: generator sources with delays, async
//! transforms, failures mid-stream and cooperative cancellation.

use std::fmt::Display;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};

use stream_relay::config::load_config;
use stream_relay::{END_CHANNEL, ERROR_CHANNEL, Relay, RelayOptions, VALUE_CHANNEL};

/// One step of a test generator: a value, or a failure raised on that pull.
enum Step<T> {
    Value(T),
    Fail(&'static str),
}

/// Generator source that sleeps before every pull, like a slow producer.
fn generator<T: Send + 'static>(
    steps: Vec<Step<T>>,
    delay: Duration,
) -> impl Stream<Item = Result<T, io::Error>> + Send + 'static {
    async_stream::stream! {
        for step in steps {
            tokio::time::sleep(delay).await;
            match step {
                Step::Value(value) => yield Ok(value),
                Step::Fail(msg) => yield Err(io::Error::other(msg)),
            }
        }
    }
}

fn sample_values(n: usize) -> Vec<f64> {
    (0..n).map(|i| (i as f64).mul_add(0.37, 0.5).fract()).collect()
}

fn steps<T>(values: &[T]) -> Vec<Step<T>>
where
    T: Clone,
{
    values.iter().cloned().map(Step::Value).collect()
}

#[derive(Debug, Clone, PartialEq)]
enum Seen<U> {
    Value(U),
    Error(String),
    End,
}

type Log<U> = Arc<Mutex<Vec<Seen<U>>>>;

/// Record every signal on `value_channel`, `"error"` and `"end"` into one
/// ordered log.
fn record<U, E>(relay: &Relay<U, E>, value_channel: &str) -> Log<U>
where
    U: Clone + Send + 'static,
    E: Display + Send + 'static,
{
    let log: Log<U> = Arc::default();
    for channel in [value_channel, ERROR_CHANNEL, END_CHANNEL] {
        let sink = Arc::clone(&log);
        relay.on(channel, move |event| {
            let seen = match event {
                stream_relay::Event::Value(v) => Seen::Value(v.clone()),
                stream_relay::Event::Error(e) => Seen::Error(e.to_string()),
                stream_relay::Event::End => Seen::End,
            };
            sink.lock().unwrap().push(seen);
        });
    }
    log
}

fn values_of<U: Clone>(log: &Log<U>) -> Vec<U> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|s| match s {
            Seen::Value(v) => Some(v.clone()),
            _ => None,
        })
        .collect()
}

fn errors_of<U>(log: &Log<U>) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|s| match s {
            Seen::Error(e) => Some(e.clone()),
            _ => None,
        })
        .collect()
}

fn end_count<U>(log: &Log<U>) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|s| matches!(s, Seen::End))
        .count()
}

fn ends_last<U>(log: &Log<U>) -> bool {
    matches!(log.lock().unwrap().last(), Some(Seen::End))
}

// =========================================================================
// Draining
// =========================================================================

#[tokio::test]
async fn emits_every_value_in_order() {
    let values = sample_values(25);
    let relay = Relay::with_defaults(generator(steps(&values), Duration::ZERO));
    let log = record(&relay, VALUE_CHANNEL);

    relay.finished().await;

    assert_eq!(values_of(&log), values);
    assert!(errors_of(&log).is_empty());
    assert_eq!(end_count(&log), 1);
    assert!(ends_last(&log));
}

#[tokio::test]
async fn one_two_three_then_end() {
    let relay = Relay::from_values([1, 2, 3], RelayOptions::new());
    let log = record(&relay, VALUE_CHANNEL);

    relay.finished().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec![Seen::Value(1), Seen::Value(2), Seen::Value(3), Seen::End]
    );
}

#[tokio::test]
async fn empty_source_only_ends() {
    let relay = Relay::from_values(Vec::<i32>::new(), RelayOptions::new());
    let log = record(&relay, VALUE_CHANNEL);

    relay.finished().await;

    assert_eq!(*log.lock().unwrap(), vec![Seen::End]);
    assert_eq!(relay.stats().values_emitted, 0);
}

#[tokio::test]
async fn custom_event_name_replaces_value_channel() {
    let values = sample_values(25);
    let options = RelayOptions::new().with_event_name("test");
    let relay = Relay::new(generator(steps(&values), Duration::ZERO), options);
    let log = record(&relay, "test");
    let default_log = record(&relay, VALUE_CHANNEL);

    relay.finished().await;

    assert_eq!(values_of(&log), values);
    assert!(values_of(&default_log).is_empty());
    assert_eq!(relay.event_name(), "test");
}

#[tokio::test]
async fn config_file_sets_event_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.json");
    std::fs::write(&path, r#"{"event_name": "tick"}"#).unwrap();
    let config = load_config(Some(&path)).unwrap();

    let relay = Relay::from_values(vec!["a", "b"], RelayOptions::from_config(&config));
    let log = record(&relay, "tick");

    relay.finished().await;

    assert_eq!(values_of(&log), vec!["a", "b"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn listeners_registered_up_front_see_every_value_on_worker_threads() {
    for _ in 0..200 {
        let mut log = None;
        let relay = Relay::with_listeners(
            tokio_stream::iter((0..3).map(Ok::<_, io::Error>)),
            RelayOptions::new(),
            |relay| log = Some(record(relay, VALUE_CHANNEL)),
        );
        let log = log.unwrap();

        relay.finished().await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![Seen::Value(0), Seen::Value(1), Seen::Value(2), Seen::End]
        );
    }
}

// =========================================================================
// Transforms
// =========================================================================

#[tokio::test]
async fn async_transform_is_applied_in_order() {
    let values = sample_values(25);
    let options = RelayOptions::new().transform_value(|v: f64| async move {
        tokio::time::sleep(Duration::ZERO).await;
        Ok::<_, io::Error>(v + 1.0)
    });
    let relay = Relay::new(generator(steps(&values), Duration::ZERO), options);
    let log = record(&relay, VALUE_CHANNEL);

    relay.finished().await;

    let expected: Vec<f64> = values.iter().map(|v| v + 1.0).collect();
    assert_eq!(values_of(&log), expected);
    assert_eq!(end_count(&log), 1);
}

#[tokio::test]
async fn sync_map_changes_value_type() {
    let options = RelayOptions::new().map_value(|v: u32| format!("item-{v}"));
    let relay = Relay::from_values(1..=3, options);
    let log = record(&relay, VALUE_CHANNEL);

    relay.finished().await;

    assert_eq!(values_of(&log), vec!["item-1", "item-2", "item-3"]);
}

#[tokio::test]
async fn transform_failure_is_published_once_then_end() {
    let options = RelayOptions::new().transform_value(|v: i32| async move {
        if v == 3 {
            Err(io::Error::other("cannot transform 3"))
        } else {
            Ok(v * 2)
        }
    });
    let source = generator(steps(&[1, 2, 3, 4, 5]), Duration::ZERO);
    let relay = Relay::new(source, options);
    let log = record(&relay, VALUE_CHANNEL);

    relay.finished().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            Seen::Value(2),
            Seen::Value(4),
            Seen::Error("cannot transform 3".into()),
            Seen::End,
        ]
    );
}

// =========================================================================
// Errors
// =========================================================================

#[tokio::test]
async fn source_failure_is_published_then_end() {
    let source = generator(
        vec![Step::Value(1), Step::Value(2), Step::Fail("BOOM!"), Step::Value(4)],
        Duration::from_millis(1),
    );
    let relay = Relay::with_defaults(source);
    let log = record(&relay, VALUE_CHANNEL);

    relay.finished().await;

    assert_eq!(values_of(&log), vec![1, 2]);
    assert_eq!(errors_of(&log), vec!["BOOM!".to_string()]);
    assert_eq!(end_count(&log), 1);
    assert_eq!(
        log.lock().unwrap()[2..],
        [Seen::Error("BOOM!".into()), Seen::End]
    );

    let stats = relay.stats();
    assert_eq!(stats.values_emitted, 2);
    assert_eq!(stats.errors_emitted, 1);
    assert!(stats.terminated);
}

#[tokio::test]
async fn failure_without_error_listener_does_not_escape() {
    let source = generator::<i32>(vec![Step::Fail("unheard")], Duration::ZERO);
    let relay = Relay::with_defaults(source);
    let ends = Arc::new(Mutex::new(0_u32));
    let sink = Arc::clone(&ends);
    relay.on_end(move || *sink.lock().unwrap() += 1);

    relay.finished().await;

    assert_eq!(relay.listener_count(ERROR_CHANNEL), 0);
    assert_eq!(*ends.lock().unwrap(), 1);
}

#[tokio::test]
#[allow(clippy::panic)]
async fn panicking_value_listener_stops_pulling_and_still_ends() {
    let relay = Relay::from_values(1..=5, RelayOptions::new());
    let log = record(&relay, VALUE_CHANNEL);
    relay.on_value(|v| {
        if *v == 2 {
            panic!("listener rejected {v}");
        }
    });

    relay.finished().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec![Seen::Value(1), Seen::Value(2), Seen::End]
    );
    assert!(relay.is_terminated());
    assert_eq!(relay.stats().values_emitted, 2);
}

#[tokio::test]
#[allow(clippy::panic)]
async fn panicking_end_listener_still_resolves_handles() {
    let relay = Relay::from_values([1, 2], RelayOptions::new());
    relay.on_end(|| panic!("end listener failed"));
    let log = record(&relay, VALUE_CHANNEL);

    relay.finished().await;

    assert!(relay.is_terminated());
    assert_eq!(values_of(&log), vec![1, 2]);
    // The panic skipped the end listener registered after it.
    assert_eq!(end_count(&log), 0);
    relay.cancel().await;
}

// =========================================================================
// Cancellation
// =========================================================================

#[tokio::test]
async fn cancel_right_away_publishes_only_the_first_value() {
    let values = sample_values(25);
    let relay = Relay::with_defaults(generator(steps(&values), Duration::ZERO));
    let log = record(&relay, VALUE_CHANNEL);

    relay.cancel().await;

    assert_eq!(values_of(&log), vec![values[0]]);
    assert_eq!(end_count(&log), 1);
    assert!(relay.is_cancelled());
}

#[tokio::test]
async fn cancel_after_first_value_emits_at_most_two() {
    let values = sample_values(25);
    let relay = Relay::with_defaults(generator(steps(&values), Duration::from_millis(5)));
    let log = record(&relay, VALUE_CHANNEL);

    let (first_tx, first_rx) = oneshot::channel();
    let first_tx = Mutex::new(Some(first_tx));
    relay.once(VALUE_CHANNEL, move |_| {
        if let Some(tx) = first_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    });

    first_rx.await.unwrap();
    relay.cancel().await;

    let emitted = values_of(&log);
    assert!((1..=2).contains(&emitted.len()), "emitted {emitted:?}");
    assert_eq!(emitted[..], values[..emitted.len()]);
    assert_eq!(end_count(&log), 1);
    assert!(ends_last(&log));
}

#[tokio::test]
async fn repeated_cancel_after_termination_is_noop() {
    let relay = Relay::from_values([1, 2], RelayOptions::new());
    let log = record(&relay, VALUE_CHANNEL);

    relay.finished().await;
    assert!(relay.is_terminated());

    let first = relay.cancel();
    let second = relay.cancel();
    assert!(first.is_finished());
    assert!(second.is_finished());
    first.await;
    second.await;

    assert_eq!(values_of(&log), vec![1, 2]);
    assert_eq!(end_count(&log), 1);
}

#[tokio::test]
async fn cancel_cannot_interrupt_a_stalled_pull() {
    let (tx, rx) = mpsc::channel::<u8>(4);
    let source = ReceiverStream::new(rx).map(Ok::<_, io::Error>);
    let relay = Relay::with_defaults(source);
    let log = record(&relay, VALUE_CHANNEL);

    let handle = relay.cancel();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!handle.is_finished());
    assert_eq!(end_count(&log), 0);

    tx.send(7).await.unwrap();
    handle.await;

    assert_eq!(*log.lock().unwrap(), vec![Seen::Value(7), Seen::End]);
    drop(tx);
}

#[tokio::test]
async fn closing_a_channel_source_ends_the_relay() {
    let (tx, rx) = mpsc::channel::<u8>(4);
    let relay = Relay::with_defaults(ReceiverStream::new(rx).map(Ok::<_, io::Error>));
    let log = record(&relay, VALUE_CHANNEL);

    tx.send(1).await.unwrap();
    tx.send(2).await.unwrap();
    drop(tx);
    relay.finished().await;

    assert_eq!(
        *log.lock().unwrap(),
        vec![Seen::Value(1), Seen::Value(2), Seen::End]
    );
}

// =========================================================================
// Listeners
// =========================================================================

#[tokio::test]
async fn removed_listener_stops_receiving() {
    let (tx, rx) = mpsc::channel::<u8>(4);
    let relay = Relay::with_defaults(ReceiverStream::new(rx).map(Ok::<_, io::Error>));
    let log = record(&relay, VALUE_CHANNEL);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = relay.on_value(move |v| sink.lock().unwrap().push(*v));

    tx.send(1).await.unwrap();
    while values_of(&log).is_empty() {
        tokio::task::yield_now().await;
    }
    assert!(relay.off(id));

    tx.send(2).await.unwrap();
    drop(tx);
    relay.finished().await;

    assert_eq!(*seen.lock().unwrap(), vec![1]);
    assert_eq!(values_of(&log), vec![1, 2]);
}

#[tokio::test]
async fn once_listener_sees_first_value_only() {
    let relay = Relay::from_values(10..15, RelayOptions::new());
    let first = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&first);
    relay.once(VALUE_CHANNEL, move |event| {
        if let Some(v) = event.as_value() {
            sink.lock().unwrap().push(*v);
        }
    });

    relay.finished().await;

    assert_eq!(*first.lock().unwrap(), vec![10]);
    assert_eq!(relay.listener_count(VALUE_CHANNEL), 0);
}
