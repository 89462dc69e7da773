#![cfg(not(target_arch = "wasm32"))]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;

use contentlake_rs_sdk::error::{transport_error, ClientResult};
use contentlake_rs_sdk::listen::transport::TransportFactory;
use contentlake_rs_sdk::listen::{
    ConnectRequest, EventKind, EventSourceTransport, ListenEvent, ListenOptions, ListenParams,
    ReadyState, TransportEvent,
};
use contentlake_rs_sdk::util::subscribe::PartialObserver;
use contentlake_rs_sdk::{Client, ClientConfig};

/// Scripted behaviour for one stub connection.
#[derive(Default)]
struct Script {
    events: Vec<TransportEvent>,
    /// Ready state the transport reports after emitting a scripted error.
    post_error_state: Option<ReadyState>,
    /// Keep the connection pending after the script drains instead of
    /// reporting end-of-stream.
    hold_open: bool,
}

struct StubTransport {
    events: async_channel::Receiver<TransportEvent>,
    ready: Mutex<ReadyState>,
    post_error_state: Option<ReadyState>,
    closes: Arc<AtomicUsize>,
    // Keeps the scripted channel open so `next` pends after the script.
    _hold: Option<async_channel::Sender<TransportEvent>>,
}

#[async_trait]
impl EventSourceTransport for StubTransport {
    async fn next(&self) -> Option<TransportEvent> {
        let event = self.events.recv().await.ok()?;
        if matches!(event, TransportEvent::Error(_)) {
            if let Some(state) = self.post_error_state {
                *self.ready.lock().unwrap() = state;
            }
        }
        Some(event)
    }

    fn ready_state(&self) -> ReadyState {
        *self.ready.lock().unwrap()
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.events.close();
    }
}

#[derive(Default)]
struct StubFactory {
    scripts: Mutex<VecDeque<Script>>,
    opens: AtomicUsize,
    open_times: Mutex<Vec<Instant>>,
    closes: Arc<AtomicUsize>,
}

impl StubFactory {
    fn with_scripts(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for StubFactory {
    async fn connect(
        &self,
        _request: &ConnectRequest,
    ) -> ClientResult<Arc<dyn EventSourceTransport>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open_times.lock().unwrap().push(Instant::now());

        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        let (tx, rx) = async_channel::unbounded();
        for event in script.events {
            let _ = tx.try_send(event);
        }
        let hold = script.hold_open.then(|| tx.clone());
        drop(tx);

        Ok(Arc::new(StubTransport {
            events: rx,
            ready: Mutex::new(ReadyState::Open),
            post_error_state: script.post_error_state,
            closes: Arc::clone(&self.closes),
            _hold: hold,
        }))
    }
}

fn client_with(factory: Arc<StubFactory>) -> Client {
    Client::with_transport_factory(ClientConfig::new("demo", "production"), factory).unwrap()
}

fn message(event: &str, data: serde_json::Value) -> TransportEvent {
    TransportEvent::Message {
        event: event.to_owned(),
        data: data.to_string(),
    }
}

fn mutation_payload(document_id: &str) -> serde_json::Value {
    json!({
        "eventId": format!("{document_id}#rev"),
        "documentId": document_id,
        "transactionId": "tx-1",
        "transition": "update",
        "identity": "p-editor",
        "mutations": [{"patch": {"id": document_id}}],
        "resultRev": "rev-2",
        "timestamp": "2026-08-29T10:00:00Z",
        "transactionTotalEvents": 1,
        "transactionCurrentEvent": 0,
        "visibility": "transaction"
    })
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread")]
async fn listener_is_lazy_until_a_consumer_attaches() {
    let factory = StubFactory::with_scripts(vec![Script {
        hold_open: true,
        ..Default::default()
    }]);
    let client = client_with(Arc::clone(&factory));
    let listener = client.listen("*", ListenParams::new(), ListenOptions::default());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(factory.opens(), 0);

    let _events = listener.events();
    wait_for("first open", || factory.opens() == 1).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_query_fails_before_any_connection() {
    let factory = StubFactory::with_scripts(vec![]);
    let mut config = ClientConfig::new("demo", "production");
    config.listen.max_url_length = 300;
    config.listen.header_overhead = 200;
    let client =
        Client::with_transport_factory(config, Arc::clone(&factory) as Arc<dyn TransportFactory>)
            .unwrap();

    let long_filter = format!("*[_type == \"{}\"]", "x".repeat(400));
    let mut events = client
        .listen(&long_filter, ListenParams::new(), ListenOptions::default())
        .events();

    let first = events.next().await.expect("one terminal item").unwrap_err();
    assert_eq!(first.code_str(), "client/query-too-large");
    assert!(events.next().await.is_none());
    assert_eq!(factory.opens(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_disconnect_completes_the_sequence() {
    let factory = StubFactory::with_scripts(vec![Script {
        events: vec![
            message("welcome", json!({"listenerName": "lst-1"})),
            message("disconnect", json!({"reason": "dataset deleted"})),
        ],
        hold_open: true,
        ..Default::default()
    }]);
    let client = client_with(Arc::clone(&factory));

    // Default options: `welcome` is not forwarded, so a clean completion
    // delivers zero events.
    let mut events = client
        .listen("*", ListenParams::new(), ListenOptions::default())
        .events();

    let outcome = tokio::time::timeout(Duration::from_secs(2), events.next()).await;
    assert!(outcome.expect("sequence should complete").is_none());
    assert_eq!(factory.opens(), 1);
    assert_eq!(factory.closes(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn channel_errors_are_terminal_and_never_reconnect() {
    let factory = StubFactory::with_scripts(vec![Script {
        events: vec![message(
            "channelError",
            json!({"error": {"description": "unable to parse filter", "type": "queryParseError"}}),
        )],
        hold_open: true,
        ..Default::default()
    }]);
    let client = client_with(Arc::clone(&factory));

    let mut events = client
        .listen("*[", ListenParams::new(), ListenOptions::default())
        .events();

    let err = events.next().await.expect("terminal failure").unwrap_err();
    assert_eq!(err.code_str(), "client/channel-error");
    assert_eq!(err.message(), "unable to parse filter");
    assert!(events.next().await.is_none());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(factory.opens(), 1, "channel errors must not reconnect");
}

#[tokio::test(flavor = "multi_thread")]
async fn closed_transport_reconnects_after_notifying_the_subscriber() {
    let factory = StubFactory::with_scripts(vec![
        Script {
            events: vec![TransportEvent::Error(transport_error("connection reset"))],
            post_error_state: Some(ReadyState::Closed),
            hold_open: true,
        },
        Script {
            events: vec![message("mutation", mutation_payload("doc-1"))],
            hold_open: true,
            ..Default::default()
        },
    ]);
    let client = client_with(Arc::clone(&factory));

    let options = ListenOptions {
        events: Some(vec![EventKind::Mutation, EventKind::Reconnect]),
        ..Default::default()
    };
    let mut events = client.listen("*", ListenParams::new(), options).events();

    let first = events.next().await.expect("reconnect notification").unwrap();
    assert!(matches!(first, ListenEvent::Reconnect));

    let second = events.next().await.expect("mutation after reconnect").unwrap();
    let ListenEvent::Mutation(mutation) = second else {
        panic!("expected mutation, got {second:?}");
    };
    assert_eq!(mutation.document_id, "doc-1");

    assert_eq!(factory.opens(), 2);
    let times = factory.open_times.lock().unwrap();
    let elapsed = times[1].duration_since(times[0]);
    assert!(
        elapsed >= Duration::from_millis(100),
        "reconnect happened after {elapsed:?}, expected >= 100ms"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn auto_reconnecting_transport_is_left_alone() {
    let factory = StubFactory::with_scripts(vec![Script {
        events: vec![
            TransportEvent::Error(transport_error("transient blip")),
            message("mutation", mutation_payload("doc-2")),
        ],
        // Readiness stays untouched: the transport recovers on its own.
        post_error_state: Some(ReadyState::Connecting),
        hold_open: true,
    }]);
    let client = client_with(Arc::clone(&factory));

    let mut events = client
        .listen("*", ListenParams::new(), ListenOptions::default())
        .events();

    let event = events.next().await.expect("mutation after blip").unwrap();
    assert!(matches!(event, ListenEvent::Mutation(_)));
    assert_eq!(factory.opens(), 1, "a connecting transport is not reopened");
    assert_eq!(factory.closes(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn error_on_a_still_open_transport_does_not_reopen_it() {
    let factory = StubFactory::with_scripts(vec![Script {
        events: vec![
            TransportEvent::Error(transport_error("recoverable hiccup")),
            message("mutation", mutation_payload("doc-4")),
        ],
        // Readiness stays `Open` through the error.
        post_error_state: None,
        hold_open: true,
    }]);
    let client = client_with(Arc::clone(&factory));

    let mut events = client
        .listen("*", ListenParams::new(), ListenOptions::default())
        .events();

    let event = events.next().await.expect("mutation after hiccup").unwrap();
    assert!(matches!(event, ListenEvent::Mutation(_)));
    assert_eq!(factory.opens(), 1, "an open transport is not reopened");
    assert_eq!(factory.closes(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_tears_down_exactly_once() {
    let factory = StubFactory::with_scripts(vec![Script {
        hold_open: true,
        ..Default::default()
    }]);
    let client = client_with(Arc::clone(&factory));

    let mut events = client
        .listen("*", ListenParams::new(), ListenOptions::default())
        .events();
    let registration = events.registration();
    wait_for("open", || factory.opens() == 1).await;

    registration.detach();
    registration.detach();
    assert!(registration.is_detached());

    wait_for("teardown", || factory.closes() == 1).await;
    assert!(events.next().await.is_none(), "no events after cancellation");
    assert_eq!(factory.closes(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_the_stream_detaches_the_connection() {
    let factory = StubFactory::with_scripts(vec![Script {
        hold_open: true,
        ..Default::default()
    }]);
    let client = client_with(Arc::clone(&factory));

    let events = client
        .listen("*", ListenParams::new(), ListenOptions::default())
        .events();
    wait_for("open", || factory.opens() == 1).await;

    drop(events);
    wait_for("teardown", || factory.closes() == 1).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn observer_callbacks_see_events_and_completion() {
    let factory = StubFactory::with_scripts(vec![Script {
        events: vec![
            message("mutation", mutation_payload("doc-3")),
            message("disconnect", json!({"reason": "project blocked"})),
        ],
        hold_open: true,
        ..Default::default()
    }]);
    let client = client_with(Arc::clone(&factory));

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(AtomicBool::new(false));

    let captured = Arc::clone(&seen);
    let complete_flag = Arc::clone(&completed);
    let observer = PartialObserver::new()
        .with_next(move |event: &ListenEvent| {
            if let ListenEvent::Mutation(mutation) = event {
                captured.lock().unwrap().push(mutation.document_id.clone());
            }
        })
        .with_complete(move || {
            complete_flag.store(true, Ordering::SeqCst);
        });

    let _registration = client
        .listen("*", ListenParams::new(), ListenOptions::default())
        .subscribe(observer);

    wait_for("completion", || completed.load(Ordering::SeqCst)).await;
    assert_eq!(seen.lock().unwrap().as_slice(), &["doc-3".to_owned()]);
}

#[test]
fn attaching_without_an_ambient_runtime_still_connects() {
    let factory = StubFactory::with_scripts(vec![Script {
        events: vec![
            message("mutation", mutation_payload("doc-9")),
            message("disconnect", json!({})),
        ],
        hold_open: true,
        ..Default::default()
    }]);
    let client = client_with(Arc::clone(&factory));

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let completed = Arc::new(AtomicBool::new(false));

    let captured = Arc::clone(&seen);
    let complete_flag = Arc::clone(&completed);
    let observer = PartialObserver::new()
        .with_next(move |event: &ListenEvent| {
            if let ListenEvent::Mutation(mutation) = event {
                captured.lock().unwrap().push(mutation.document_id.clone());
            }
        })
        .with_complete(move || {
            complete_flag.store(true, Ordering::SeqCst);
        });

    // No tokio runtime anywhere on this thread: the attachment rides the
    // crate's fallback runtime and must still connect and deliver.
    let _registration = client
        .listen("*", ListenParams::new(), ListenOptions::default())
        .subscribe(observer);

    for _ in 0..200 {
        if completed.load(Ordering::SeqCst) {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(
        completed.load(Ordering::SeqCst),
        "subscription made outside a runtime never completed"
    );
    assert_eq!(factory.opens(), 1);
    assert_eq!(seen.lock().unwrap().as_slice(), &["doc-9".to_owned()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_payloads_terminate_with_a_decode_error() {
    let factory = StubFactory::with_scripts(vec![Script {
        events: vec![TransportEvent::Message {
            event: "mutation".to_owned(),
            data: "{not json".to_owned(),
        }],
        hold_open: true,
        ..Default::default()
    }]);
    let client = client_with(Arc::clone(&factory));

    let mut events = client
        .listen("*", ListenParams::new(), ListenOptions::default())
        .events();

    let err = events.next().await.expect("decode failure").unwrap_err();
    assert_eq!(err.code_str(), "client/decode");
    assert!(events.next().await.is_none());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(factory.opens(), 1, "decode errors must not reconnect");
}
