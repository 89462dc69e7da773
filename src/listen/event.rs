//! Typed listener events and the decode boundary.
//!
//! One raw transport message becomes one [`ListenEvent`] by parsing the
//! payload as JSON and folding in the transport-level event name as the
//! `type` tag. The variant set is closed: names outside of it are dropped
//! at this boundary instead of being forwarded as untyped shapes.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{channel_error, decode_error, ClientError, ClientResult};

/// Event kinds a listener can ask the server to deliver.
///
/// `channelError` and `disconnect` signals are always consumed by the
/// connection itself and are not part of this set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Mutation,
    Welcome,
    Reconnect,
    Open,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Mutation => "mutation",
            EventKind::Welcome => "welcome",
            EventKind::Reconnect => "reconnect",
            EventKind::Open => "open",
        }
    }

    pub(crate) fn parse(name: &str) -> Option<Self> {
        match name {
            "mutation" => Some(EventKind::Mutation),
            "welcome" => Some(EventKind::Welcome),
            "reconnect" => Some(EventKind::Reconnect),
            "open" => Some(EventKind::Open),
            _ => None,
        }
    }
}

/// Whether a mutation event fires at commit time or only once the change is
/// visible to queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Transaction,
    Query,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Transaction => "transaction",
            Visibility::Query => "query",
        }
    }
}

/// How a mutation changed the document's membership in the filtered set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// Document matched before and after the mutation.
    Update,
    /// Document entered the filtered set.
    Appear,
    /// Document left the filtered set.
    Disappear,
}

/// A single document change delivered over the listen stream.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEvent {
    pub event_id: String,
    pub document_id: String,
    pub transaction_id: String,
    pub transition: Transition,
    /// Actor that performed the mutation.
    pub identity: String,
    /// Mutation operations applied by this transaction, as raw JSON.
    #[serde(default)]
    pub mutations: Vec<Value>,
    #[serde(default)]
    pub previous_rev: Option<String>,
    #[serde(default)]
    pub result_rev: Option<String>,
    /// Post-mutation document snapshot, when `includeResult` is on.
    #[serde(default)]
    pub result: Option<Value>,
    /// Pre-mutation document snapshot, when `includePreviousRevision` is on.
    #[serde(default)]
    pub previous: Option<Value>,
    /// Structural diff in the requested effect format.
    #[serde(default)]
    pub effects: Option<Value>,
    pub timestamp: DateTime<Utc>,
    /// Events in this transaction touching subscribed documents.
    pub transaction_total_events: u32,
    /// Zero-based index of this event within the transaction.
    pub transaction_current_event: u32,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeEvent {
    /// Server-assigned name of the listener instance.
    pub listener_name: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectEvent {
    /// Why the server chose to end the stream, e.g. a deleted dataset.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Server payload of a `channelError` signal, the request-level failure
/// channel. Never surfaces as a [`ListenEvent`]: the connection converts it
/// into a terminal [`ClientError`] via [`coerce_channel_error`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelErrorEvent {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// Everything the listen stream can deliver, tagged by the transport-level
/// event name. `channelError` is absent on purpose: it reaches the
/// subscriber as an error, not as an event.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ListenEvent {
    Mutation(Box<MutationEvent>),
    Welcome(WelcomeEvent),
    Open,
    Reconnect,
    Disconnect(DisconnectEvent),
}

const KNOWN_EVENT_NAMES: [&str; 5] = ["mutation", "welcome", "open", "reconnect", "disconnect"];

/// Decodes one raw transport message into a typed event.
///
/// Returns `Ok(None)` for event names outside the closed set. A known name
/// with an unparsable payload is a decode error, never a partial event.
pub(crate) fn decode_event(name: &str, data: &str) -> ClientResult<Option<ListenEvent>> {
    if !KNOWN_EVENT_NAMES.contains(&name) {
        return Ok(None);
    }

    let payload = if data.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(data)
            .map_err(|err| decode_error(format!("unable to parse listener event \"{name}\": {err}")))?
    };

    let mut merged = match payload {
        Value::Object(map) => map,
        other => {
            return Err(decode_error(format!(
                "listener event \"{name}\" carried a non-object payload: {other}"
            )))
        }
    };
    merged.insert("type".to_owned(), Value::String(name.to_owned()));

    serde_json::from_value(Value::Object(merged))
        .map(Some)
        .map_err(|err| decode_error(format!("malformed listener event \"{name}\": {err}")))
}

/// Turns the server's channel-error payload into a human-readable error.
///
/// Prefers `error.description`, then a JSON dump of `error`, then the
/// top-level `message`, then a fixed fallback. Payloads that are not JSON
/// objects are wrapped as-is.
pub(crate) fn coerce_channel_error(data: &str) -> ClientError {
    match serde_json::from_str::<ChannelErrorEvent>(data) {
        Ok(event) => {
            if let Some(error) = event.error {
                if let Some(description) = error.get("description").and_then(Value::as_str) {
                    return channel_error(description);
                }
                return channel_error(error.to_string());
            }
            if let Some(message) = event.message {
                return channel_error(message);
            }
            channel_error("Unknown listener error")
        }
        Err(_) if data.trim().is_empty() => channel_error("Unknown listener error"),
        Err(_) => channel_error(data),
    }
}
