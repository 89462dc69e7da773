//! Realtime change listeners.
//!
//! [`crate::Client::listen`] builds a [`Listener`]: a lazy, cold
//! description of one filtered listen subscription. Nothing touches the
//! network until a consumer attaches through [`Listener::events`] or
//! [`Listener::subscribe`]; every attachment gets its own connection, and
//! detaching tears that connection down.
//!
//! ```no_run
//! use contentlake_rs_sdk::{Client, ClientConfig};
//! use contentlake_rs_sdk::listen::{ListenOptions, ListenParams};
//! use futures_util::StreamExt;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(ClientConfig::new("my-project", "production"))?;
//! let listener = client.listen(
//!     "*[_type == \"post\"]",
//!     ListenParams::new(),
//!     ListenOptions::default(),
//! );
//! let mut events = listener.events();
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod controller;
pub mod event;
#[cfg(not(target_arch = "wasm32"))]
pub mod http;
pub(crate) mod sse;
pub mod transport;

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use futures_util::StreamExt;
use serde_json::Value;

use crate::config::{resolve_tag, ClientConfig};
use crate::encode::encode_query_string;
use crate::error::ClientResult;
use crate::listen::controller::{ConnectionController, ListenPlan};
use crate::listen::transport::TransportFactory;
use crate::platform::runtime;
use crate::urls::{check_url_length, data_url};
use crate::util::subscribe::PartialObserver;

pub use event::{
    ChannelErrorEvent, DisconnectEvent, EventKind, ListenEvent, MutationEvent, Transition,
    Visibility, WelcomeEvent,
};
#[cfg(not(target_arch = "wasm32"))]
pub use http::HttpTransportFactory;
pub use transport::{ConnectRequest, EventSourceTransport, ReadyState, TransportEvent};

/// Named parameters referenced from the filter as `$name`, JSON-encoded on
/// the wire so their types survive the round trip.
pub type ListenParams = BTreeMap<String, Value>;

/// Structural diff formats the server can attach to mutation events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectFormat {
    Mendoza,
}

impl EffectFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectFormat::Mendoza => "mendoza",
        }
    }
}

/// Options for one listen subscription.
///
/// `None` fields fall back to the server defaults (`includeResult` and
/// `includeMutations` on, everything else off); they are only put on the
/// wire when set here.
#[derive(Clone, Debug, Default)]
pub struct ListenOptions {
    /// Include the post-mutation document in mutation events.
    pub include_result: Option<bool>,
    /// Include the pre-mutation document in mutation events.
    pub include_previous_revision: Option<bool>,
    /// Include the list of applied mutation operations.
    pub include_mutations: Option<bool>,
    /// Deliver draft/version variants, not only published documents.
    pub include_all_versions: Option<bool>,
    /// Fire at commit time or only once query-visible.
    pub visibility: Option<Visibility>,
    /// Request structural diff effects on mutation events.
    pub effect_format: Option<EffectFormat>,
    /// Event kinds to deliver; defaults to mutations only.
    pub events: Option<Vec<EventKind>>,
    /// Request-tagging label, namespaced by the configured prefix.
    pub tag: Option<String>,
}

impl ListenOptions {
    /// Event kinds forwarded to the subscriber.
    pub(crate) fn forwarded(&self) -> Vec<EventKind> {
        self.events
            .clone()
            .unwrap_or_else(|| vec![EventKind::Mutation])
    }

    /// Wire-level option pairs, `tag` and `events` excluded: the tag is
    /// encoded first separately and `events` only selects local handlers.
    pub(crate) fn option_pairs(&self) -> Vec<(&'static str, Value)> {
        let mut pairs = Vec::new();
        if let Some(value) = self.include_result {
            pairs.push(("includeResult", Value::Bool(value)));
        }
        if let Some(value) = self.include_previous_revision {
            pairs.push(("includePreviousRevision", Value::Bool(value)));
        }
        if let Some(value) = self.include_mutations {
            pairs.push(("includeMutations", Value::Bool(value)));
        }
        if let Some(value) = self.include_all_versions {
            pairs.push(("includeAllVersions", Value::Bool(value)));
        }
        if let Some(visibility) = self.visibility {
            pairs.push(("visibility", Value::String(visibility.as_str().to_owned())));
        }
        if let Some(format) = self.effect_format {
            pairs.push(("effectFormat", Value::String(format.as_str().to_owned())));
        }
        pairs
    }
}

/// A lazy, cold description of one listen subscription.
pub struct Listener {
    plan: ClientResult<ListenPlan>,
    factory: Arc<dyn TransportFactory>,
}

impl Listener {
    pub(crate) fn new(
        config: &ClientConfig,
        factory: Arc<dyn TransportFactory>,
        query: &str,
        params: &ListenParams,
        options: &ListenOptions,
    ) -> Self {
        Self {
            plan: build_plan(config, query, params, options),
            factory,
        }
    }

    /// Attaches a consumer and returns the event stream for its own,
    /// freshly opened connection. Dropping the stream detaches it.
    pub fn events(&self) -> ListenEvents {
        let (events_tx, events_rx) = async_channel::unbounded();
        let (cancel_tx, cancel_rx) = async_channel::bounded::<()>(1);
        let registration = ListenerRegistration { cancel: cancel_tx };

        match &self.plan {
            Ok(plan) => {
                let controller = ConnectionController::new(
                    Arc::clone(&self.factory),
                    plan.clone(),
                    events_tx,
                    cancel_rx,
                );
                runtime::spawn_detached(controller.run());
            }
            Err(err) => {
                // Validation failures travel down the same channel the
                // subscriber already watches, as the sole terminal item.
                let err = err.clone();
                runtime::spawn_detached(async move {
                    let _ = events_tx.send(Err(err)).await;
                });
            }
        }

        ListenEvents {
            receiver: events_rx,
            registration,
        }
    }

    /// Attaches observer callbacks on a dedicated connection. The returned
    /// registration detaches it.
    pub fn subscribe(&self, observer: PartialObserver<ListenEvent>) -> ListenerRegistration {
        let mut events = self.events();
        let registration = events.registration();
        runtime::spawn_detached(async move {
            loop {
                match events.next().await {
                    Some(Ok(event)) => {
                        if let Some(next) = &observer.next {
                            next(&event);
                        }
                    }
                    Some(Err(err)) => {
                        if let Some(error) = &observer.error {
                            error(&err);
                        }
                        return;
                    }
                    None => {
                        if let Some(complete) = &observer.complete {
                            complete();
                        }
                        return;
                    }
                }
            }
        });
        registration
    }
}

fn build_plan(
    config: &ClientConfig,
    query: &str,
    params: &ListenParams,
    options: &ListenOptions,
) -> ClientResult<ListenPlan> {
    let tag = resolve_tag(config, options.tag.as_deref())?;
    let query_string = encode_query_string(query, params, tag.as_deref(), &options.option_pairs());
    let url = data_url(config, "listen", &query_string);
    check_url_length(config, &url)?;

    Ok(ListenPlan {
        url,
        bearer_token: config.token.clone(),
        with_credentials: config.with_credentials || config.token.is_some(),
        forwarded: options.forwarded(),
        reconnect_delay: config.listen.reconnect_delay,
    })
}

/// Handle for detaching one attachment; cheap to clone, idempotent.
#[derive(Clone, Debug)]
pub struct ListenerRegistration {
    cancel: async_channel::Sender<()>,
}

impl ListenerRegistration {
    /// Cancels the attachment: the connection closes and any pending
    /// reconnect is abandoned. Calling this more than once is a no-op.
    pub fn detach(&self) {
        self.cancel.close();
    }

    pub fn is_detached(&self) -> bool {
        self.cancel.is_closed()
    }
}

/// The event sequence delivered to one attached consumer.
///
/// Ends without an item on graceful server disconnect; a terminal failure
/// is the last item before the end. Dropping the stream detaches the
/// underlying connection.
pub struct ListenEvents {
    receiver: async_channel::Receiver<ClientResult<ListenEvent>>,
    registration: ListenerRegistration,
}

impl ListenEvents {
    pub fn registration(&self) -> ListenerRegistration {
        self.registration.clone()
    }
}

impl Stream for ListenEvents {
    type Item = ClientResult<ListenEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().receiver).poll_next(cx)
    }
}

impl Drop for ListenEvents {
    fn drop(&mut self) {
        self.registration.detach();
    }
}
