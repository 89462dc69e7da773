//! Native `reqwest`-backed event-source transport.
//!
//! Opens the listen URL with `Accept: text/event-stream`, feeds the
//! response body through the SSE parser on a detached reader task, and
//! hands frames to the controller over a channel. This transport does not
//! reconnect by itself: any failure or end-of-stream flips it to `Closed`
//! and the connection controller reopens through the factory.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use async_trait::async_trait;
use futures::future::{select, Either};
use futures::pin_mut;
use futures_util::StreamExt;

use crate::error::{transport_error, ClientResult};
use crate::listen::sse::SseParser;
use crate::listen::transport::{
    ConnectRequest, EventSourceTransport, ReadyState, TransportEvent, TransportFactory,
};
use crate::platform::runtime;

const STATE_OPEN: u8 = 0;
const STATE_CLOSED: u8 = 1;

/// Opens listen connections over a shared `reqwest` client.
#[derive(Clone, Debug, Default)]
pub struct HttpTransportFactory {
    client: reqwest::Client,
}

impl HttpTransportFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TransportFactory for HttpTransportFactory {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> ClientResult<Arc<dyn EventSourceTransport>> {
        let mut builder = self
            .client
            .get(&request.url)
            .header("Accept", "text/event-stream");
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| transport_error(format!("listen request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(transport_error(format!(
                "listen request failed with status {status}"
            )));
        }

        let (events_tx, events_rx) = async_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = async_channel::bounded::<()>(1);
        let state = Arc::new(AtomicU8::new(STATE_OPEN));

        let reader_state = Arc::clone(&state);
        runtime::spawn_detached(async move {
            read_event_stream(response, events_tx, reader_state, shutdown_rx).await;
        });

        Ok(Arc::new(HttpEventSource {
            events: events_rx,
            state,
            shutdown: shutdown_tx,
        }))
    }
}

async fn read_event_stream(
    response: reqwest::Response,
    events: Sender<TransportEvent>,
    state: Arc<AtomicU8>,
    shutdown: Receiver<()>,
) {
    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();

    loop {
        let chunk = {
            let next_chunk = body.next();
            let closed = shutdown.recv();
            pin_mut!(next_chunk, closed);
            match select(next_chunk, closed).await {
                Either::Left((chunk, _)) => chunk,
                // `close()` was called; returning drops the response and
                // with it the HTTP connection, even mid-body.
                Either::Right(_) => return,
            }
        };

        match chunk {
            Some(Ok(bytes)) => {
                for frame in parser.feed(&bytes) {
                    let message = TransportEvent::Message {
                        event: frame.event,
                        data: frame.data,
                    };
                    if events.send(message).await.is_err() {
                        // Handle closed under us; drop the connection.
                        return;
                    }
                }
            }
            Some(Err(err)) => {
                state.store(STATE_CLOSED, Ordering::SeqCst);
                let _ = events
                    .send(TransportEvent::Error(transport_error(format!(
                        "listen stream failed: {err}"
                    ))))
                    .await;
                return;
            }
            // Server closed the response body; an SSE stream is
            // indefinite, so treat EOF as a dropped connection.
            None => {
                state.store(STATE_CLOSED, Ordering::SeqCst);
                return;
            }
        }
    }
}

struct HttpEventSource {
    events: Receiver<TransportEvent>,
    state: Arc<AtomicU8>,
    shutdown: Sender<()>,
}

#[async_trait]
impl EventSourceTransport for HttpEventSource {
    async fn next(&self) -> Option<TransportEvent> {
        self.events.recv().await.ok()
    }

    fn ready_state(&self) -> ReadyState {
        match self.state.load(Ordering::SeqCst) {
            STATE_OPEN => ReadyState::Open,
            _ => ReadyState::Closed,
        }
    }

    async fn close(&self) {
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        // Closing the shutdown channel wakes the reader out of a pending
        // body read so the response is dropped right away.
        self.shutdown.close();
        self.events.close();
    }
}
