//! The listen connection state machine.
//!
//! One controller instance drives exactly one subscriber attachment:
//! `idle → opening → open → (reconnect-scheduled → opening)* → stopped`.
//! Each transition function returns the next phase, so the invariants fall
//! out of the structure: the single `transport` slot can hold at most one
//! live handle, the `ReconnectScheduled` arm is the only pending timer, and
//! `Stopped` exits the loop for good — callbacks arriving after that are
//! never observed.

use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use futures::future::{select, Either};
use futures::pin_mut;

use crate::error::ClientResult;
use crate::listen::event::{coerce_channel_error, decode_event, EventKind, ListenEvent};
use crate::listen::transport::{
    ConnectRequest, EventSourceTransport, ReadyState, TransportEvent, TransportFactory,
};
use crate::platform::runtime;

/// Everything computed once at subscribe time, before any I/O.
#[derive(Clone, Debug)]
pub(crate) struct ListenPlan {
    pub url: String,
    pub bearer_token: Option<String>,
    pub with_credentials: bool,
    /// Event kinds forwarded to the subscriber.
    pub forwarded: Vec<EventKind>,
    pub reconnect_delay: Duration,
}

impl ListenPlan {
    fn connect_request(&self) -> ConnectRequest {
        ConnectRequest {
            url: self.url.clone(),
            bearer_token: self.bearer_token.clone(),
            with_credentials: self.with_credentials,
        }
    }

    fn emits_reconnect(&self) -> bool {
        self.forwarded.contains(&EventKind::Reconnect)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Opening,
    Open,
    ReconnectScheduled,
    Stopped,
}

pub(crate) struct ConnectionController {
    factory: Arc<dyn TransportFactory>,
    plan: ListenPlan,
    events: Sender<ClientResult<ListenEvent>>,
    cancel: Receiver<()>,
}

impl ConnectionController {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        plan: ListenPlan,
        events: Sender<ClientResult<ListenEvent>>,
        cancel: Receiver<()>,
    ) -> Self {
        Self {
            factory,
            plan,
            events,
            cancel,
        }
    }

    /// Drives the connection until the subscriber detaches, the server ends
    /// the stream, or a terminal error is delivered. Completion is signalled
    /// by dropping the event sender.
    pub async fn run(self) {
        let mut transport: Option<Arc<dyn EventSourceTransport>> = None;
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => Phase::Opening,
                Phase::Opening => self.open(&mut transport).await,
                Phase::Open => self.pump(&mut transport).await,
                Phase::ReconnectScheduled => self.wait_reconnect().await,
                Phase::Stopped => break,
            };
        }
        // Transitions into Stopped tear their own handle down; this only
        // fires if a future transition forgets to.
        if let Some(transport) = transport.take() {
            transport.close().await;
        }
    }

    async fn open(&self, slot: &mut Option<Arc<dyn EventSourceTransport>>) -> Phase {
        let request = self.plan.connect_request();
        let connect = self.factory.connect(&request);
        let cancelled = self.cancelled();
        pin_mut!(connect, cancelled);

        match select(connect, cancelled).await {
            Either::Left((Ok(transport), _)) => {
                *slot = Some(transport);
                Phase::Open
            }
            Either::Left((Err(err), _)) => {
                log::warn!("listen connection attempt failed: {err}");
                if !self.notify_reconnect().await {
                    return Phase::Stopped;
                }
                Phase::ReconnectScheduled
            }
            Either::Right(_) => Phase::Stopped,
        }
    }

    async fn pump(&self, slot: &mut Option<Arc<dyn EventSourceTransport>>) -> Phase {
        let transport = match slot.as_ref() {
            Some(transport) => Arc::clone(transport),
            None => return Phase::Stopped,
        };

        loop {
            let event = {
                let next = transport.next();
                let cancelled = self.cancelled();
                pin_mut!(next, cancelled);
                match select(next, cancelled).await {
                    Either::Left((event, _)) => event,
                    Either::Right(_) => {
                        self.teardown(slot).await;
                        return Phase::Stopped;
                    }
                }
            };

            match event {
                Some(TransportEvent::Message { event, data }) => {
                    if let Some(next) = self.handle_message(slot, &event, &data).await {
                        return next;
                    }
                }
                Some(TransportEvent::Error(err)) => {
                    log::debug!("listen transport error: {err}");
                    if let Some(next) = self.handle_transport_failure(slot, &transport).await {
                        return next;
                    }
                }
                None => {
                    // End of stream without a disconnect event: the
                    // connection dropped underneath us.
                    log::debug!("listen stream ended unexpectedly; scheduling reconnect");
                    if !self.notify_reconnect().await {
                        self.teardown(slot).await;
                        return Phase::Stopped;
                    }
                    self.teardown(slot).await;
                    return Phase::ReconnectScheduled;
                }
            }
        }
    }

    /// Handles one named server event. Returns the next phase for terminal
    /// signals, `None` to keep pumping.
    async fn handle_message(
        &self,
        slot: &mut Option<Arc<dyn EventSourceTransport>>,
        name: &str,
        data: &str,
    ) -> Option<Phase> {
        match name {
            // Request-level failure; reconnecting would fail identically.
            "channelError" => {
                let err = coerce_channel_error(data);
                self.send(Err(err)).await;
                self.teardown(slot).await;
                Some(Phase::Stopped)
            }
            // Intentional server-side termination; complete, don't fail.
            "disconnect" => {
                match decode_event(name, data) {
                    Ok(Some(ListenEvent::Disconnect(event))) => {
                        log::debug!(
                            "listener disconnected by server: {}",
                            event.reason.as_deref().unwrap_or("no reason given")
                        );
                    }
                    _ => log::debug!("listener disconnected by server"),
                }
                self.teardown(slot).await;
                Some(Phase::Stopped)
            }
            _ => match EventKind::parse(name) {
                Some(kind) if self.plan.forwarded.contains(&kind) => {
                    match decode_event(name, data) {
                        Ok(Some(event)) => {
                            if self.send(Ok(event)).await {
                                None
                            } else {
                                self.teardown(slot).await;
                                Some(Phase::Stopped)
                            }
                        }
                        Ok(None) => None,
                        Err(err) => {
                            self.send(Err(err)).await;
                            self.teardown(slot).await;
                            Some(Phase::Stopped)
                        }
                    }
                }
                // Known but not requested, or outside the closed set.
                _ => None,
            },
        }
    }

    /// Transport-level failure while open: notify (when requested), then
    /// either let an auto-reconnecting transport carry on or reopen it
    /// ourselves after the configured delay.
    async fn handle_transport_failure(
        &self,
        slot: &mut Option<Arc<dyn EventSourceTransport>>,
        transport: &Arc<dyn EventSourceTransport>,
    ) -> Option<Phase> {
        // The subscriber hears about the reconnect before it happens, and
        // gets the chance to detach first.
        if !self.notify_reconnect().await {
            self.teardown(slot).await;
            return Some(Phase::Stopped);
        }
        if self.cancel.is_closed() {
            self.teardown(slot).await;
            return Some(Phase::Stopped);
        }

        match transport.ready_state() {
            // The transport reconnects on its own, or the error left the
            // connection usable; keep listening.
            ReadyState::Connecting | ReadyState::Open => None,
            // OS-level connection loss, e.g. a network interface waking
            // from sleep; the handle is dead and must be replaced.
            ReadyState::Closed => {
                self.teardown(slot).await;
                Some(Phase::ReconnectScheduled)
            }
        }
    }

    async fn wait_reconnect(&self) -> Phase {
        let delay = runtime::sleep(self.plan.reconnect_delay);
        let cancelled = self.cancelled();
        pin_mut!(delay, cancelled);
        match select(delay, cancelled).await {
            Either::Left(_) => Phase::Opening,
            Either::Right(_) => Phase::Stopped,
        }
    }

    /// Emits the `reconnect` notification when the subscriber asked for it.
    /// Returns false once the subscriber is gone.
    async fn notify_reconnect(&self) -> bool {
        if self.plan.emits_reconnect() {
            self.send(Ok(ListenEvent::Reconnect)).await
        } else {
            !self.events.is_closed()
        }
    }

    async fn send(&self, item: ClientResult<ListenEvent>) -> bool {
        self.events.send(item).await.is_ok()
    }

    async fn teardown(&self, slot: &mut Option<Arc<dyn EventSourceTransport>>) {
        if let Some(transport) = slot.take() {
            transport.close().await;
        }
    }

    /// Resolves once the subscriber detaches.
    async fn cancelled(&self) {
        let _ = self.cancel.recv().await;
    }
}
