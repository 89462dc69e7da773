//! Transport seams for the listen connection.
//!
//! The connection controller never talks HTTP directly; it pulls
//! [`TransportEvent`]s from an [`EventSourceTransport`] handed out by an
//! injected [`TransportFactory`]. Tests substitute a scripted factory, the
//! native build ships a reqwest-backed one, and wasm consumers plug in a
//! browser EventSource wrapper of their own.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ClientError, ClientResult};

/// Coarse connection state, mirroring the EventSource readiness model.
///
/// After a transport-level error the controller inspects this to decide
/// whether the transport is already reconnecting on its own (`Connecting`)
/// or whether the connection is gone for good (`Closed`) and has to be
/// reopened from the outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

/// One occurrence on an open transport.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// A named server-sent message with its raw text payload.
    Message { event: String, data: String },
    /// A transport-level failure. Recoverable; the controller decides
    /// whether to wait for the transport or reopen it.
    Error(ClientError),
}

/// Everything a factory needs to open one listen connection.
#[derive(Clone, Debug)]
pub struct ConnectRequest {
    pub url: String,
    pub bearer_token: Option<String>,
    pub with_credentials: bool,
}

/// A live server-push connection delivering named events.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait EventSourceTransport: Send + Sync {
    /// Waits for the next transport event. `None` means the stream ended
    /// and no further events will arrive from this handle.
    async fn next(&self) -> Option<TransportEvent>;

    fn ready_state(&self) -> ReadyState;

    /// Releases the connection. Must be idempotent.
    async fn close(&self);
}

/// Opens listen connections on demand.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, request: &ConnectRequest)
        -> ClientResult<Arc<dyn EventSourceTransport>>;
}
