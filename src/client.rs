use std::sync::Arc;

use crate::config::{validate_config, ClientConfig};
use crate::error::ClientResult;
use crate::listen::transport::TransportFactory;
use crate::listen::{ListenOptions, ListenParams, Listener};

/// Handle to one project/dataset pair.
///
/// Cheap to clone; configuration is validated once here so the listen path
/// can assume well-formed identifiers.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    transport_factory: Arc<dyn TransportFactory>,
}

impl Client {
    /// Creates a client with the built-in HTTP transport.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::with_transport_factory(
            config,
            Arc::new(crate::listen::http::HttpTransportFactory::default()),
        )
    }

    /// Creates a client with an injected transport factory. This is the
    /// only constructor on wasm, where the host supplies an EventSource
    /// wrapper; on native it is the seam tests use to substitute a
    /// scripted transport.
    pub fn with_transport_factory(
        config: ClientConfig,
        transport_factory: Arc<dyn TransportFactory>,
    ) -> ClientResult<Self> {
        validate_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            transport_factory,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Describes a realtime subscription to all documents matching
    /// `query`. No connection is opened until a consumer attaches to the
    /// returned [`Listener`].
    pub fn listen(&self, query: &str, params: ListenParams, options: ListenOptions) -> Listener {
        Listener::new(
            &self.config,
            Arc::clone(&self.transport_factory),
            query,
            &params,
            &options,
        )
    }
}
