//! # contentlake-rs-sdk
//!
//! Rust client for a hosted content lake, focused on the realtime
//! change-listener protocol: a long-lived Server-Sent-Events connection to
//! a filtered subset of documents, decoded into typed events, with
//! transparent recovery from transport failures.
//!
//! ```no_run
//! use contentlake_rs_sdk::{Client, ClientConfig};
//! use contentlake_rs_sdk::listen::{EventKind, ListenOptions, ListenParams};
//! use futures_util::StreamExt;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = ClientConfig::new("my-project", "production");
//! config.token = Some("sk-…".into());
//! let client = Client::new(config)?;
//!
//! let mut params = ListenParams::new();
//! params.insert("type".into(), serde_json::json!("post"));
//! let options = ListenOptions {
//!     events: Some(vec![EventKind::Mutation, EventKind::Reconnect]),
//!     ..Default::default()
//! };
//!
//! let mut events = client
//!     .listen("*[_type == $type]", params, options)
//!     .events();
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
mod encode;
pub mod error;
pub mod listen;
pub mod platform;
mod urls;
pub mod util;

pub use client::Client;
pub use config::{ClientConfig, ListenSettings};
pub use error::{ClientError, ClientErrorCode, ClientResult};
pub use listen::{ListenEvent, ListenOptions, Listener};
