//! # tourney-client
//!
//! Client engine for a stateful, bidirectional tournament-coordination
//! protocol carried over a persistent duplex connection.
//!
//! The crate turns a fire-and-forget packet stream into awaitable
//! request/response semantics: a request fans out to zero, one, or many
//! remote recipients, and the [`protocol::correlator::Correlator`]
//! aggregates their responses (synthesizing failures for non-responders)
//! under a single deadline. [`client::TourneyClient`] drives the connect
//! handshake, heartbeats, and teardown, while the
//! [`protocol::dispatcher::Dispatcher`] routes every inbound envelope to
//! the correlator, the event stream, or the external state reducer.
//!
//! ## Quick start
//! ```ignore
//! use tourney_client::client::TourneyClient;
//! use tourney_client::config::ClientConfig;
//!
//! let client = TourneyClient::new(ClientConfig::default());
//! client.set_auth_token("my-token").await;
//!
//! let mut events = client.subscribe();
//! let details = client.connect().await?;
//!
//! let response = client.join_tournament("weekly-cup").await?;
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{ConnectionState, TourneyClient};
pub use config::ClientConfig;
pub use core::packet::{
    Command, Envelope, Outcome, Payload, Push, Request, Response, ResponseDetails,
    SERVER_IDENTITY,
};
pub use error::{ClientError, Result};
pub use protocol::correlator::{Correlator, ResponseFrom};
pub use protocol::dispatcher::{DispatchOutcome, NoopStateHandler, StateHandler};
pub use protocol::events::ClientEvent;
