//! # Error Types
//!
//! Error handling for the tournament client engine.
//!
//! This module defines all error variants that can occur while driving a
//! connection, from low-level I/O failures to protocol-level rejections.
//!
//! ## Error Categories
//! - **I/O Errors**: Socket and framing failures
//! - **Protocol Errors**: Invalid frames, oversized packets, version mismatch
//! - **Lifecycle Errors**: Connect handshake timeout, authorization challenge
//!
//! Note the deliberate asymmetry with request timeouts: a request that times
//! out still *resolves* with synthetic failure responses. `ClientError::Timeout`
//! is only surfaced by the top-level connect handshake and by convenience
//! wrappers whose sole expected respondent (the server) never answered.

use std::io;
use thiserror::Error;

/// Error message constants backing the `Display` impls below, available to
/// callers that match on rendered messages.
pub mod constants {
    /// Connect handshake errors
    pub const ERR_SERVER_TIMED_OUT: &str = "Server timed out";
    pub const ERR_AUTHORIZATION_REQUIRED: &str = "Authorization token invalid or not provided";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_NOT_CONNECTED: &str = "Not connected to a server";

    /// Frame validation errors
    pub const ERR_INVALID_HEADER: &str = "Invalid frame header";
    pub const ERR_OVERSIZED_PACKET: &str = "Packet exceeds maximum size";
}

/// ClientError is the primary error type for all client operations
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{}", constants::ERR_CONNECTION_CLOSED)]
    ConnectionClosed,

    #[error("{}", constants::ERR_NOT_CONNECTED)]
    NotConnected,

    #[error("{}", constants::ERR_SERVER_TIMED_OUT)]
    Timeout,

    #[error("{}", constants::ERR_AUTHORIZATION_REQUIRED)]
    AuthorizationRequired,

    #[error("{}", constants::ERR_INVALID_HEADER)]
    InvalidHeader,

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("{}: {0} bytes", constants::ERR_OVERSIZED_PACKET)]
    OversizedPacket(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using ClientError
pub type Result<T> = std::result::Result<T, ClientError>;
