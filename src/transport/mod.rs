//! # Transport Layer
//!
//! A transport is a pair of channels around a single duplex connection:
//! an outbound sender the client pushes envelopes into, and an inbound
//! event stream carrying decoded envelopes plus open/close lifecycle
//! notifications. The socket itself lives inside reader/writer tasks, so
//! the client never touches I/O directly — which also makes the engine
//! trivially testable against a loopback channel pair.

pub mod tcp;

use tokio::sync::mpsc;

use crate::core::packet::Envelope;
use crate::error::{ClientError, Result};

/// Queue depth for outbound envelopes before senders are backpressured.
pub const OUTBOUND_CAPACITY: usize = 64;

/// Queue depth for inbound transport events.
pub const EVENT_CAPACITY: usize = 256;

/// Lifecycle and data events surfaced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is open and frames can flow
    Opened,
    /// One fully decoded inbound envelope
    Inbound(Envelope),
    /// The connection is gone; no further events will arrive
    Closed,
}

/// Sending half of a transport. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    outbound: mpsc::Sender<Envelope>,
}

impl TransportHandle {
    /// Wrap an existing outbound channel. Used by the TCP transport and by
    /// tests that wire up a loopback pair.
    pub fn from_channel(outbound: mpsc::Sender<Envelope>) -> Self {
        Self { outbound }
    }

    /// Queue an envelope for the writer task.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| ClientError::ConnectionClosed)
    }
}

/// Build a loopback transport: the handle plus both channel ends, for tests
/// and in-process servers.
pub fn channel_pair() -> (
    TransportHandle,
    mpsc::Receiver<Envelope>,
    mpsc::Sender<TransportEvent>,
    mpsc::Receiver<TransportEvent>,
) {
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
    (
        TransportHandle::from_channel(out_tx),
        out_rx,
        event_tx,
        event_rx,
    )
}
