//! TCP transport over the envelope codec.
//!
//! One socket, two tasks: a writer draining the outbound channel into the
//! framed sink, and a reader pumping decoded envelopes into the event
//! channel. The reader owns connection-loss detection; EOF or a decode
//! error both end in a single `Closed` event.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};

use crate::core::codec::EnvelopeCodec;
use crate::error::{ClientError, Result};
use crate::transport::{TransportEvent, TransportHandle, EVENT_CAPACITY, OUTBOUND_CAPACITY};

/// Open a TCP connection and spawn its reader/writer tasks.
///
/// Returns the sending handle and the inbound event stream. The first event
/// is always `Opened`; the last is always `Closed`.
#[instrument(skip(max_payload_size))]
pub async fn connect(
    addr: &str,
    max_payload_size: usize,
) -> Result<(TransportHandle, mpsc::Receiver<TransportEvent>)> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| ClientError::Transport(format!("connect to {addr} failed: {e}")))?;

    debug!(peer = %addr, "tcp connection established");

    let framed = Framed::new(stream, EnvelopeCodec::new(max_payload_size));
    let (mut sink, mut source) = framed.split();

    let (out_tx, mut out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);

    let _ = event_tx.send(TransportEvent::Opened).await;

    // Writer: drain the outbound queue into the socket
    tokio::spawn(async move {
        while let Some(envelope) = out_rx.recv().await {
            if let Err(e) = sink.send(envelope).await {
                warn!(error = %e, "outbound send failed, stopping writer");
                break;
            }
        }
    });

    // Reader: pump decoded envelopes until EOF or decode failure
    tokio::spawn(async move {
        loop {
            match source.next().await {
                Some(Ok(envelope)) => {
                    if event_tx
                        .send(TransportEvent::Inbound(envelope))
                        .await
                        .is_err()
                    {
                        // Nobody is listening anymore
                        return;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "inbound decode failed, closing");
                    break;
                }
                None => {
                    debug!("connection closed by peer");
                    break;
                }
            }
        }

        let _ = event_tx.send(TransportEvent::Closed).await;
    });

    Ok((TransportHandle::from_channel(out_tx), event_rx))
}
