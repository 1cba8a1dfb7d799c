//! Client event stream.
//!
//! Connection lifecycle changes, domain pushes, and server-initiated
//! requests are published on a broadcast channel owned by the client
//! instance: created at construction, dropped with the client. Subscribers
//! that fall behind lose the oldest events (broadcast lag) rather than
//! blocking the dispatch path.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::packet::{
    MatchFinished, QualifierScore, Request, Response, ResponseDetails, ScoreUpdate,
};

/// Buffered events per subscriber before lag kicks in.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything a client observer can be notified about.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Connection attempt started
    Connecting,
    /// Connect handshake succeeded; carries the server's connect details
    Connected(ResponseDetails),
    /// Transport could not be established or the handshake was rejected
    FailedToConnect,
    /// Connection torn down (locally or by the server)
    Disconnected,

    /// Server demands fresh credentials; the session is unusable until
    /// the caller reconnects with a new token
    AuthorizationRequested { auth_url: String },

    /// A remote peer asked this client to load content; answer by sending a
    /// response correlated to `packet_id`
    LoadContentRequested {
        packet_id: Uuid,
        from: Uuid,
        request: Request,
    },

    /// Every inbound response, observed before correlation
    ResponseObserved { from: Uuid, response: Response },

    ScoreUpdate(ScoreUpdate),
    MatchFinished(MatchFinished),
    QualifierScoreSubmitted(QualifierScore),
}

/// Broadcast-based observer registry owned by one client instance.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Register a new observer. Each receiver sees every event emitted after
    /// subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all current subscribers. A send with no subscribers
    /// is not an error; events are advisory.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_subscribers_see_events() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(ClientEvent::Connecting);

        assert!(matches!(first.recv().await.unwrap(), ClientEvent::Connecting));
        assert!(matches!(second.recv().await.unwrap(), ClientEvent::Connecting));
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(ClientEvent::Disconnected);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.emit(ClientEvent::Connecting);

        let mut rx = bus.subscribe();
        bus.emit(ClientEvent::Disconnected);

        assert!(matches!(rx.recv().await.unwrap(), ClientEvent::Disconnected));
    }
}
