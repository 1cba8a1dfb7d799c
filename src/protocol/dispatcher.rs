//! Inbound packet routing.
//!
//! Every decoded envelope passes through here exactly once. The external
//! state reducer sees the envelope first, unconditionally, so mirrored
//! tournament state stays current whether or not anything downstream cares
//! about this particular packet. After that the dispatcher branches on the
//! payload variant: responses feed the correlator, pushes and
//! server-initiated requests become client events, and an authorization
//! challenge is returned as a typed outcome instead of being thrown across
//! a callback boundary.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::core::packet::{Command, Envelope, Payload, Push, Request};
use crate::protocol::correlator::Correlator;
use crate::protocol::events::{ClientEvent, EventBus};

/// External collaborator that mirrors domain state from the packet stream.
///
/// The engine only feeds it; it never reads the mirrored state back.
pub trait StateHandler: Send + Sync {
    fn handle_envelope(&self, envelope: &Envelope);
}

/// Default reducer that keeps no state.
pub struct NoopStateHandler;

impl StateHandler for NoopStateHandler {
    fn handle_envelope(&self, _envelope: &Envelope) {}
}

/// What the event loop should do after one envelope has been routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing further; keep processing the stream
    Routine,
    /// Server demanded re-authorization; fatal for the current session
    AuthorizationChallenge(String),
}

/// Routes each inbound envelope to the correlator, the event bus, or the
/// state reducer based on its payload kind.
pub struct Dispatcher {
    correlator: Correlator,
    events: EventBus,
    state: Arc<dyn StateHandler>,
}

impl Dispatcher {
    pub fn new(correlator: Correlator, events: EventBus, state: Arc<dyn StateHandler>) -> Self {
        Self {
            correlator,
            events,
            state,
        }
    }

    pub async fn dispatch(&self, envelope: Envelope) -> DispatchOutcome {
        // The reducer sees everything, independent of the branching below
        self.state.handle_envelope(&envelope);

        match envelope.payload {
            Payload::Command(command) => self.dispatch_command(command),
            Payload::Request(request) => {
                self.dispatch_request(envelope.id, envelope.from, request);
                DispatchOutcome::Routine
            }
            Payload::Response(response) => {
                self.events.emit(ClientEvent::ResponseObserved {
                    from: envelope.from,
                    response: response.clone(),
                });
                self.correlator.deliver(envelope.from, response).await;
                DispatchOutcome::Routine
            }
            Payload::Push(push) => {
                self.dispatch_push(push);
                DispatchOutcome::Routine
            }
            Payload::Heartbeat => {
                trace!(from = %envelope.from, "heartbeat received");
                DispatchOutcome::Routine
            }
        }
    }

    fn dispatch_command(&self, command: Command) -> DispatchOutcome {
        match command {
            Command::RequestAuthorization { auth_url } => {
                debug!("server requested re-authorization");
                self.events.emit(ClientEvent::AuthorizationRequested {
                    auth_url: auth_url.clone(),
                });
                DispatchOutcome::AuthorizationChallenge(auth_url)
            }
            other => {
                trace!(?other, "ignoring non-challenge command");
                DispatchOutcome::Routine
            }
        }
    }

    fn dispatch_request(&self, packet_id: uuid::Uuid, from: uuid::Uuid, request: Request) {
        match &request {
            Request::LoadContent { .. } => {
                // Tag with the originating envelope id so the consumer can
                // correlate its eventual response back to the requester
                self.events.emit(ClientEvent::LoadContentRequested {
                    packet_id,
                    from,
                    request,
                });
            }
            other => {
                trace!(?other, "ignoring server-initiated request variant");
            }
        }
    }

    fn dispatch_push(&self, push: Push) {
        match push {
            Push::ScoreUpdate(score) => self.events.emit(ClientEvent::ScoreUpdate(score)),
            Push::MatchFinished(finished) => {
                self.events.emit(ClientEvent::MatchFinished(finished));
            }
            Push::QualifierScoreSubmitted(score) => {
                self.events.emit(ClientEvent::QualifierScoreSubmitted(score));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{
        Outcome, Response, ResponseDetails, ScoreUpdate, SERVER_IDENTITY,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct CountingState(AtomicUsize);

    impl StateHandler for CountingState {
        fn handle_envelope(&self, _envelope: &Envelope) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn dispatcher_with(
        correlator: Correlator,
        events: EventBus,
        state: Arc<CountingState>,
    ) -> Dispatcher {
        Dispatcher::new(correlator, events, state)
    }

    #[tokio::test]
    async fn every_envelope_reaches_the_state_handler() {
        let state = Arc::new(CountingState(AtomicUsize::new(0)));
        let dispatcher =
            dispatcher_with(Correlator::new(), EventBus::new(), state.clone());

        dispatcher
            .dispatch(Envelope::new(SERVER_IDENTITY, Payload::Heartbeat))
            .await;
        dispatcher
            .dispatch(Envelope::new(
                SERVER_IDENTITY,
                Payload::Push(Push::ScoreUpdate(ScoreUpdate {
                    tournament_id: "t".into(),
                    match_id: "m".into(),
                    user_id: Uuid::new_v4(),
                    score: 100,
                    combo: 4,
                    accuracy: 0.97,
                })),
            ))
            .await;

        assert_eq!(state.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn authorization_challenge_is_a_typed_outcome() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let dispatcher = Dispatcher::new(
            Correlator::new(),
            events,
            Arc::new(NoopStateHandler),
        );

        let outcome = dispatcher
            .dispatch(Envelope::new(
                SERVER_IDENTITY,
                Payload::Command(Command::RequestAuthorization {
                    auth_url: "https://auth.example".into(),
                }),
            ))
            .await;

        assert_eq!(
            outcome,
            DispatchOutcome::AuthorizationChallenge("https://auth.example".into())
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            ClientEvent::AuthorizationRequested { .. }
        ));
    }

    #[tokio::test]
    async fn responses_are_observed_and_correlated() {
        let correlator = Correlator::new();
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let dispatcher = Dispatcher::new(
            correlator.clone(),
            events,
            Arc::new(NoopStateHandler),
        );

        let request_id = Uuid::new_v4();
        let pending = correlator
            .register(request_id, vec![SERVER_IDENTITY], Duration::from_secs(30))
            .await;

        let mut envelope = Envelope::new(
            SERVER_IDENTITY,
            Payload::Response(Response {
                outcome: Outcome::Success,
                responding_to: request_id,
                details: ResponseDetails::None,
            }),
        );
        envelope.from = SERVER_IDENTITY;

        let outcome = dispatcher.dispatch(envelope).await;
        assert_eq!(outcome, DispatchOutcome::Routine);

        // Observed on the event bus regardless of correlation
        assert!(matches!(
            rx.recv().await.unwrap(),
            ClientEvent::ResponseObserved { .. }
        ));

        let responses = pending.await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].response.outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn load_content_request_is_tagged_with_origin() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let dispatcher = Dispatcher::new(
            Correlator::new(),
            events,
            Arc::new(NoopStateHandler),
        );

        let sender = Uuid::new_v4();
        let envelope = Envelope::new(
            sender,
            Payload::Request(Request::LoadContent {
                tournament_id: "t".into(),
                forward_to: vec![],
                content_id: "content-1".into(),
            }),
        );
        let envelope_id = envelope.id;

        dispatcher.dispatch(envelope).await;

        match rx.recv().await.unwrap() {
            ClientEvent::LoadContentRequested {
                packet_id, from, ..
            } => {
                assert_eq!(packet_id, envelope_id);
                assert_eq!(from, sender);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
