//! Tournament client: connection lifecycle and caller-facing operations.
//!
//! One `TourneyClient` owns one logical connection. `connect` drives the
//! handshake (Connecting → Connected → authenticated), a background event
//! loop routes every inbound envelope through the [`Dispatcher`], and a
//! heartbeat task keeps the session alive while authenticated. All request
//! operations go through the [`Correlator`], so callers get futures that
//! always resolve — with real responses, synthetic failures, or a mix.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::core::packet::{
    Command, Envelope, Outcome, Payload, Request, Response, ResponseDetails, SERVER_IDENTITY,
};
use crate::error::{ClientError, Result};
use crate::protocol::correlator::{Correlator, ResponseFrom};
use crate::protocol::dispatcher::{DispatchOutcome, Dispatcher, NoopStateHandler, StateHandler};
use crate::protocol::events::{ClientEvent, EventBus};
use crate::transport::{tcp, TransportEvent, TransportHandle};

/// Version identifier this client reports during the connect handshake.
pub const CLIENT_VERSION: u32 = 100;

/// Where the connection currently stands.
///
/// `authenticated` flips to true only after the server accepts the connect
/// handshake; a physically open but unauthenticated connection is not usable
/// for requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { authenticated: bool },
}

/// Internals of one live connection.
struct Connection {
    transport: TransportHandle,
    event_loop: JoinHandle<()>,
    heartbeat: Option<JoinHandle<()>>,
}

/// Client for the tournament coordination protocol.
pub struct TourneyClient {
    config: ClientConfig,
    correlator: Correlator,
    events: EventBus,
    state_handler: Arc<dyn StateHandler>,
    /// Own identity; provisional until the connect response assigns one
    identity: Arc<Mutex<Uuid>>,
    token: Arc<Mutex<String>>,
    /// Set when the server demands re-authorization mid-session
    challenge: Arc<Mutex<Option<String>>>,
    conn: Mutex<Option<Connection>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
}

impl TourneyClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_state_handler(config, Arc::new(NoopStateHandler))
    }

    /// Construct with an external state reducer that will see every inbound
    /// envelope.
    pub fn with_state_handler(config: ClientConfig, state_handler: Arc<dyn StateHandler>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            correlator: Correlator::new(),
            events: EventBus::new(),
            state_handler,
            identity: Arc::new(Mutex::new(Uuid::new_v4())),
            token: Arc::new(Mutex::new(String::new())),
            challenge: Arc::new(Mutex::new(None)),
            conn: Mutex::new(None),
            state_tx: Arc::new(state_tx),
        }
    }

    // --- Observation --- //

    /// Subscribe to lifecycle and domain events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Watch connection state transitions.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            *self.state_tx.borrow(),
            ConnectionState::Connected { .. }
        )
    }

    /// Store the auth token stamped onto every outgoing envelope.
    pub async fn set_auth_token(&self, token: impl Into<String>) {
        *self.token.lock().await = token.into();
    }

    /// Requests still awaiting responses.
    pub async fn pending_requests(&self) -> usize {
        self.correlator.pending_count().await
    }

    // --- Lifecycle --- //

    /// Connect to the configured server address and run the handshake.
    ///
    /// Resolves with the server's connect details on success. Fails with
    /// `Timeout` if the server never answers the handshake within the
    /// connect deadline; the socket stays open in that case but the session
    /// is unusable until a fresh handshake succeeds.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<ResponseDetails> {
        // Any previous connection goes away before the new attempt is
        // announced, so observers never see Disconnected mid-attempt
        self.teardown(false).await;
        self.state_tx.send_replace(ConnectionState::Connecting);
        self.events.emit(ClientEvent::Connecting);

        let address = self.config.address.clone();
        match tcp::connect(&address, self.config.max_payload_size).await {
            Ok((transport, events)) => self.establish(transport, events).await,
            Err(e) => {
                error!(error = %e, "failed to connect to server");
                self.state_tx.send_replace(ConnectionState::Disconnected);
                self.events.emit(ClientEvent::FailedToConnect);
                Err(e)
            }
        }
    }

    /// Connect over an already-opened transport. Used by tests and
    /// in-process servers; `connect` delegates here after dialing TCP.
    pub async fn connect_over(
        &self,
        transport: TransportHandle,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Result<ResponseDetails> {
        self.teardown(false).await;
        self.state_tx.send_replace(ConnectionState::Connecting);
        self.events.emit(ClientEvent::Connecting);
        self.establish(transport, events).await
    }

    async fn establish(
        &self,
        transport: TransportHandle,
        mut events: mpsc::Receiver<TransportEvent>,
    ) -> Result<ResponseDetails> {
        *self.challenge.lock().await = None;

        self.state_tx
            .send_replace(ConnectionState::Connected {
                authenticated: false,
            });

        let event_loop = {
            let dispatcher = Dispatcher::new(
                self.correlator.clone(),
                self.events.clone(),
                self.state_handler.clone(),
            );
            let correlator = self.correlator.clone();
            let bus = self.events.clone();
            let state_tx = self.state_tx.clone();
            let challenge = self.challenge.clone();

            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        TransportEvent::Opened => {
                            debug!("transport opened");
                        }
                        TransportEvent::Inbound(envelope) => {
                            if let DispatchOutcome::AuthorizationChallenge(auth_url) =
                                dispatcher.dispatch(envelope).await
                            {
                                // Fatal for the session: no silent retry, and
                                // nothing pending can succeed anymore
                                *challenge.lock().await = Some(auth_url);
                                correlator.fail_all().await;
                            }
                        }
                        TransportEvent::Closed => {
                            info!("disconnected from server");
                            correlator.fail_all().await;
                            state_tx.send_replace(ConnectionState::Disconnected);
                            bus.emit(ClientEvent::Disconnected);
                            break;
                        }
                    }
                }
            })
        };

        *self.conn.lock().await = Some(Connection {
            transport: transport.clone(),
            event_loop,
            heartbeat: None,
        });

        // Handshake: a correlated Connect request against the server identity
        let request = Request::Connect {
            client_version: CLIENT_VERSION,
            ui_version: self.config.ui_version.unwrap_or(0),
        };
        let responses = self
            .send_request(request, None, Some(self.config.connect_timeout))
            .await?;

        if let Some(auth_url) = self.challenge.lock().await.take() {
            warn!(%auth_url, "server requested authorization during handshake");
            self.events.emit(ClientEvent::FailedToConnect);
            return Err(ClientError::AuthorizationRequired);
        }

        let Some(first) = responses.into_iter().next() else {
            // Defensive: the correlator always yields at least the sentinel
            self.events.emit(ClientEvent::FailedToConnect);
            return Err(ClientError::Timeout);
        };

        match (first.response.outcome, first.response.details) {
            (Outcome::Success, details) => {
                if let ResponseDetails::Connect { self_id, .. } = &details {
                    *self.identity.lock().await = *self_id;
                }

                info!("successfully connected to server");
                self.state_tx.send_replace(ConnectionState::Connected {
                    authenticated: true,
                });

                let heartbeat = self.start_heartbeat(transport).await;
                if let Some(conn) = self.conn.lock().await.as_mut() {
                    conn.heartbeat = Some(heartbeat);
                }

                self.events.emit(ClientEvent::Connected(details.clone()));
                Ok(details)
            }
            (Outcome::Fail, ResponseDetails::None) => {
                // Synthesized by the deadline: the server never answered
                warn!("server timed out during connect handshake");
                self.events.emit(ClientEvent::FailedToConnect);
                Err(ClientError::Timeout)
            }
            (Outcome::Fail, details) => {
                error!(?details, "server rejected connect handshake");
                self.events.emit(ClientEvent::FailedToConnect);
                Err(ClientError::Transport(format!(
                    "connect rejected: {details:?}"
                )))
            }
        }
    }

    /// Fire-and-forget keepalive while the session stays authenticated.
    /// Send failures are a transport concern and are swallowed here.
    async fn start_heartbeat(&self, transport: TransportHandle) -> JoinHandle<()> {
        let period = self.config.heartbeat_interval;
        let identity = self.identity.clone();
        let token = self.token.clone();
        let mut state_rx = self.state_tx.subscribe();

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);

            loop {
                ticker.tick().await;

                let authenticated = matches!(
                    *state_rx.borrow_and_update(),
                    ConnectionState::Connected {
                        authenticated: true
                    }
                );
                if !authenticated {
                    break;
                }

                let mut envelope = Envelope::new(*identity.lock().await, Payload::Heartbeat);
                envelope.token = token.lock().await.clone();

                if transport.send(envelope).await.is_err() {
                    break;
                }
            }
        })
    }

    /// Tear down the connection: stop the heartbeat, close the transport,
    /// resolve every pending request with synthetic failures, and emit a
    /// disconnect notification. Safe to call when already disconnected.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        if self.teardown(true).await {
            info!("disconnecting from server");
        }
    }

    /// Returns whether there was a connection to tear down.
    async fn teardown(&self, announce: bool) -> bool {
        let Some(conn) = self.conn.lock().await.take() else {
            return false;
        };

        if let Some(heartbeat) = conn.heartbeat {
            heartbeat.abort();
        }
        conn.event_loop.abort();
        drop(conn.transport);

        self.correlator.fail_all().await;
        self.state_tx.send_replace(ConnectionState::Disconnected);
        if announce {
            self.events.emit(ClientEvent::Disconnected);
        }

        true
    }

    // --- Packet operations --- //

    /// Send a request and await responses from every expected respondent.
    ///
    /// Without explicit `targets` the expected respondents are the request's
    /// own forward list, or the server itself for requests that carry none.
    /// The returned list is in arrival order, padded with synthetic `Fail`
    /// entries for respondents that missed the deadline — it is never empty
    /// unless the respondent set was an empty list.
    pub async fn send_request(
        &self,
        request: Request,
        targets: Option<Vec<Uuid>>,
        timeout: Option<Duration>,
    ) -> Result<Vec<ResponseFrom>> {
        let transport = self.transport().await?;

        let expected = targets
            .or_else(|| request.forward_to().map(<[Uuid]>::to_vec))
            .unwrap_or_else(|| vec![SERVER_IDENTITY]);
        let timeout = timeout.unwrap_or(self.config.request_timeout);

        let envelope = self.stamp(Payload::Request(request)).await;
        let pending = self
            .correlator
            .register(envelope.id, expected, timeout)
            .await;

        transport.send(envelope).await?;

        pending.await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Fire-and-forget command; no response is expected or awaited.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        let transport = self.transport().await?;
        let envelope = self.stamp(Payload::Command(command)).await;
        transport.send(envelope).await
    }

    /// Fire-and-forget reply to a server- or peer-initiated request.
    pub async fn send_response(&self, response: Response) -> Result<()> {
        let transport = self.transport().await?;
        let envelope = self.stamp(Payload::Response(response)).await;
        transport.send(envelope).await
    }

    async fn transport(&self) -> Result<TransportHandle> {
        self.conn
            .lock()
            .await
            .as_ref()
            .map(|c| c.transport.clone())
            .ok_or(ClientError::NotConnected)
    }

    /// Wrap a payload in a fresh envelope carrying our identity and token.
    async fn stamp(&self, payload: Payload) -> Envelope {
        let mut envelope = Envelope::new(*self.identity.lock().await, payload);
        envelope.token = self.token.lock().await.clone();
        envelope
    }

    // --- Convenience requests --- //

    /// Join a tournament; answered by the server alone.
    pub async fn join_tournament(&self, tournament_id: impl Into<String>) -> Result<Response> {
        self.server_request(Request::Join {
            tournament_id: tournament_id.into(),
            password: String::new(),
        })
        .await
    }

    /// Ask a set of users to load content, with an optional per-call
    /// deadline for slow downloads.
    pub async fn load_content(
        &self,
        tournament_id: impl Into<String>,
        content_id: impl Into<String>,
        user_ids: Vec<Uuid>,
        timeout: Option<Duration>,
    ) -> Result<Vec<ResponseFrom>> {
        self.send_request(
            Request::LoadContent {
                tournament_id: tournament_id.into(),
                forward_to: user_ids,
                content_id: content_id.into(),
            },
            None,
            timeout,
        )
        .await
    }

    /// Show a prompt on the target users' screens. When the prompt carries
    /// its own countdown, that countdown doubles as the response deadline;
    /// a zero timer means no countdown and the default deadline applies.
    #[allow(clippy::too_many_arguments)]
    pub async fn show_prompt(
        &self,
        tournament_id: impl Into<String>,
        user_ids: Vec<Uuid>,
        title: impl Into<String>,
        body: impl Into<String>,
        can_close: bool,
        options: Vec<String>,
        timer_secs: Option<u32>,
    ) -> Result<Vec<ResponseFrom>> {
        let timeout = timer_secs
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(u64::from(secs)));
        self.send_request(
            Request::ShowPrompt {
                tournament_id: tournament_id.into(),
                forward_to: user_ids,
                prompt_id: Uuid::new_v4(),
                title: title.into(),
                body: body.into(),
                can_close,
                timeout_secs: timer_secs.unwrap_or(0),
                options,
            },
            None,
            timeout,
        )
        .await
    }

    /// Fetch a qualifier leaderboard.
    pub async fn qualifier_scores(
        &self,
        tournament_id: impl Into<String>,
        qualifier_id: impl Into<String>,
        map_id: impl Into<String>,
    ) -> Result<Response> {
        self.server_request(Request::QualifierScores {
            tournament_id: tournament_id.into(),
            qualifier_id: qualifier_id.into(),
            map_id: map_id.into(),
        })
        .await
    }

    pub async fn update_user(
        &self,
        tournament_id: impl Into<String>,
        user_id: Uuid,
        display_name: impl Into<String>,
    ) -> Result<Response> {
        self.server_request(Request::UpdateUser {
            tournament_id: tournament_id.into(),
            user_id,
            display_name: display_name.into(),
        })
        .await
    }

    pub async fn create_match(
        &self,
        tournament_id: impl Into<String>,
        match_id: impl Into<String>,
        player_ids: Vec<Uuid>,
    ) -> Result<Response> {
        self.server_request(Request::CreateMatch {
            tournament_id: tournament_id.into(),
            match_id: match_id.into(),
            player_ids,
        })
        .await
    }

    pub async fn delete_match(
        &self,
        tournament_id: impl Into<String>,
        match_id: impl Into<String>,
    ) -> Result<Response> {
        self.server_request(Request::DeleteMatch {
            tournament_id: tournament_id.into(),
            match_id: match_id.into(),
        })
        .await
    }

    /// Server-only request: returns the server's response, which is a
    /// synthetic `Fail` when the deadline fired first.
    async fn server_request(&self, request: Request) -> Result<Response> {
        let responses = self.send_request(request, None, None).await?;
        responses
            .into_iter()
            .next()
            .map(|r| r.response)
            .ok_or(ClientError::Timeout)
    }

    // --- Convenience commands --- //

    /// Tell the target users to start playing the given content.
    pub async fn play_content(
        &self,
        tournament_id: impl Into<String>,
        content_id: impl Into<String>,
        user_ids: Vec<Uuid>,
    ) -> Result<()> {
        self.send_command(Command::PlayContent {
            tournament_id: tournament_id.into(),
            forward_to: user_ids,
            content_id: content_id.into(),
        })
        .await
    }

    /// Send the target users back to their menus.
    pub async fn return_to_menu(
        &self,
        tournament_id: impl Into<String>,
        user_ids: Vec<Uuid>,
    ) -> Result<()> {
        self.send_command(Command::ReturnToMenu {
            tournament_id: tournament_id.into(),
            forward_to: user_ids,
        })
        .await
    }
}

impl Default for TourneyClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
