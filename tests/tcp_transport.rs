//! End-to-end over a real TCP socket: the client dials a loopback server
//! speaking the framed envelope protocol, handshakes, and exchanges a
//! correlated request.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tourney_client::core::codec::EnvelopeCodec;
use tourney_client::core::packet::{
    Envelope, Outcome, Payload, Request, Response, ResponseDetails, SERVER_IDENTITY,
};
use tourney_client::{ClientConfig, TourneyClient};
use uuid::Uuid;

/// Minimal in-process server: answers connect and join requests, ignores
/// everything else.
async fn spawn_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, EnvelopeCodec::default());

        while let Some(Ok(envelope)) = framed.next().await {
            let details = match &envelope.payload {
                Payload::Request(Request::Connect { .. }) => Some(ResponseDetails::Connect {
                    self_id: Uuid::new_v4(),
                    server_version: 1,
                    message: "welcome".into(),
                }),
                Payload::Request(Request::Join { .. }) => Some(ResponseDetails::Generic {
                    message: "joined".into(),
                }),
                _ => None,
            };

            if let Some(details) = details {
                let reply = Envelope::new(
                    SERVER_IDENTITY,
                    Payload::Response(Response {
                        outcome: Outcome::Success,
                        responding_to: envelope.id,
                        details,
                    }),
                );
                if framed.send(reply).await.is_err() {
                    break;
                }
            }
        }
    });

    addr
}

#[tokio::test]
async fn handshake_and_request_over_a_real_socket() {
    let addr = spawn_server().await;

    let config = ClientConfig::default_with_overrides(|c| {
        c.address = addr.to_string();
    });
    let client = TourneyClient::new(config);
    client.set_auth_token("integration-token").await;

    let details = client.connect().await.unwrap();
    assert!(matches!(details, ResponseDetails::Connect { .. }));
    assert!(client.is_connected());

    let response = client.join_tournament("weekly-cup").await.unwrap();
    assert_eq!(response.outcome, Outcome::Success);
    assert!(matches!(response.details, ResponseDetails::Generic { .. }));

    client.disconnect().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn connect_to_an_unreachable_server_fails_cleanly() {
    // Bind then drop to get an address nothing is listening on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::default_with_overrides(|c| {
        c.address = addr.to_string();
    });
    let client = TourneyClient::new(config);

    let result = client.connect().await;
    assert!(result.is_err());
    assert!(!client.is_connected());
}
