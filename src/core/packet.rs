//! Packet envelope and payload variants.
//!
//! Every packet on the wire is an [`Envelope`]: a globally unique id, the
//! sender's identity, the session auth token, and exactly one payload
//! variant. The envelope id exists purely for correlation — a `Response`
//! names the id of the `Request` envelope it answers — and is never reused.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known identity meaning "the server itself".
///
/// A request with no explicit forward targets expects a single response
/// from this identity.
pub const SERVER_IDENTITY: Uuid = Uuid::nil();

/// Outer packet structure carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Globally unique per envelope, generated by the sender
    pub id: Uuid,
    /// Identity of the sender
    pub from: Uuid,
    /// Session auth token; stamped by the client just before send
    pub token: String,
    /// The single payload variant
    pub payload: Payload,
}

impl Envelope {
    /// Build an envelope with a fresh id.
    pub fn new(from: Uuid, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            token: String::new(),
            payload,
        }
    }
}

/// Payload variants an envelope can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Request(Request),
    Response(Response),
    Command(Command),
    Push(Push),
    /// Fire-and-forget keepalive; never correlated, never answered
    Heartbeat,
}

/// A typed operation sent to the server, optionally fanned out to a set of
/// remote recipients via `forward_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Connect handshake; first request on every fresh connection
    Connect {
        client_version: u32,
        ui_version: u32,
    },
    Join {
        tournament_id: String,
        password: String,
    },
    LoadContent {
        tournament_id: String,
        forward_to: Vec<Uuid>,
        content_id: String,
    },
    ShowPrompt {
        tournament_id: String,
        forward_to: Vec<Uuid>,
        prompt_id: Uuid,
        title: String,
        body: String,
        can_close: bool,
        /// Prompt countdown in seconds; 0 means no timer
        timeout_secs: u32,
        options: Vec<String>,
    },
    QualifierScores {
        tournament_id: String,
        qualifier_id: String,
        map_id: String,
    },
    UpdateUser {
        tournament_id: String,
        user_id: Uuid,
        display_name: String,
    },
    CreateMatch {
        tournament_id: String,
        match_id: String,
        player_ids: Vec<Uuid>,
    },
    DeleteMatch {
        tournament_id: String,
        match_id: String,
    },
}

impl Request {
    /// Explicit recipient list, when this request fans out to remote users.
    pub fn forward_to(&self) -> Option<&[Uuid]> {
        match self {
            Request::LoadContent { forward_to, .. } | Request::ShowPrompt { forward_to, .. } => {
                Some(forward_to)
            }
            _ => None,
        }
    }
}

/// Whether a respondent accepted or rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Fail,
}

/// Answer to a previously sent request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub outcome: Outcome,
    /// Envelope id of the request this answers
    pub responding_to: Uuid,
    pub details: ResponseDetails,
}

impl Response {
    /// Failure manufactured by the correlator for a respondent that never
    /// replied before the deadline. Indistinguishable from a genuine empty
    /// Fail response by design; callers must treat payload content as
    /// unreliable once a deadline has fired for that respondent.
    pub fn synthetic_fail(responding_to: Uuid) -> Self {
        Self {
            outcome: Outcome::Fail,
            responding_to,
            details: ResponseDetails::None,
        }
    }
}

/// Typed response detail, or `None` when the respondent sent nothing extra.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseDetails {
    None,
    Connect {
        self_id: Uuid,
        server_version: u32,
        message: String,
    },
    Join {
        tournament_id: String,
        message: String,
    },
    LeaderboardEntries(Vec<LeaderboardEntry>),
    Prompt {
        prompt_id: Uuid,
        chosen_option: String,
    },
    Generic {
        message: String,
    },
}

/// One-way instruction; no response is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Server demands fresh credentials; fatal to the current session
    RequestAuthorization { auth_url: String },
    PlayContent {
        tournament_id: String,
        forward_to: Vec<Uuid>,
        content_id: String,
    },
    ReturnToMenu {
        tournament_id: String,
        forward_to: Vec<Uuid>,
    },
    StreamSyncColor {
        tournament_id: String,
        forward_to: Vec<Uuid>,
        color: String,
    },
}

/// Unsolicited, server-originated notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Push {
    ScoreUpdate(ScoreUpdate),
    MatchFinished(MatchFinished),
    QualifierScoreSubmitted(QualifierScore),
}

/// Live score snapshot for a player mid-match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub tournament_id: String,
    pub match_id: String,
    pub user_id: Uuid,
    pub score: i32,
    pub combo: i32,
    pub accuracy: f32,
}

/// How a play-through ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionType {
    Passed,
    Failed,
    Quit,
}

/// Final result for a player once their content finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFinished {
    pub tournament_id: String,
    pub match_id: String,
    pub user_id: Uuid,
    pub content_id: String,
    pub completion: CompletionType,
    pub score: i32,
    pub misses: i32,
}

/// Score submitted against a qualifier leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifierScore {
    pub tournament_id: String,
    pub qualifier_id: String,
    pub map_id: String,
    pub user_id: Uuid,
    pub score: i32,
}

/// One row of a qualifier leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub username: String,
    pub score: i32,
    pub rank: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_ids_are_unique() {
        let a = Envelope::new(Uuid::new_v4(), Payload::Heartbeat);
        let b = Envelope::new(a.from, Payload::Heartbeat);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn server_identity_is_all_zero() {
        assert_eq!(
            SERVER_IDENTITY.to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn forward_to_only_on_fan_out_requests() {
        let targets = vec![Uuid::new_v4(), Uuid::new_v4()];
        let load = Request::LoadContent {
            tournament_id: "t".into(),
            forward_to: targets.clone(),
            content_id: "c".into(),
        };
        assert_eq!(load.forward_to(), Some(targets.as_slice()));

        let join = Request::Join {
            tournament_id: "t".into(),
            password: String::new(),
        };
        assert!(join.forward_to().is_none());
    }

    #[test]
    fn synthetic_fail_has_empty_details() {
        let id = Uuid::new_v4();
        let fail = Response::synthetic_fail(id);
        assert_eq!(fail.outcome, Outcome::Fail);
        assert_eq!(fail.responding_to, id);
        assert_eq!(fail.details, ResponseDetails::None);
    }
}
