//! Request/response correlation.
//!
//! Turns the fire-and-forget duplex packet stream into awaitable
//! request/response semantics. A caller registers a request id together with
//! the set of identities expected to answer; the correlator collects matching
//! responses in arrival order and resolves the caller's future either when
//! every expected respondent has answered or when the deadline elapses, at
//! which point it manufactures a `Fail` response for every silent respondent.
//!
//! A registration therefore *always* resolves. Late, duplicate, and spurious
//! responses are dropped without touching any other pending request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::core::packet::Response;

/// A response paired with the identity that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrom {
    pub from: Uuid,
    pub response: Response,
}

/// Aggregation state for one outstanding request.
struct Pending {
    expected: Vec<Uuid>,
    /// Arrival order; synthetic entries are appended last on expiry
    received: Vec<ResponseFrom>,
    resolver: oneshot::Sender<Vec<ResponseFrom>>,
    deadline: JoinHandle<()>,
}

impl Pending {
    fn unanswered(&self) -> Vec<Uuid> {
        self.expected
            .iter()
            .filter(|id| !self.received.iter().any(|r| r.from == **id))
            .copied()
            .collect()
    }
}

/// Maps outstanding request ids to pending aggregation state.
///
/// Cheap to clone; all clones share the same pending map.
#[derive(Clone, Default)]
pub struct Correlator {
    pending: Arc<Mutex<HashMap<Uuid, Pending>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request and arm its deadline.
    ///
    /// The returned receiver always yields: with the full response set once
    /// every expected respondent has answered, or with real responses plus
    /// synthetic failures once `timeout` elapses. An empty `expected` set
    /// resolves immediately rather than waiting out the deadline.
    pub async fn register(
        &self,
        request_id: Uuid,
        expected: Vec<Uuid>,
        timeout: Duration,
    ) -> oneshot::Receiver<Vec<ResponseFrom>> {
        let (tx, rx) = oneshot::channel();

        if expected.is_empty() {
            let _ = tx.send(Vec::new());
            return rx;
        }

        // The lock is held across the spawn, so expiry cannot beat the insert
        let mut pending = self.pending.lock().await;

        let deadline = {
            let correlator = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                correlator.expire(request_id).await;
            })
        };

        pending.insert(
            request_id,
            Pending {
                expected,
                received: Vec::new(),
                resolver: tx,
                deadline,
            },
        );

        rx
    }

    /// Feed one inbound response to the matching pending request, if any.
    ///
    /// Unknown ids, unexpected senders, and duplicates are no-ops: late or
    /// repeated responses are expected under partial-failure timeout
    /// resolution.
    pub async fn deliver(&self, from: Uuid, response: Response) {
        let mut pending = self.pending.lock().await;

        let request_id = response.responding_to;
        let Some(entry) = pending.get_mut(&request_id) else {
            trace!(%request_id, %from, "response without pending request, dropping");
            return;
        };

        if !entry.expected.contains(&from) {
            debug!(%request_id, %from, "response from unexpected sender, dropping");
            return;
        }

        if entry.received.iter().any(|r| r.from == from) {
            debug!(%request_id, %from, "duplicate response, dropping");
            return;
        }

        entry.received.push(ResponseFrom { from, response });

        if entry.unanswered().is_empty() {
            // All respondents answered; cancel the deadline and resolve
            if let Some(entry) = pending.remove(&request_id) {
                entry.deadline.abort();
                let _ = entry.resolver.send(entry.received);
            }
        }
    }

    /// Deadline expiry: resolve with real responses plus synthetic failures
    /// for every respondent that never answered.
    async fn expire(&self, request_id: Uuid) {
        let mut pending = self.pending.lock().await;

        let Some(mut entry) = pending.remove(&request_id) else {
            return;
        };

        let unanswered = entry.unanswered();
        debug!(
            %request_id,
            missing = unanswered.len(),
            "request deadline elapsed, synthesizing failures"
        );

        for from in unanswered {
            entry.received.push(ResponseFrom {
                from,
                response: Response::synthetic_fail(request_id),
            });
        }

        let _ = entry.resolver.send(entry.received);
    }

    /// Resolve every pending request immediately with synthetic failures for
    /// all unanswered respondents. Called on disconnect and transport loss so
    /// no caller is left hanging on a dead connection.
    pub async fn fail_all(&self) {
        let mut pending = self.pending.lock().await;

        for (request_id, mut entry) in pending.drain() {
            entry.deadline.abort();

            for from in entry.unanswered() {
                entry.received.push(ResponseFrom {
                    from,
                    response: Response::synthetic_fail(request_id),
                });
            }

            let _ = entry.resolver.send(entry.received);
        }
    }

    /// Number of requests still awaiting responses.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{Outcome, ResponseDetails, SERVER_IDENTITY};

    fn success(responding_to: Uuid) -> Response {
        Response {
            outcome: Outcome::Success,
            responding_to,
            details: ResponseDetails::None,
        }
    }

    #[tokio::test]
    async fn resolves_once_all_respondents_answer() {
        let correlator = Correlator::new();
        let request_id = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let rx = correlator
            .register(request_id, vec![a, b], Duration::from_secs(30))
            .await;

        correlator.deliver(a, success(request_id)).await;
        correlator.deliver(b, success(request_id)).await;

        let responses = rx.await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].from, a);
        assert_eq!(responses[1].from, b);
        assert!(responses.iter().all(|r| r.response.outcome == Outcome::Success));
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn empty_expected_set_resolves_immediately() {
        let correlator = Correlator::new();
        let rx = correlator
            .register(Uuid::new_v4(), Vec::new(), Duration::from_secs(30))
            .await;

        assert_eq!(rx.await.unwrap(), Vec::new());
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_response_is_a_no_op() {
        let correlator = Correlator::new();
        let request_id = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let rx = correlator
            .register(request_id, vec![a, b], Duration::from_secs(30))
            .await;

        correlator.deliver(a, success(request_id)).await;
        correlator.deliver(a, success(request_id)).await;

        // Still waiting on b
        assert_eq!(correlator.pending_count().await, 1);

        correlator.deliver(b, success(request_id)).await;
        let responses = rx.await.unwrap();
        assert_eq!(responses.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn zero_duration_deadline_still_resolves() {
        let correlator = Correlator::new();
        let request_id = Uuid::new_v4();

        // The deadline task is runnable immediately; it must still find the
        // registration
        let rx = correlator
            .register(request_id, vec![SERVER_IDENTITY], Duration::ZERO)
            .await;

        let responses = rx.await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].response.outcome, Outcome::Fail);
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_request_id_does_not_disturb_other_pending() {
        let correlator = Correlator::new();
        let request_id = Uuid::new_v4();

        let rx = correlator
            .register(request_id, vec![SERVER_IDENTITY], Duration::from_secs(30))
            .await;

        // Response correlating to a request nobody registered
        correlator
            .deliver(SERVER_IDENTITY, success(Uuid::new_v4()))
            .await;
        assert_eq!(correlator.pending_count().await, 1);

        correlator.deliver(SERVER_IDENTITY, success(request_id)).await;
        assert_eq!(rx.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn response_from_unexpected_sender_is_dropped() {
        let correlator = Correlator::new();
        let request_id = Uuid::new_v4();
        let expected = Uuid::new_v4();

        let rx = correlator
            .register(request_id, vec![expected], Duration::from_secs(30))
            .await;

        correlator.deliver(Uuid::new_v4(), success(request_id)).await;
        assert_eq!(correlator.pending_count().await, 1);

        correlator.deliver(expected, success(request_id)).await;
        let responses = rx.await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].from, expected);
    }

    #[tokio::test]
    async fn fail_all_resolves_every_pending_request() {
        let correlator = Correlator::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let user = Uuid::new_v4();

        let rx1 = correlator
            .register(first, vec![SERVER_IDENTITY], Duration::from_secs(30))
            .await;
        let rx2 = correlator
            .register(second, vec![user], Duration::from_secs(30))
            .await;

        correlator.fail_all().await;

        let first_responses = rx1.await.unwrap();
        assert_eq!(first_responses.len(), 1);
        assert_eq!(first_responses[0].response.outcome, Outcome::Fail);
        assert_eq!(first_responses[0].response.responding_to, first);

        let second_responses = rx2.await.unwrap();
        assert_eq!(second_responses[0].from, user);
        assert_eq!(second_responses[0].response.responding_to, second);
        assert_eq!(correlator.pending_count().await, 0);
    }
}
