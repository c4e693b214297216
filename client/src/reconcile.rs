//! Resolving ambiguous writes by reading the collection they would land in.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use brightpath_core::matching::DEFAULT_EPSILON;
use brightpath_core::outcome::UNCONFIRMED_MESSAGE;
use brightpath_core::{Ambiguity, Failure, MatchPredicate, MatchResult, Outcome, TimeWindow};
use reqwest::Method;
use serde_json::Value;

use crate::descriptor::RequestDescriptor;
use crate::executor::Executor;
use crate::transport::Transport;

const DEFAULT_BACKOFF_MS: u64 = 1500;
const DEFAULT_LOOKAHEAD_SECS: i64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileConfig {
    /// Pause before the read, giving the server time to commit.
    pub backoff: Duration,
    /// How long after submission a matching record may be stamped.
    pub lookahead: chrono::Duration,
    /// How long before submission (server clock skew).
    pub lookbehind: chrono::Duration,
    /// Tolerance for numeric comparison fields.
    pub epsilon: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            lookahead: chrono::Duration::seconds(DEFAULT_LOOKAHEAD_SECS),
            lookbehind: chrono::Duration::zero(),
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// Final answer for a write after any reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Success(Value),
    /// The write was ambiguous and the record was found afterwards.
    Confirmed(Value),
    Failure(Failure),
    /// Still unknown; the user has to check for themselves.
    Unconfirmed(Ambiguity),
}

impl Resolution {
    /// `Confirmed` reads exactly like `Success` to the user.
    pub fn is_success(&self) -> bool {
        matches!(self, Resolution::Success(_) | Resolution::Confirmed(_))
    }

    pub fn user_message(&self) -> Option<&str> {
        match self {
            Resolution::Success(_) | Resolution::Confirmed(_) => None,
            Resolution::Failure(failure) => Some(&failure.message),
            Resolution::Unconfirmed(_) => Some(UNCONFIRMED_MESSAGE),
        }
    }
}

pub struct Reconciler<T: Transport> {
    executor: Arc<Executor<T>>,
    config: ReconcileConfig,
}

impl<T: Transport> Reconciler<T> {
    pub fn new(executor: Arc<Executor<T>>, config: ReconcileConfig) -> Self {
        Self { executor, config }
    }

    /// The predicate a record has to satisfy to count as the lost write.
    pub fn predicate(&self, ambiguity: &Ambiguity) -> MatchPredicate {
        let window = TimeWindow::around(
            ambiguity.submitted_at,
            self.config.lookbehind,
            self.config.lookahead,
        );
        MatchPredicate::new(&ambiguity.hint, window, self.config.epsilon)
    }

    /// Back off, read `read` once, and look for the write in the result.
    ///
    /// Never fails: any trouble on the read side is `Unconfirmed`.
    pub async fn reconcile(&self, ambiguity: &Ambiguity, read: &RequestDescriptor) -> MatchResult {
        self.reconcile_until(ambiguity, read, std::future::pending::<()>())
            .await
    }

    /// Like [`Self::reconcile`], abandoned as `Unconfirmed` once `cancel` resolves.
    pub async fn reconcile_until(
        &self,
        ambiguity: &Ambiguity,
        read: &RequestDescriptor,
        cancel: impl Future<Output = ()>,
    ) -> MatchResult {
        if read.method() != Method::GET {
            tracing::error!(
                method = %read.method(),
                path = read.path(),
                "Reconciliation read must be a GET"
            );
            return MatchResult::Unconfirmed;
        }

        tokio::select! {
            biased;
            _ = cancel => {
                tracing::info!(resource = %ambiguity.hint.resource, "Reconciliation cancelled");
                MatchResult::Unconfirmed
            }
            result = self.check(ambiguity, read) => result,
        }
    }

    async fn check(&self, ambiguity: &Ambiguity, read: &RequestDescriptor) -> MatchResult {
        tokio::time::sleep(self.config.backoff).await;

        let collection = match self.executor.execute(read).await {
            Outcome::Success { data } => data,
            Outcome::Failure(failure) => {
                tracing::warn!(
                    resource = %ambiguity.hint.resource,
                    kind = %failure.kind,
                    "Reconciliation read failed"
                );
                return MatchResult::Unconfirmed;
            }
            Outcome::Ambiguous(_) => return MatchResult::Unconfirmed,
        };

        let result = self.predicate(ambiguity).first_match(&collection);
        tracing::info!(
            resource = %ambiguity.hint.resource,
            confirmed = result.is_confirmed(),
            "Reconciliation finished"
        );
        result
    }

    /// Issue `write`; if its outcome is ambiguous, reconcile against `read`.
    pub async fn execute_reconciled(
        &self,
        write: &RequestDescriptor,
        read: &RequestDescriptor,
    ) -> Resolution {
        match self.executor.execute(write).await {
            Outcome::Success { data } => Resolution::Success(data),
            Outcome::Failure(failure) => Resolution::Failure(failure),
            Outcome::Ambiguous(ambiguity) => match self.reconcile(&ambiguity, read).await {
                MatchResult::Confirmed { record } => Resolution::Confirmed(record),
                MatchResult::Unconfirmed => Resolution::Unconfirmed(ambiguity),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use brightpath_core::{ErrorKind, MutationHint, Session};
    use chrono::{DateTime, Utc};
    use serde_json::json;

    use super::*;
    use crate::config::ClientConfig;
    use crate::executor::LogRedirect;
    use crate::store::MemorySessionStore;
    use crate::testing::{Reply, ScriptedTransport};

    fn reconciler(transport: ScriptedTransport) -> Reconciler<ScriptedTransport> {
        let config = ClientConfig::default();
        let executor = Executor::new(
            transport,
            &config,
            Arc::new(MemorySessionStore::with_session(Session::new("tok"))),
            Arc::new(LogRedirect),
        );
        Reconciler::new(Arc::new(executor), config.reconcile)
    }

    fn submitted_at() -> DateTime<Utc> {
        "2024-05-01T03:00:00Z".parse().unwrap()
    }

    fn ambiguity() -> Ambiguity {
        Ambiguity {
            raw_body: None,
            hint: MutationHint::new("withdrawal")
                .number("amount", 500000.0)
                .text("bank", "VCB"),
            submitted_at: submitted_at(),
        }
    }

    fn history() -> RequestDescriptor {
        RequestDescriptor::get("/api/withdrawals").build().unwrap()
    }

    fn write() -> RequestDescriptor {
        RequestDescriptor::post("/api/withdrawals")
            .json(&json!({"amount": 500000, "bank": "VCB"}))
            .unwrap()
            .hint(
                MutationHint::new("withdrawal")
                    .number("amount", 500000.0)
                    .text("bank", "VCB"),
            )
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn confirms_matching_record_in_window() {
        let body = json!([
            {"amount": 300000, "bank": "ACB", "createdAt": "2024-05-01T03:00:01Z"},
            {"amount": 500000, "bank": "VCB", "createdAt": "2024-05-01T03:00:02Z", "id": 77},
        ]);
        let transport = ScriptedTransport::new([Reply::status(200, &body.to_string())]);
        let result = reconciler(transport.clone())
            .reconcile(&ambiguity(), &history())
            .await;

        match result {
            MatchResult::Confirmed { record } => assert_eq!(record["id"], 77),
            other => panic!("expected confirmed, got {other:?}"),
        }
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::GET);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_collection_is_unconfirmed() {
        let transport = ScriptedTransport::new([Reply::status(200, r#"{"data": []}"#)]);
        let result = reconciler(transport).reconcile(&ambiguity(), &history()).await;
        assert_eq!(result, MatchResult::Unconfirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_read_is_unconfirmed() {
        let transport = ScriptedTransport::new([Reply::status(500, r#"{"error": "boom"}"#)]);
        let result = reconciler(transport).reconcile(&ambiguity(), &history()).await;
        assert_eq!(result, MatchResult::Unconfirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn read_waits_for_backoff() {
        let transport = ScriptedTransport::new([Reply::status(200, "[]")]);
        let start = tokio::time::Instant::now();
        reconciler(transport).reconcile(&ambiguity(), &history()).await;
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_is_unconfirmed_without_read() {
        let transport = ScriptedTransport::new([Reply::status(
            200,
            r#"[{"amount": 500000, "bank": "VCB", "createdAt": "2024-05-01T03:00:02Z"}]"#,
        )]);
        let rec = reconciler(transport.clone());
        let result = rec
            .reconcile_until(
                &ambiguity(),
                &history(),
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await;
        assert_eq!(result, MatchResult::Unconfirmed);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn writing_read_descriptor_is_refused() {
        let transport = ScriptedTransport::new([]);
        let read = RequestDescriptor::post("/api/withdrawals/search").build().unwrap();
        let result = reconciler(transport.clone()).reconcile(&ambiguity(), &read).await;
        assert_eq!(result, MatchResult::Unconfirmed);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn ambiguous_write_is_confirmed_after_sequential_read() {
        // Stamped shortly after submission, inside the window.
        let created_at = (Utc::now() + chrono::Duration::seconds(2)).to_rfc3339();
        let transport = ScriptedTransport::new([
            Reply::status(200, r#"{"id": 9, "amount": 500000"#),
            Reply::status(
                200,
                &json!({"items": [{"Id": 9, "Amount": "500000", "Bank": "VCB", "CreatedAt": created_at}]})
                    .to_string(),
            ),
        ]);
        let resolution = reconciler(transport.clone())
            .execute_reconciled(&write(), &history())
            .await;

        assert!(resolution.is_success());
        assert!(matches!(resolution, Resolution::Confirmed(ref record) if record["Id"] == 9));
        assert_eq!(resolution.user_message(), None);
        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[1].method, Method::GET);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_write_reports_unclear_status() {
        let transport = ScriptedTransport::new([
            Reply::send_error("connection closed before message completed"),
            Reply::status(200, "[]"),
        ]);
        let resolution = reconciler(transport)
            .execute_reconciled(&write(), &history())
            .await;
        assert!(matches!(resolution, Resolution::Unconfirmed(_)));
        assert_eq!(resolution.user_message(), Some(UNCONFIRMED_MESSAGE));
    }

    #[tokio::test]
    async fn plain_failures_skip_reconciliation() {
        let transport = ScriptedTransport::new([Reply::status(
            400,
            r#"{"message": "Insufficient balance"}"#,
        )]);
        let resolution = reconciler(transport.clone())
            .execute_reconciled(&write(), &history())
            .await;
        match resolution {
            Resolution::Failure(failure) => assert_eq!(failure.kind, ErrorKind::Validation),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(transport.requests().len(), 1);
    }
}
