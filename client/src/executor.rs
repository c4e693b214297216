use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use brightpath_core::error::error_message_for_status;
use brightpath_core::fields::canonicalize_keys;
use brightpath_core::integrity::{self, Integrity, is_success_status};
use brightpath_core::{Ambiguity, ErrorKind, Failure, Outcome, Session, SessionStore, SessionStoreError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::descriptor::{RequestBody, RequestDescriptor};
use crate::transport::{
    Transport, TransportError, TransportFault, TransportRequest, TransportResponse,
    classify_transport_error,
};

/// Status the upload endpoints answer with when the path variant is wrong.
const METHOD_NOT_ALLOWED: u16 = 405;

/// The login surface the executor sends the user to after a 401.
pub trait LoginRedirect: Send + Sync {
    /// Route currently shown, when the host knows it.
    fn current_route(&self) -> Option<String> {
        None
    }

    fn redirect_to_login(&self, login_route: &str);
}

/// Redirect target for hosts without navigation: logs the re-login hint.
pub struct LogRedirect;

impl LoginRedirect for LogRedirect {
    fn redirect_to_login(&self, login_route: &str) {
        tracing::info!(login_route, "Session expired, sign in again");
    }
}

/// Issues requests and turns whatever happens into an [`Outcome`].
///
/// Never retries on its own (the single exception is the upload 405 path
/// fallback) and never returns an error for transport conditions.
pub struct Executor<T: Transport> {
    transport: T,
    api_url: String,
    login_route: String,
    session: Arc<dyn SessionStore>,
    redirect: Arc<dyn LoginRedirect>,
    // Set once a 401 has been handled; re-armed by a new session or an
    // authenticated 2xx.
    auth_lost: AtomicBool,
}

impl<T: Transport> Executor<T> {
    pub fn new(
        transport: T,
        config: &ClientConfig,
        session: Arc<dyn SessionStore>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Self {
        Self {
            transport,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            login_route: config.login_route.clone(),
            session,
            redirect,
            auth_lost: AtomicBool::new(false),
        }
    }

    /// Persist a freshly issued session.
    pub fn store_session(&self, session: Session) -> Result<(), SessionStoreError> {
        self.session.store(session)?;
        self.auth_lost.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Explicit sign-out.
    pub fn logout(&self) -> Result<(), SessionStoreError> {
        self.session.clear()
    }

    /// Execute and decode the success payload into a canonical type.
    ///
    /// Keys are normalized to camelCase first, so `T` only needs to know one
    /// spelling. A payload that does not fit `T` is `MalformedPayload`.
    pub async fn execute_as<D: DeserializeOwned>(&self, descriptor: &RequestDescriptor) -> Outcome<D> {
        match self.execute(descriptor).await {
            Outcome::Success { data } => {
                match serde_json::from_value::<D>(canonicalize_keys(data.clone())) {
                    Ok(decoded) => Outcome::success(decoded),
                    Err(e) => {
                        tracing::warn!(error = %e, "Response did not match the expected shape");
                        Outcome::Failure(
                            Failure::new(
                                ErrorKind::MalformedPayload,
                                format!("Unexpected response shape: {e}"),
                            )
                            .with_details(data),
                        )
                    }
                }
            }
            Outcome::Failure(failure) => Outcome::Failure(failure),
            Outcome::Ambiguous(ambiguity) => Outcome::Ambiguous(ambiguity),
        }
    }

    pub async fn execute(&self, descriptor: &RequestDescriptor) -> Outcome<Value> {
        let request_id = Uuid::now_v7();
        let span = tracing::info_span!(
            "request",
            %request_id,
            method = %descriptor.method(),
            path = descriptor.path(),
        );
        async move {
            let mut paths = descriptor.candidate_paths().peekable();
            loop {
                let Some(path) = paths.next() else {
                    // candidate_paths always yields the primary path.
                    return Outcome::failure(ErrorKind::Transport, "No request path to try");
                };
                let outcome = self.execute_once(descriptor, path).await;
                let wrong_variant = matches!(
                    &outcome,
                    Outcome::Failure(Failure { status: Some(METHOD_NOT_ALLOWED), .. })
                );
                if wrong_variant && descriptor.is_upload() {
                    if let Some(next) = paths.peek() {
                        tracing::warn!(path, next, "Upload rejected with 405, trying alternate path");
                        continue;
                    }
                }
                return outcome;
            }
        }
        .instrument(span)
        .await
    }

    async fn execute_once(&self, descriptor: &RequestDescriptor, path: &str) -> Outcome<Value> {
        let token = self.session.token();
        let request = self.build_request(descriptor, path, token.as_deref());
        let submitted_at = Utc::now();

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => return self.connection_failure(descriptor, err, submitted_at),
        };
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return self.connection_failure(descriptor, err, submitted_at),
        };

        self.interpret(descriptor, status, body, submitted_at, token.as_deref())
    }

    fn build_request(
        &self,
        descriptor: &RequestDescriptor,
        path: &str,
        token: Option<&str>,
    ) -> TransportRequest {
        let mut headers: Vec<(String, String)> = Vec::new();
        let overrides_content_type = descriptor
            .headers()
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"));
        // Multipart must leave Content-Type to the transport, which adds the boundary.
        if !overrides_content_type && !matches!(descriptor.body(), RequestBody::Multipart(_)) {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        for (name, value) in descriptor.headers() {
            if descriptor.is_upload() && name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            headers.push((name.clone(), value.clone()));
        }
        if let Some(token) = token {
            headers.retain(|(k, _)| !k.eq_ignore_ascii_case("authorization"));
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        TransportRequest {
            method: descriptor.method().clone(),
            url: format!("{}{}", self.api_url, path),
            headers,
            body: descriptor.body().clone(),
        }
    }

    fn connection_failure(
        &self,
        descriptor: &RequestDescriptor,
        err: TransportError,
        submitted_at: DateTime<Utc>,
    ) -> Outcome<Value> {
        match classify_transport_error(&err.message) {
            TransportFault::Protocol => {
                tracing::warn!(error = %err, "Protocol failure");
                Outcome::Failure(Failure::new(
                    ErrorKind::ProtocolError,
                    format!("Protocol error while talking to the server: {err}"),
                ))
            }
            TransportFault::Cutoff => {
                tracing::warn!(error = %err, "Response stream was cut off");
                self.incomplete(
                    descriptor,
                    None,
                    submitted_at,
                    format!("The server response was interrupted: {err}"),
                )
            }
            TransportFault::Other => {
                tracing::warn!(error = %err, "Request could not be completed");
                Outcome::Failure(Failure::new(
                    ErrorKind::Transport,
                    format!("Failed to reach the server at {}: {err}", self.api_url),
                ))
            }
        }
    }

    /// `Ambiguous` for hinted writes, `IncompleteResponse` for everything else.
    fn incomplete(
        &self,
        descriptor: &RequestDescriptor,
        raw_body: Option<String>,
        submitted_at: DateTime<Utc>,
        message: String,
    ) -> Outcome<Value> {
        match descriptor.hint() {
            Some(hint) => {
                tracing::warn!(resource = %hint.resource, "Write outcome is ambiguous");
                Outcome::Ambiguous(Ambiguity {
                    raw_body: raw_body.filter(|b| !b.is_empty()),
                    hint: hint.clone(),
                    submitted_at,
                })
            }
            None => Outcome::Failure(
                Failure::new(ErrorKind::IncompleteResponse, message)
                    .with_details(raw_body.map(Value::String).unwrap_or(Value::Null)),
            ),
        }
    }

    fn interpret(
        &self,
        descriptor: &RequestDescriptor,
        status: u16,
        body: String,
        submitted_at: DateTime<Utc>,
        token: Option<&str>,
    ) -> Outcome<Value> {
        let success = is_success_status(status);
        match integrity::classify(status, &body) {
            Integrity::Truncated => {
                tracing::warn!(status, body_len = body.len(), "Response body looks truncated");
                self.incomplete(
                    descriptor,
                    Some(body),
                    submitted_at,
                    "The server response was incomplete".to_string(),
                )
            }
            Integrity::PlainTextSuccess(text) => {
                if token.is_some() {
                    self.auth_lost.store(false, Ordering::SeqCst);
                }
                tracing::debug!(status, "Plain-text confirmation");
                Outcome::success(json!({ "message": text }))
            }
            Integrity::RawText(text) if success => {
                tracing::warn!(status, "Success response was not valid JSON");
                Outcome::Failure(
                    Failure::new(
                        ErrorKind::MalformedPayload,
                        "The server sent a response that could not be read",
                    )
                    .with_details(Value::String(text))
                    .with_status(status),
                )
            }
            Integrity::RawText(text) => self.http_failure(descriptor, status, Value::Null, &text),
            Integrity::WellFormedJson(value) if success => {
                if token.is_some() {
                    self.auth_lost.store(false, Ordering::SeqCst);
                }
                tracing::debug!(status, "Request succeeded");
                Outcome::success(value)
            }
            Integrity::WellFormedJson(value) => {
                self.http_failure(descriptor, status, value, &body)
            }
        }
    }

    fn http_failure(
        &self,
        descriptor: &RequestDescriptor,
        status: u16,
        parsed: Value,
        raw_body: &str,
    ) -> Outcome<Value> {
        let kind = ErrorKind::from_status(status);
        let message = error_message_for_status(status, &parsed, raw_body);

        match kind {
            ErrorKind::AuthExpired => self.handle_auth_expired(),
            ErrorKind::NotFound if descriptor.expects_not_found() => {
                tracing::debug!(status, "Resource not found (expected)");
            }
            ErrorKind::Validation => {
                tracing::debug!(status, %message, "Request rejected");
            }
            _ => {
                tracing::warn!(status, kind = %kind, %message, "Request failed");
            }
        }

        let details = if parsed.is_null() && !raw_body.trim().is_empty() {
            Value::String(raw_body.to_string())
        } else {
            parsed
        };
        Outcome::Failure(
            Failure::new(kind, message)
                .with_details(details)
                .with_status(status),
        )
    }

    /// Clear the session and redirect, once until the latch is re-armed.
    fn handle_auth_expired(&self) {
        if self.auth_lost.swap(true, Ordering::SeqCst) {
            tracing::debug!("Session already invalidated");
            return;
        }

        tracing::info!("Session rejected by the server, clearing stored credentials");
        if let Err(e) = self.session.clear() {
            tracing::error!(error = %e, "Failed to clear session");
        }

        let on_login = self
            .redirect
            .current_route()
            .is_some_and(|route| route.starts_with(&self.login_route));
        if !on_login {
            self.redirect.redirect_to_login(&self.login_route);
        }
    }
}
