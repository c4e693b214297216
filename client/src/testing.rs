//! Scripted doubles for the transport, session store and login redirect.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use brightpath_core::{Session, SessionStore, SessionStoreError};

use crate::executor::LoginRedirect;
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

/// One scripted answer of the transport.
#[derive(Debug, Clone)]
pub enum Reply {
    Response { status: u16, body: Result<String, TransportError> },
    SendError(TransportError),
}

impl Reply {
    pub fn status(status: u16, body: &str) -> Self {
        Reply::Response {
            status,
            body: Ok(body.to_string()),
        }
    }

    pub fn send_error(message: &str) -> Self {
        Reply::SendError(TransportError::new(message))
    }

    /// Headers arrive, then the body stream breaks.
    pub fn body_error(status: u16, message: &str) -> Self {
        Reply::Response {
            status,
            body: Err(TransportError::new(message)),
        }
    }
}

/// Answers requests from a queue and records what was sent.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<TransportRequest>>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub struct ScriptedResponse {
    status: u16,
    body: Result<String, TransportError>,
}

#[async_trait]
impl TransportResponse for ScriptedResponse {
    fn status(&self) -> u16 {
        self.status
    }

    async fn text(self) -> Result<String, TransportError> {
        tokio::task::yield_now().await;
        self.body
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Response = ScriptedResponse;

    async fn send(&self, request: TransportRequest) -> Result<ScriptedResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        // Lets concurrent requests interleave the way real I/O would.
        tokio::task::yield_now().await;
        match reply {
            Some(Reply::Response { status, body }) => Ok(ScriptedResponse { status, body }),
            Some(Reply::SendError(err)) => Err(err),
            None => Err(TransportError::new("no scripted reply left")),
        }
    }
}

/// In-memory store that counts `clear()` calls.
#[derive(Default)]
pub struct RecordingStore {
    session: Mutex<Option<Session>>,
    clears: AtomicUsize,
}

impl RecordingStore {
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            clears: AtomicUsize::new(0),
        }
    }

    pub fn clear_calls(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl SessionStore for RecordingStore {
    fn load(&self) -> Option<Session> {
        self.session.lock().unwrap().clone()
    }

    fn store(&self, session: Session) -> Result<(), SessionStoreError> {
        *self.session.lock().unwrap() = Some(session);
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.session.lock().unwrap().take();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingRedirect {
    route: Option<String>,
    redirects: AtomicUsize,
}

impl RecordingRedirect {
    pub fn on_route(route: &str) -> Self {
        Self {
            route: Some(route.to_string()),
            redirects: AtomicUsize::new(0),
        }
    }

    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl LoginRedirect for RecordingRedirect {
    fn current_route(&self) -> Option<String> {
        self.route.clone()
    }

    fn redirect_to_login(&self, _login_route: &str) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}
