use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted credentials. The token is opaque: nothing in the request layer
/// looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Cached user profile, dropped together with the tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
    pub saved_at: DateTime<Utc>,
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            profile: None,
            saved_at: Utc::now(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_profile(mut self, profile: Value) -> Self {
        self.profile = Some(profile);
        self
    }
}

/// Storage facade for the process-wide session.
///
/// Implementations own the storage; the request layer only reads the token
/// and, on authorization loss, clears everything.
pub trait SessionStore: Send + Sync {
    /// Current session, if any.
    fn load(&self) -> Option<Session>;

    /// Replace the stored session.
    fn store(&self, session: Session) -> Result<(), SessionStoreError>;

    /// Remove access token, refresh token and profile in one step.
    /// Idempotent: clearing an empty store is not an error.
    fn clear(&self) -> Result<(), SessionStoreError>;

    /// Usable bearer token: present and not blank.
    fn token(&self) -> Option<String> {
        self.load()
            .map(|s| s.access_token.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}
