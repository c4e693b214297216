//! `SessionStore` implementations.
//!
//! Each store keeps access token, refresh token and profile in one unit, so
//! `clear()` is a single operation and a concurrent reader never observes a
//! half-cleared session.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use brightpath_core::{Session, SessionStore, SessionStoreError};

/// In-process store, e.g. for long-running services and tests.
#[derive(Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store(&self, session: Session) -> Result<(), SessionStoreError> {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session);
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}

pub fn default_session_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("brightpath");
    config_dir.join("session.json")
}

/// Session persisted as one JSON file; clearing removes the file.
pub struct FileSessionStore {
    path: PathBuf,
    // Serializes writers within the process; the file itself is replaced by rename.
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn at_default_path() -> Self {
        Self::new(default_session_path())
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Option<Session> {
        let data = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&data) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable session file");
                None
            }
        }
    }

    fn store(&self, session: Session) -> Result<(), SessionStoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_string_pretty(&session)?;

        // Write next to the target and rename, so readers see old or new, never partial.
        let tmp = self.path.with_extension("json.tmp");
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)?;
        file.write_all(data.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Token from an environment variable (`BRIGHTPATH_TOKEN`), layered over a
/// writable store. The env token wins for reads and writes go to the inner
/// store; `clear()` drops both, so a rejected env token is not sent again.
pub struct EnvSessionStore<S> {
    token: Mutex<Option<String>>,
    inner: S,
}

pub const TOKEN_ENV: &str = "BRIGHTPATH_TOKEN";

impl<S: SessionStore> EnvSessionStore<S> {
    pub fn from_env(inner: S) -> Self {
        Self::new(std::env::var(TOKEN_ENV).ok(), inner)
    }

    pub fn new(token: Option<String>, inner: S) -> Self {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self {
            token: Mutex::new(token),
            inner,
        }
    }

    pub fn uses_env_token(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl<S: SessionStore> SessionStore for EnvSessionStore<S> {
    fn load(&self) -> Option<Session> {
        let token = self
            .token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match token {
            Some(token) => Some(Session::new(token)),
            None => self.inner.load(),
        }
    }

    fn store(&self, session: Session) -> Result<(), SessionStoreError> {
        self.inner.store(session)
    }

    fn clear(&self) -> Result<(), SessionStoreError> {
        let mut token = self.token.lock().unwrap_or_else(|e| e.into_inner());
        token.take();
        self.inner.clear()
    }
}

// Unix-specific imports for file permissions
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

// No-op on non-unix (won't compile for Windows without this)
#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for std::fs::OpenOptions {
    fn mode(&mut self, _mode: u32) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn temp_session_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("brightpath-test-{}", uuid::Uuid::now_v7()))
            .join("session.json")
    }

    #[test]
    fn memory_store_clears_everything_at_once() {
        let store = MemorySessionStore::with_session(
            Session::new("at")
                .with_refresh_token("rt")
                .with_profile(json!({"role": "tutor"})),
        );
        assert_eq!(store.token().as_deref(), Some("at"));
        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn blank_tokens_are_not_usable() {
        let store = MemorySessionStore::with_session(Session::new("   "));
        assert!(store.load().is_some());
        assert_eq!(store.token(), None);
    }

    #[test]
    fn file_store_roundtrip_and_clear() {
        let path = temp_session_path();
        let store = FileSessionStore::new(&path);
        assert!(store.load().is_none());

        store
            .store(Session::new("at").with_refresh_token("rt"))
            .unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token, "at");
        assert_eq!(loaded.refresh_token.as_deref(), Some("rt"));

        store.clear().unwrap();
        assert!(!path.exists());
        store.clear().unwrap();

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[cfg(unix)]
    #[test]
    fn file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_session_path();
        let store = FileSessionStore::new(&path);
        store.store(Session::new("at")).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn corrupt_session_file_reads_as_empty() {
        let path = temp_session_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(FileSessionStore::new(&path).load().is_none());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn env_token_wins_until_cleared() {
        let inner = MemorySessionStore::with_session(Session::new("stored"));
        let store = EnvSessionStore::new(Some("from-env".to_string()), inner);
        assert!(store.uses_env_token());
        assert_eq!(store.token().as_deref(), Some("from-env"));
        store.clear().unwrap();
        assert!(!store.uses_env_token());
        assert!(store.inner.load().is_none());
        assert_eq!(store.token(), None);
        assert!(store.load().is_none());

        let rejected = EnvSessionStore::new(Some("rejected".to_string()), MemorySessionStore::new());
        rejected.clear().unwrap();
        assert_eq!(rejected.token(), None);

        let fallback = EnvSessionStore::new(
            Some("  ".to_string()),
            MemorySessionStore::with_session(Session::new("stored")),
        );
        assert_eq!(fallback.token().as_deref(), Some("stored"));
    }
}
