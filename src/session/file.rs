use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Session, SessionError, SessionStore};

/// Session persisted as one JSON document
///
/// Writes go to a uniquely named sibling temp file that is then renamed over
/// the real one, so readers see either the old or the new session, never a mix.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read(&self) -> Result<Session, SessionError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Session::default()),
            Err(e) => return Err(self.io_error(e)),
        };

        match serde_json::from_str(&content) {
            Ok(session) => Ok(session),
            Err(e) => {
                // Unreadable session means logged out
                tracing::warn!("Ignoring corrupt session file {}: {}", self.path.display(), e);
                Ok(Session::default())
            }
        }
    }

    fn write(&self, session: &Session) -> Result<(), SessionError> {
        if session.is_empty() {
            return self.remove();
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let content = serde_json::to_string_pretty(session)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        // Unique per writer, so concurrent processes never share a temp file
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(content.as_bytes()).map_err(|e| self.io_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tmp.as_file()
                .set_permissions(perms)
                .map_err(|e| self.io_error(e))?;
        }

        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    fn remove(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Session, SessionError> {
        self.read()
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let _guard = self.write_lock.lock().map_err(|_| SessionError::Poisoned)?;
        self.write(session)
    }

    fn clear(&self) -> Result<(), SessionError> {
        let _guard = self.write_lock.lock().map_err(|_| SessionError::Poisoned)?;
        self.remove()
    }

    fn update_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), SessionError> {
        let _guard = self.write_lock.lock().map_err(|_| SessionError::Poisoned)?;
        let mut session = self.read()?;
        session.access_token = Some(access_token.to_string());
        session.refresh_token = Some(refresh_token.to_string());
        self.write(&session)
    }
}
