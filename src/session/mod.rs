//! Persisted login session
//!
//! The session is three related fields (`authToken`, `refreshToken`, `user`)
//! that are always written and cleared together. Stores are injected into
//! the API client instead of being reached through globals, so tests can
//! swap the file-backed store for the in-memory one.

pub mod file;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

use crate::models::{AuthResponse, User};

pub use file::FileSessionStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("session store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "authToken", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl Session {
    pub fn from_auth(response: &AuthResponse) -> Self {
        Self {
            access_token: Some(response.access_token.clone()),
            refresh_token: Some(response.refresh_token.clone()),
            user: Some(response.user.clone()),
        }
    }

    /// Logged in means both an access token and a cached user are present
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.user.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }
}

/// Read/write/clear access to the persisted session
///
/// Every write replaces all three fields in one step; implementations must
/// never expose a half-written session.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Session, SessionError>;

    fn save(&self, session: &Session) -> Result<(), SessionError>;

    fn clear(&self) -> Result<(), SessionError>;

    /// Replace both tokens and keep the cached user
    fn update_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), SessionError> {
        let mut session = self.load()?;
        session.access_token = Some(access_token.to_string());
        session.refresh_token = Some(refresh_token.to_string());
        self.save(&session)
    }

    fn access_token(&self) -> Option<String> {
        load_or_empty(self).access_token
    }

    fn refresh_token(&self) -> Option<String> {
        load_or_empty(self).refresh_token
    }
}

fn load_or_empty<S: SessionStore + ?Sized>(store: &S) -> Session {
    store.load().unwrap_or_else(|e| {
        tracing::warn!("Could not read session: {}", e);
        Session::default()
    })
}

/// Session held in process memory only
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Session, SessionError> {
        let session = self.session.lock().map_err(|_| SessionError::Poisoned)?;
        Ok(session.clone())
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let mut current = self.session.lock().map_err(|_| SessionError::Poisoned)?;
        *current = session.clone();
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        self.save(&Session::default())
    }

    fn update_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), SessionError> {
        let mut current = self.session.lock().map_err(|_| SessionError::Poisoned)?;
        current.access_token = Some(access_token.to_string());
        current.refresh_token = Some(refresh_token.to_string());
        Ok(())
    }
}
