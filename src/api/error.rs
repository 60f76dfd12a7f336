use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use super::ApiResponse;
use crate::session::SessionError;

pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_NOT_FOUND: u16 = 404;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response
    #[error("request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        field_errors: BTreeMap<String, String>,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Rejected locally before anything was sent
    #[error("{0}")]
    Validation(String),

    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Error body produced by the backend's exception handler
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: BTreeMap<String, String>,
}

impl ClientError {
    /// Build the error for a non-success response
    pub fn from_response(response: &ApiResponse) -> Self {
        let (message, field_errors) = match serde_json::from_str::<ErrorBody>(&response.body) {
            Ok(body) => {
                let message = body
                    .message
                    .or(body.error)
                    .unwrap_or_else(|| default_message(response.status));
                (message, body.errors)
            }
            Err(_) if response.body.trim().is_empty() => {
                (default_message(response.status), BTreeMap::new())
            }
            Err(_) => (response.body.trim().to_string(), BTreeMap::new()),
        };

        ClientError::Http {
            status: response.status,
            message,
            field_errors,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(STATUS_UNAUTHORIZED)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(STATUS_NOT_FOUND)
    }
}

fn default_message(status: u16) -> String {
    match status {
        400 => "Bad request".to_string(),
        401 => "Unauthorized".to_string(),
        403 => "Forbidden".to_string(),
        404 => "Not found".to_string(),
        500..=599 => "Server error".to_string(),
        _ => format!("Unexpected status {}", status),
    }
}
