use thiserror::Error;
use url::Url;

use crate::http::TransportError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No credential configured - please log in")]
    CredentialNotFound,

    #[error("Captcha required - log in manually at {manual_login_url}")]
    NeedsCaptcha { manual_login_url: Url },

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Service only reachable from the campus network: {0}")]
    CampusOnly(String),

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl AuthError {
    /// Only transient network failures are safe to retry without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::TransientNetwork(_))
    }

    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut = (0..=MAX_ERROR_BODY_LENGTH)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
        }
    }

    pub(crate) fn invalid_response(what: &str, body: &str) -> Self {
        AuthError::InvalidResponse(format!("{}: {}", what, Self::truncate_body(body)))
    }
}

impl From<TransportError> for AuthError {
    fn from(err: TransportError) -> Self {
        AuthError::TransientNetwork(err.to_string())
    }
}
