use chrono::{DateTime, Utc};

use super::error::AuthError;

/// What an authenticator variant knows about the session in its cookie jar.
///
/// The cookies themselves live in the transport; this records which
/// credential produced them and how many handshakes have completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Username whose handshake populated the jar
    pub username: Option<String>,
    pub logged_in_at: Option<DateTime<Utc>>,
    /// Incremented on every successful handshake
    pub generation: u64,
    /// Incremented on every finished handshake, failed ones included
    pub attempts: u64,
    /// Set when the latest handshake was rejected
    pub last_failure: Option<FailedLogin>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLogin {
    pub username: String,
    pub error: AuthError,
}

impl SessionState {
    /// Record a successful handshake for `username`
    pub fn record_login(&mut self, username: &str) {
        self.username = Some(username.to_string());
        self.logged_in_at = Some(Utc::now());
        self.generation += 1;
        self.attempts += 1;
        self.last_failure = None;
    }

    /// Record a rejected handshake for `username`
    pub fn record_failure(&mut self, username: &str, error: AuthError) {
        self.attempts += 1;
        self.last_failure = Some(FailedLogin {
            username: username.to_string(),
            error,
        });
    }

    /// Outcome of handshakes finished after a caller saw `seen_attempts`.
    ///
    /// `None` means the caller still has to log in itself.
    pub fn outcome_since(&self, seen_attempts: u64, username: &str) -> Option<Result<(), AuthError>> {
        if self.attempts == seen_attempts {
            return None;
        }
        match &self.last_failure {
            Some(failure) if failure.username == username => Some(Err(failure.error.clone())),
            Some(_) => None,
            None if self.username.as_deref() == Some(username) => Some(Ok(())),
            None => None,
        }
    }

    /// The jar holds cookies for a different identity than `username`
    pub fn belongs_to_other(&self, username: &str) -> bool {
        self.username.as_deref().is_some_and(|u| u != username)
    }

    /// Forget the identity; the generation keeps counting so waiters that
    /// observed an older value still see a change.
    pub fn reset(&mut self) {
        self.username = None;
        self.logged_in_at = None;
        self.last_failure = None;
        self.generation += 1;
    }

    /// Minutes since the last handshake, for status display
    pub fn minutes_since_login(&self) -> Option<i64> {
        self.logged_in_at
            .map(|at| (Utc::now() - at).num_minutes().max(0))
    }
}
