use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::flow::LoginFlow;
use super::session::SessionState;
use super::{AuthError, Credential, CredentialStore};
use crate::http::{Fetch, HttpRequest, HttpResponse, Transport};
use crate::proxy::ProxiedChannel;
use crate::sync::Semaphore;

/// Authenticated fetch for one login variant.
///
/// Probes the target, runs the variant's handshake at most once when the
/// probe shows no session, and retries the probe once. Concurrent callers
/// that find a stale session queue on the guard; whoever comes after a
/// completed handshake reuses it instead of logging in again.
pub struct Authenticator {
    flow: Arc<dyn LoginFlow>,
    channel: ProxiedChannel,
    credentials: Arc<CredentialStore>,
    guard: Semaphore,
    session: Mutex<SessionState>,
}

impl Authenticator {
    pub fn new(
        flow: Arc<dyn LoginFlow>,
        channel: ProxiedChannel,
        credentials: Arc<CredentialStore>,
        login_concurrency: usize,
    ) -> Self {
        Self {
            flow,
            channel,
            credentials,
            guard: Semaphore::new(login_concurrency),
            session: Mutex::new(SessionState::default()),
        }
    }

    pub fn name(&self) -> &str {
        self.flow.name()
    }

    /// The cookie jar behind this variant
    pub fn transport(&self) -> &dyn Transport {
        self.channel.transport()
    }

    /// Fetch `url` with an authenticated session and return the body.
    pub async fn authenticate(
        &self,
        url: &Url,
        manual_fallback_url: Option<Url>,
    ) -> Result<Vec<u8>, AuthError> {
        Ok(self.authenticate_response(url, manual_fallback_url).await?.body)
    }

    /// Like `authenticate`, keeping status, final URL and headers.
    ///
    /// Transient network failures are retried once; everything else needs
    /// user action and is returned as is.
    pub async fn authenticate_response(
        &self,
        url: &Url,
        manual_fallback_url: Option<Url>,
    ) -> Result<HttpResponse, AuthError> {
        let result = match self.authenticate_for_target(url).await {
            Err(e) if e.is_retryable() => {
                warn!(service = self.name(), url = %url, error = %e, "Transient failure, retrying once");
                self.authenticate_for_target(url).await
            }
            other => other,
        };

        result.map_err(|e| match e {
            AuthError::NeedsCaptcha { .. } => AuthError::NeedsCaptcha {
                manual_login_url: manual_fallback_url
                    .unwrap_or_else(|| self.flow.manual_login_url(url)),
            },
            e => e,
        })
    }

    /// Send an arbitrary request with an authenticated session.
    ///
    /// Anything but a plain GET is replayed verbatim once the session has
    /// been established through the probe.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        let target = request.url.clone();
        if request.is_plain_get() {
            return self.authenticate_response(&target, None).await;
        }

        self.authenticate_response(&target, None).await?;
        debug!(service = self.name(), method = %request.method, url = %target, "Replaying request");
        self.channel.fetch(request).await
    }

    /// Probe `target`, logging in and probing again at most once.
    pub async fn authenticate_for_target(&self, target: &Url) -> Result<HttpResponse, AuthError> {
        let credential = self.current_credential().await?;
        let seen_attempts = self.session.lock().await.attempts;

        let probe = HttpRequest::get(self.flow.probe(target));
        let response = self.channel.fetch(probe.clone()).await?;
        if !self.flow.needs_login(&response) {
            return Ok(response);
        }

        debug!(service = self.name(), url = %target, "Session missing or expired");
        self.ensure_login(&credential, seen_attempts).await?;

        let response = self.channel.fetch(probe).await?;
        if self.flow.needs_login(&response) {
            warn!(service = self.name(), url = %target, "Still unauthenticated after login");
            return Err(AuthError::LoginFailed(format!(
                "{} still asks for a login after the handshake",
                self.name()
            )));
        }
        Ok(response)
    }

    /// The stored credential, with the jar cleared if it holds another
    /// user's session.
    async fn current_credential(&self) -> Result<Credential, AuthError> {
        let credential = self.credentials.get().ok_or(AuthError::CredentialNotFound)?;

        let mut session = self.session.lock().await;
        if session.belongs_to_other(&credential.username) {
            info!(service = self.name(), username = %credential.username, "Credential changed, dropping old session");
            self.channel.transport().clear_cookies().await?;
            session.reset();
        }
        Ok(credential)
    }

    /// Log in unless a handshake for the same user finished after the caller
    /// saw `seen_attempts`; a rejected one is reported without asking again.
    async fn ensure_login(&self, credential: &Credential, seen_attempts: u64) -> Result<(), AuthError> {
        let _permit = self.guard.acquire().await;
        let outcome = self
            .session
            .lock()
            .await
            .outcome_since(seen_attempts, &credential.username);
        if let Some(outcome) = outcome {
            debug!(service = self.name(), ok = outcome.is_ok(), "Login finished while waiting");
            return outcome;
        }

        match self.flow.login(&self.channel, credential).await {
            Ok(()) => {
                self.session.lock().await.record_login(&credential.username);
                Ok(())
            }
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => {
                self.session
                    .lock()
                    .await
                    .record_failure(&credential.username, e.clone());
                Err(e)
            }
        }
    }

    /// Drop this variant's cookies and session record
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.channel.transport().clear_cookies().await?;
        self.session.lock().await.reset();
        info!(service = self.name(), "Logged out");
        Ok(())
    }

    pub async fn last_login(&self) -> Option<DateTime<Utc>> {
        self.session.lock().await.logged_in_at
    }
}
