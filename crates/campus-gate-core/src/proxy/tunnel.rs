//! The WebVPN's own login session.
//!
//! The tunnel is gated by a CAS ticket of its own, independent of whatever
//! login the target service needs. Its cookies live in a dedicated jar.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::webvpn::WebVpnTranslator;
use crate::auth::session::SessionState;
use crate::auth::sso::CasLogin;
use crate::auth::{AuthError, Credential, CredentialStore};
use crate::http::{Direct, Fetch, HttpRequest, HttpResponse, Transport};
use crate::sync::Semaphore;
use crate::utils::{element_value_by_id, same_host};

pub struct WebVpnSession {
    transport: Arc<dyn Transport>,
    translator: Arc<WebVpnTranslator>,
    cas: CasLogin,
    credentials: Arc<CredentialStore>,
    guard: Semaphore,
    session: Mutex<SessionState>,
}

impl WebVpnSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        translator: Arc<WebVpnTranslator>,
        cas: CasLogin,
        credentials: Arc<CredentialStore>,
        login_concurrency: usize,
    ) -> Self {
        Self {
            transport,
            translator,
            cas,
            credentials,
            guard: Semaphore::new(login_concurrency),
            session: Mutex::new(SessionState::default()),
        }
    }

    /// The authserver this tunnel logs in against
    pub fn cas(&self) -> &CasLogin {
        &self.cas
    }

    /// Send an already-rewritten request through the tunnel, logging in to the
    /// WebVPN at most once if it bounces to its login page.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        let seen_attempts = self.drop_foreign_session().await?;

        let response = self.execute(request.clone()).await?;
        if !self.translator.is_login_page(&response.url) {
            return Ok(response);
        }

        debug!(url = %request.url, "WebVPN session missing");
        self.ensure_login(seen_attempts).await?;

        let response = self.execute(request).await?;
        if self.translator.is_login_page(&response.url) {
            warn!("WebVPN still demands a login after the ticket exchange");
            return Err(AuthError::LoginFailed(
                "WebVPN rejected the session after login".to_string(),
            ));
        }
        Ok(response)
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        self.transport
            .execute(request)
            .await
            .map_err(|e| AuthError::CampusOnly(format!("WebVPN unreachable: {}", e)))
    }

    /// Clear the jar when it holds a session for someone other than the
    /// stored credential. Returns the attempt count the caller starts from.
    async fn drop_foreign_session(&self) -> Result<u64, AuthError> {
        let mut session = self.session.lock().await;
        if let Some(credential) = self.credentials.get() {
            if session.belongs_to_other(&credential.username) {
                info!(username = %credential.username, "Credential changed, dropping WebVPN session");
                self.transport.clear_cookies().await?;
                session.reset();
            }
        }
        Ok(session.attempts)
    }

    async fn ensure_login(&self, seen_attempts: u64) -> Result<(), AuthError> {
        let credential = self.credentials.get().ok_or(AuthError::CredentialNotFound)?;

        let _permit = self.guard.acquire().await;
        let outcome = self
            .session
            .lock()
            .await
            .outcome_since(seen_attempts, &credential.username);
        if let Some(outcome) = outcome {
            debug!(ok = outcome.is_ok(), "WebVPN login finished by another caller");
            return outcome;
        }

        match self.handshake(&credential).await {
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

    /// Exchange a CAS ticket for a WebVPN session.
    ///
    /// The ticket is read from the exchange page and redeemed immediately;
    /// it is never kept.
    pub async fn handshake(&self, credential: &Credential) -> Result<(), AuthError> {
        let http = Direct(self.transport.as_ref());
        let exchange = HttpRequest::get(self.cas.ticket_exchange_url(&self.translator.login_url()));

        let mut page = http.fetch(exchange.clone()).await?;
        if self.cas.is_login_page(&page.url) {
            debug!("No SSO session in the WebVPN jar, logging in to CAS first");
            let landed = self
                .cas
                .login_for_service(&http, credential, &self.translator.login_url())
                .await?;
            if self.is_inside(&landed.url) {
                info!(username = %credential.username, "WebVPN session established by CAS redirect");
                return Ok(());
            }
            page = http.fetch(exchange).await?;
        }

        let body = page.text();
        let ticket = element_value_by_id(&body, "ticket")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::invalid_response("Ticket exchange page has no ticket", &body))?;

        let landed = http
            .fetch(HttpRequest::get(self.translator.ticket_login_url(&ticket)))
            .await?;
        if self.translator.is_login_page(&landed.url) {
            warn!(username = %credential.username, "WebVPN refused the CAS ticket");
            return Err(AuthError::LoginFailed(
                "WebVPN login page shown after ticket login".to_string(),
            ));
        }

        info!(username = %credential.username, "WebVPN session established");
        Ok(())
    }

    /// A WebVPN page other than its login form
    fn is_inside(&self, url: &Url) -> bool {
        same_host(url, self.translator.base_url()) && !self.translator.is_login_page(url)
    }

    /// Drop the tunnel session
    pub async fn logout(&self) -> Result<(), AuthError> {
        self.transport.clear_cookies().await?;
        self.session.lock().await.reset();
        Ok(())
    }
}
