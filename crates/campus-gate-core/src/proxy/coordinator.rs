use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::tunnel::WebVpnSession;
use super::webvpn::WebVpnTranslator;
use crate::auth::AuthError;
use crate::http::{Fetch, HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyMode {
    DirectPreferred,
    TunnelForced,
}

/// Whether direct connections to campus hosts currently work.
///
/// Shared by every authenticator through the coordinator; tests build their
/// own instance.
#[derive(Debug, Default)]
pub struct ProxyState {
    tunnel_since: Mutex<Option<Instant>>,
    reprobe_after: Option<Duration>,
}

impl ProxyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow a new direct attempt once the tunnel has been forced this long
    pub fn with_reprobe(reprobe_after: Option<Duration>) -> Self {
        Self {
            tunnel_since: Mutex::new(None),
            reprobe_after,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Instant>> {
        self.tunnel_since.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mode(&self) -> ProxyMode {
        let mut since = self.lock();
        let forced_at = *since;
        match forced_at {
            None => ProxyMode::DirectPreferred,
            Some(at) if self.reprobe_after.is_some_and(|after| at.elapsed() >= after) => {
                info!("Re-probing direct campus connectivity");
                *since = None;
                ProxyMode::DirectPreferred
            }
            Some(_) => ProxyMode::TunnelForced,
        }
    }

    pub fn force_tunnel(&self) {
        let mut since = self.lock();
        if since.is_none() {
            *since = Some(Instant::now());
        }
    }
}

/// Chooses, per request, between the direct route and the WebVPN tunnel.
pub struct ProxyCoordinator {
    translator: Arc<WebVpnTranslator>,
    state: Arc<ProxyState>,
    tunnel: Arc<WebVpnSession>,
    direct_timeout: Duration,
}

impl ProxyCoordinator {
    pub fn new(
        translator: Arc<WebVpnTranslator>,
        state: Arc<ProxyState>,
        tunnel: Arc<WebVpnSession>,
        direct_timeout: Duration,
    ) -> Self {
        Self {
            translator,
            state,
            tunnel,
            direct_timeout,
        }
    }

    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    pub fn tunnel(&self) -> &WebVpnSession {
        &self.tunnel
    }

    /// Send `request` over `direct` or through the tunnel.
    ///
    /// Only a timeout on the way to an enrolled host switches to the tunnel;
    /// HTTP error statuses and other transport failures are passed to the
    /// caller. Authserver requests count as enrolled when their `service` is,
    /// and once the tunnel is forced they share the WebVPN's jar, which
    /// already holds an SSO session from the tunnel's own login.
    pub async fn send(
        &self,
        direct: &dyn Transport,
        request: HttpRequest,
    ) -> Result<HttpResponse, AuthError> {
        let mode = self.state.mode();
        let sso = self.tunnel.cas().serves(&request.url);
        let enrolled = self.reaches_enrolled(&request.url, sso);

        if !enrolled && !(sso && mode == ProxyMode::TunnelForced) {
            let url = request.url.clone();
            return direct
                .execute(request)
                .await
                .map_err(|e| Self::unenrolled_error(&url, e));
        }

        if mode == ProxyMode::DirectPreferred {
            let timeout = request
                .timeout
                .map_or(self.direct_timeout, |t| t.min(self.direct_timeout));
            match direct.execute(request.clone().with_timeout(timeout)).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() => {
                    warn!(url = %request.url, "Direct connection timed out, switching to WebVPN");
                    self.state.force_tunnel();
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.send_tunneled(request, sso).await
    }

    /// `url` is enrolled, or is an authserver page whose `service` is
    fn reaches_enrolled(&self, url: &Url, sso: bool) -> bool {
        if self.translator.is_enrolled(url) {
            return true;
        }
        sso && service_of(url).is_some_and(|service| self.translator.is_enrolled(&service))
    }

    async fn send_tunneled(&self, request: HttpRequest, sso: bool) -> Result<HttpResponse, AuthError> {
        let original = request.url.clone();
        let rewritten = if sso {
            self.tunnel_service(request)
        } else {
            self.translator.rewrite(request)
        };
        debug!(from = %original, to = %rewritten.url, "Tunnelling request");

        let mut response = self.tunnel.send(rewritten).await?;
        if let Some(url) = self.translator.restore(&response.url) {
            response.url = url;
        }
        Ok(response)
    }

    /// Point an authserver request's `service` at the tunnelled address so
    /// the ticket is redeemed through the WebVPN.
    fn tunnel_service(&self, mut request: HttpRequest) -> HttpRequest {
        if request.url.query().is_none() {
            return request;
        }
        let pairs: Vec<(String, String)> = request
            .url
            .query_pairs()
            .map(|(name, value)| {
                let value = match name.as_ref() {
                    "service" => Url::parse(&value)
                        .ok()
                        .and_then(|service| self.translator.tunnel_url(&service))
                        .map(String::from)
                        .unwrap_or_else(|| value.into_owned()),
                    _ => value.into_owned(),
                };
                (name.into_owned(), value)
            })
            .collect();
        request.url.query_pairs_mut().clear().extend_pairs(pairs);
        request
    }

    fn unenrolled_error(url: &Url, err: TransportError) -> AuthError {
        if err.is_timeout() {
            AuthError::CampusOnly(format!("{} is not reachable and not tunnelled", url))
        } else {
            err.into()
        }
    }
}

fn service_of(url: &Url) -> Option<Url> {
    url.query_pairs()
        .find(|(name, _)| name == "service")
        .and_then(|(_, value)| Url::parse(&value).ok())
}

/// An authenticator's view of the network: its own jar, routed through the
/// shared coordinator.
pub struct ProxiedChannel {
    transport: Arc<dyn Transport>,
    coordinator: Arc<ProxyCoordinator>,
}

impl ProxiedChannel {
    pub fn new(transport: Arc<dyn Transport>, coordinator: Arc<ProxyCoordinator>) -> Self {
        Self {
            transport,
            coordinator,
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

#[async_trait]
impl Fetch for ProxiedChannel {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        self.coordinator.send(self.transport.as_ref(), request).await
    }
}
