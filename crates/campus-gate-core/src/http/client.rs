//! reqwest-backed transport with a private, resettable cookie jar.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::redirect::Policy;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use super::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Maximum redirects followed per request.
/// CAS login chains are 3-4 hops; WebVPN can add one more per hop.
const MAX_REDIRECTS: usize = 10;

/// Campus servers serve a reduced page to unknown clients.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

struct ClientState {
    client: Client,
    jar: Arc<Jar>,
}

/// Production transport.
/// Clearing cookies swaps in a fresh client and jar; in-flight requests keep
/// the old pair until they finish.
pub struct ReqwestTransport {
    state: RwLock<ClientState>,
    request_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            state: RwLock::new(Self::build(request_timeout)?),
            request_timeout,
        })
    }

    fn build(request_timeout: Duration) -> Result<ClientState> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ClientState { client, jar })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        // Cheap clone, shares the connection pool
        let client = self.state.read().await.client.clone();

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(
            method = %request.method,
            url = %request.url,
            final_url = %url,
            status = status.as_u16(),
            bytes = body.len(),
            "HTTP exchange complete"
        );

        Ok(HttpResponse {
            status,
            url,
            headers,
            body,
        })
    }

    async fn clear_cookies(&self) -> Result<(), TransportError> {
        let fresh = Self::build(self.request_timeout)
            .map_err(|e| TransportError::Other(format!("{:#}", e)))?;
        *self.state.write().await = fresh;
        debug!("Cookie jar cleared");
        Ok(())
    }

    async fn has_cookies(&self, url: &Url) -> bool {
        self.state.read().await.jar.cookies(url).is_some()
    }
}
