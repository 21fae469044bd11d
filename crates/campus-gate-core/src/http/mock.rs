//! Recording transport for tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use url::Url;

use super::transport::{HttpRequest, HttpResponse, Transport, TransportError};

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;
type ClearHook = dyn Fn() + Send + Sync;

/// Answers every request with a caller-supplied handler and records it.
///
/// A response carrying `Set-Cookie` stores a cookie for the requested host and
/// the final host, which is what `has_cookies` reports.
pub(crate) struct MockTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<HttpRequest>>,
    cookie_hosts: Mutex<HashSet<String>>,
    clears: Mutex<usize>,
    on_clear: Option<Box<ClearHook>>,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            cookie_hosts: Mutex::new(HashSet::new()),
            clears: Mutex::new(0),
            on_clear: None,
        }
    }

    /// Run `hook` whenever the jar is cleared, so a fake server can forget
    /// the session it handed out.
    pub fn on_clear<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_clear = Some(Box::new(hook));
        self
    }

    pub fn clear_count(&self) -> usize {
        *self.clears.lock().unwrap()
    }

    /// A transport that fails every request; used to assert zero network use.
    pub fn offline() -> Self {
        Self::new(|request| Err(TransportError::Connect(format!("offline: {}", request.url))))
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of recorded requests with this method whose path ends with `suffix`
    pub fn count(&self, method: Method, suffix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url.path().ends_with(suffix))
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        // Yield so concurrent callers interleave like they would on the network
        tokio::task::yield_now().await;

        let response = (self.handler)(&request)?;
        if response.headers.contains_key(header::SET_COOKIE) {
            // Both ends of the redirect chain set cookies (CASTGC, JSESSIONID)
            let mut hosts = self.cookie_hosts.lock().unwrap();
            for url in [&request.url, &response.url] {
                if let Some(host) = url.host_str() {
                    hosts.insert(host.to_string());
                }
            }
        }
        Ok(response)
    }

    async fn clear_cookies(&self) -> Result<(), TransportError> {
        self.cookie_hosts.lock().unwrap().clear();
        *self.clears.lock().unwrap() += 1;
        if let Some(hook) = &self.on_clear {
            hook();
        }
        Ok(())
    }

    async fn has_cookies(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| self.cookie_hosts.lock().unwrap().contains(host))
            .unwrap_or(false)
    }
}

/// A 200 response whose redirect chain ended at `url`
pub(crate) fn page(url: &str, body: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status: StatusCode::OK,
        url: Url::parse(url).unwrap(),
        headers: HeaderMap::new(),
        body: body.as_bytes().to_vec(),
    })
}

/// Like `page`, but also sets a session cookie for the landing host
pub(crate) fn page_with_cookie(url: &str, body: &str) -> Result<HttpResponse, TransportError> {
    let mut response = page(url, body)?;
    response.headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_static("JSESSIONID=mock; Path=/"),
    );
    Ok(response)
}

pub(crate) fn timeout(request: &HttpRequest) -> Result<HttpResponse, TransportError> {
    Err(TransportError::Timeout(request.url.to_string()))
}

/// Query parameter lookup for handler matching
pub(crate) fn query(request: &HttpRequest, name: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Form field lookup in a recorded URL-encoded body
pub(crate) fn form_field(request: &HttpRequest, name: &str) -> Option<String> {
    let body = request.body.as_deref()?;
    url::form_urlencoded::parse(body)
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
