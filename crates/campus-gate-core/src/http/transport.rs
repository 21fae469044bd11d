use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::auth::AuthError;
use crate::utils::url::same_page;

/// An owned HTTP request.
///
/// Kept as plain data so the proxy translator can rewrite the URL while the
/// method, headers, body and timeout travel through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Per-request timeout overriding the transport default
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Build a POST with an `application/x-www-form-urlencoded` body
    pub fn post_form<K, V>(url: Url, fields: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
            .finish();

        let mut request = Self::new(Method::POST, url);
        request.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        request.body = Some(body.into_bytes());
        request
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// A body-less GET, whose authenticated probe response is the data itself.
    pub fn is_plain_get(&self) -> bool {
        self.method == Method::GET && self.body.is_none()
    }
}

/// A fully-read HTTP response, after redirects were followed.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// Final URL after the redirect chain
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Whether the redirect chain ended on the given page
    pub fn landed_on(&self, page: &Url) -> bool {
        same_page(&self.url, page)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// The network seam. Each instance owns exactly one cookie jar.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request, following redirects, and read the whole body.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Drop every cookie held by this transport.
    async fn clear_cookies(&self) -> Result<(), TransportError>;

    /// Whether the jar would send any cookie to `url`.
    async fn has_cookies(&self, url: &Url) -> bool;
}

/// Anything that can carry a request and report failures in auth terms.
///
/// Login flows are written against this so the same CAS handshake runs over
/// the proxy-aware channel of an authenticator and over the raw WebVPN jar.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, AuthError>;
}

/// Sends straight through a transport, bypassing the proxy coordinator.
pub struct Direct<'a>(pub &'a dyn Transport);

#[async_trait]
impl Fetch for Direct<'_> {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        Ok(self.0.execute(request).await?)
    }
}
