//! Campus URL <-> WebVPN tunnel URL translation.
//!
//! The WebVPN appliance exposes an internal service at
//! `<webvpn>/<scheme>[-<port>]/<token>/<path>`, where the token is an opaque
//! per-host string. Only hosts listed in the route table are ever tunnelled.

use std::collections::HashMap;

use url::Url;

use crate::config::{ProxyRoute, RouteScheme, WebVpnConfig};
use crate::http::HttpRequest;
use crate::utils::{endpoint, same_host};

const LOGIN_PATH: &str = "login";

#[derive(Debug, Clone)]
pub struct WebVpnTranslator {
    base_url: Url,
    /// Keyed by lowercase host
    by_host: HashMap<String, ProxyRoute>,
    by_token: HashMap<String, ProxyRoute>,
}

impl WebVpnTranslator {
    pub fn new(base_url: Url, routes: Vec<ProxyRoute>) -> Self {
        let by_host = routes
            .iter()
            .map(|r| (r.host.to_ascii_lowercase(), r.clone()))
            .collect();
        let by_token = routes.into_iter().map(|r| (r.token.clone(), r)).collect();
        Self {
            base_url,
            by_host,
            by_token,
        }
    }

    pub fn from_config(config: &WebVpnConfig) -> Self {
        Self::new(config.base_url.clone(), config.routes.clone())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn route_for(&self, url: &Url) -> Option<&ProxyRoute> {
        let host = url.host_str()?.to_ascii_lowercase();
        self.by_host.get(&host)
    }

    pub fn is_enrolled(&self, url: &Url) -> bool {
        self.route_for(url).is_some()
    }

    /// Tunnel equivalent of a campus URL, or `None` for unenrolled hosts
    pub fn tunnel_url(&self, url: &Url) -> Option<Url> {
        let route = self.route_for(url)?;
        let tag = match url.port() {
            Some(port) => format!("{}-{}", route.scheme.tag(), port),
            None => route.scheme.tag().to_string(),
        };

        let mut tunneled = self.base_url.clone();
        tunneled.set_path(&format!("/{}/{}{}", tag, route.token, url.path()));
        tunneled.set_query(url.query());
        tunneled.set_fragment(url.fragment());
        Some(tunneled)
    }

    /// Rewrite an enrolled request onto the tunnel. Everything except the URL
    /// is carried over verbatim; unenrolled requests come back untouched.
    pub fn rewrite(&self, request: HttpRequest) -> HttpRequest {
        match self.tunnel_url(&request.url) {
            Some(url) => HttpRequest { url, ..request },
            None => request,
        }
    }

    /// Campus URL behind a tunnel URL, when the token is known
    pub fn restore(&self, url: &Url) -> Option<Url> {
        if !same_host(url, &self.base_url) {
            return None;
        }

        let mut parts = url.path().trim_start_matches('/').splitn(3, '/');
        let tag = parts.next()?;
        let token = parts.next()?;
        let rest = parts.next().unwrap_or("");

        let (scheme_tag, port) = match tag.split_once('-') {
            Some((scheme, port)) => (scheme, Some(port.parse::<u16>().ok()?)),
            None => (tag, None),
        };
        let scheme = RouteScheme::from_tag(scheme_tag)?;
        let route = self.by_token.get(token)?;

        let authority = match port {
            Some(port) => format!("{}:{}", route.host, port),
            None => route.host.clone(),
        };
        let mut restored = Url::parse(&format!("{}://{}/{}", scheme.tag(), authority, rest)).ok()?;
        restored.set_query(url.query());
        restored.set_fragment(url.fragment());
        Some(restored)
    }

    pub fn login_url(&self) -> Url {
        endpoint(&self.base_url, LOGIN_PATH, &[])
    }

    /// Where a CAS ticket is redeemed for a WebVPN session
    pub fn ticket_login_url(&self, ticket: &str) -> Url {
        endpoint(
            &self.base_url,
            LOGIN_PATH,
            &[("cas_login", "true"), ("ticket", ticket)],
        )
    }

    pub fn is_login_page(&self, url: &Url) -> bool {
        same_host(url, &self.base_url) && url.path().trim_end_matches('/') == self.login_url().path()
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderValue, ACCEPT, COOKIE};
    use reqwest::Method;

    use super::*;

    fn translator() -> WebVpnTranslator {
        WebVpnTranslator::new(
            Url::parse("https://webvpn.campus.edu/").unwrap(),
            vec![
                ProxyRoute {
                    host: "jwc.campus.edu".to_string(),
                    scheme: RouteScheme::Https,
                    token: "77726476706e6973".to_string(),
                },
                ProxyRoute {
                    host: "classroom.campus.edu".to_string(),
                    scheme: RouteScheme::Http,
                    token: "f3f652d2253e7d1e".to_string(),
                },
            ],
        )
    }

    fn request(method: Method, url: &str) -> HttpRequest {
        let mut request = HttpRequest::new(method, Url::parse(url).unwrap());
        request.headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        request.headers.insert(COOKIE, HeaderValue::from_static("a=b"));
        request.body = Some(b"term=2024-1".to_vec());
        request
    }

    #[test]
    fn test_unenrolled_request_is_unchanged() {
        let t = translator();
        for url in [
            "https://library.campus.edu/search?q=rust",
            "http://bbs.campus.edu/",
            "https://jwc.campus.edu.evil.com/grades",
        ] {
            let original = request(Method::POST, url);
            assert_eq!(t.rewrite(original.clone()), original);
        }
    }

    #[test]
    fn test_enrolled_request_only_changes_url() {
        let t = translator();
        let original = request(Method::POST, "https://jwc.campus.edu/student/grades?term=1#top");
        let rewritten = t.rewrite(original.clone());

        assert_eq!(
            rewritten.url.as_str(),
            "https://webvpn.campus.edu/https/77726476706e6973/student/grades?term=1#top"
        );
        assert_eq!(rewritten.method, original.method);
        assert_eq!(rewritten.headers, original.headers);
        assert_eq!(rewritten.body, original.body);
        assert_eq!(rewritten.timeout, original.timeout);
    }

    #[test]
    fn test_host_match_is_case_insensitive() {
        let url = Url::parse("https://JWC.campus.edu/").unwrap();
        assert!(translator().is_enrolled(&url));
    }

    #[test]
    fn test_http_route_and_port_tag() {
        let t = translator();
        let url = Url::parse("http://classroom.campus.edu:8080/rooms/A101").unwrap();
        assert_eq!(
            t.tunnel_url(&url).unwrap().as_str(),
            "https://webvpn.campus.edu/http-8080/f3f652d2253e7d1e/rooms/A101"
        );
    }

    #[test]
    fn test_restore_inverts_tunnel_url() {
        let t = translator();
        for original in [
            "https://jwc.campus.edu/student/grades?term=1",
            "http://classroom.campus.edu:8080/rooms/A101",
            "https://jwc.campus.edu/",
        ] {
            let url = Url::parse(original).unwrap();
            let tunneled = t.tunnel_url(&url).unwrap();
            assert_eq!(t.restore(&tunneled), Some(url));
        }
    }

    #[test]
    fn test_restore_rejects_foreign_urls() {
        let t = translator();
        assert_eq!(t.restore(&Url::parse("https://jwc.campus.edu/https/x/").unwrap()), None);
        assert_eq!(t.restore(&Url::parse("https://webvpn.campus.edu/https/unknown/a").unwrap()), None);
        assert_eq!(t.restore(&Url::parse("https://webvpn.campus.edu/login").unwrap()), None);
    }

    #[test]
    fn test_login_page_detection() {
        let t = translator();
        assert!(t.is_login_page(&t.login_url()));
        assert!(t.is_login_page(&t.ticket_login_url("ST-1")));
        assert!(!t.is_login_page(&Url::parse("https://webvpn.campus.edu/").unwrap()));
        assert!(!t.is_login_page(&Url::parse("https://jwc.campus.edu/login").unwrap()));
    }

    #[test]
    fn test_ticket_login_url() {
        assert_eq!(
            translator().ticket_login_url("ST-42-abc").as_str(),
            "https://webvpn.campus.edu/login?cas_login=true&ticket=ST-42-abc"
        );
    }
}
