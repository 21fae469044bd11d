//! CAS handshake against the campus authserver.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::flow::LoginFlow;
use super::{AuthError, Credential, StudentType};
use crate::config::SsoConfig;
use crate::http::{Fetch, HttpRequest, HttpResponse};
use crate::utils::{endpoint, hidden_inputs, same_host};

const LOGIN_PATH: &str = "authserver/login";
const CAPTCHA_PATH: &str = "authserver/needCaptcha.html";
const TICKET_EXCHANGE_PATH: &str = "idp/authCenter/authenticate";

/// The captcha probe answers with exactly this body when none is required
const NO_CAPTCHA: &str = "false";

#[derive(Debug, Clone)]
pub struct CasLogin {
    config: SsoConfig,
}

impl CasLogin {
    pub fn new(config: SsoConfig) -> Self {
        Self { config }
    }

    pub fn login_url(&self, service: &Url) -> Url {
        endpoint(&self.config.base_url, LOGIN_PATH, &[("service", service.as_str())])
    }

    fn captcha_url(&self, username: &str) -> Url {
        endpoint(&self.config.base_url, CAPTCHA_PATH, &[("username", username)])
    }

    pub fn ticket_exchange_url(&self, service: &Url) -> Url {
        endpoint(&self.config.base_url, TICKET_EXCHANGE_PATH, &[("service", service.as_str())])
    }

    /// Landing page a successful login redirects to for this student type
    pub fn landing_for(&self, student_type: StudentType) -> &Url {
        match (student_type, &self.config.graduate_landing_url) {
            (StudentType::Graduate, Some(url)) => url,
            _ => &self.config.landing_url,
        }
    }

    /// Log in on behalf of `service` rather than the portal.
    ///
    /// Succeeds once the authserver lets go of the browser, which is where
    /// `service` redeems its ticket. Returns the page it ended on.
    pub async fn login_for_service(
        &self,
        http: &dyn Fetch,
        credential: &Credential,
        service: &Url,
    ) -> Result<HttpResponse, AuthError> {
        let response = self.submit(http, credential, service).await?;
        if self.serves(&response.url) {
            warn!(username = %credential.username, service = %service, "CAS login rejected");
            return Err(AuthError::LoginFailed(format!(
                "authserver kept the login for {} on {}",
                service, response.url
            )));
        }
        info!(username = %credential.username, service = %service, "CAS login succeeded");
        Ok(response)
    }

    /// Captcha check, fresh form scrape and the credential POST
    async fn submit(
        &self,
        http: &dyn Fetch,
        credential: &Credential,
        service: &Url,
    ) -> Result<HttpResponse, AuthError> {
        let captcha = http
            .fetch(HttpRequest::get(self.captcha_url(&credential.username)))
            .await?;
        if captcha.text().trim() != NO_CAPTCHA {
            warn!(username = %credential.username, "SSO requires a captcha");
            return Err(AuthError::NeedsCaptcha {
                manual_login_url: self.login_url(service),
            });
        }

        // The form carries per-request tokens; scrape it fresh on every attempt
        let login_url = self.login_url(service);
        let page = http.fetch(HttpRequest::get(login_url.clone())).await?;
        let body = page.text();
        let hidden: Vec<(String, String)> = hidden_inputs(&body)
            .into_iter()
            .filter(|(name, _)| name != "username" && name != "password")
            .collect();
        if hidden.is_empty() {
            return Err(AuthError::invalid_response("CAS login page has no form tokens", &body));
        }
        debug!(fields = hidden.len(), "Scraped CAS login form");

        let mut form = Vec::with_capacity(hidden.len() + 2);
        form.push(("username".to_string(), credential.username.clone()));
        form.push(("password".to_string(), credential.password.clone()));
        form.extend(hidden);

        http.fetch(HttpRequest::post_form(login_url, &form)).await
    }

    /// Whether `url` is served by the authserver
    pub fn serves(&self, url: &Url) -> bool {
        same_host(url, &self.config.base_url)
    }

    /// Whether `url` is the authserver login form itself
    pub fn is_login_page(&self, url: &Url) -> bool {
        same_host(url, &self.config.base_url)
            && url.path().trim_end_matches('/').ends_with(LOGIN_PATH)
    }
}

#[async_trait]
impl LoginFlow for CasLogin {
    fn name(&self) -> &str {
        "cas"
    }

    fn probe(&self, target: &Url) -> Url {
        self.login_url(target)
    }

    fn needs_login(&self, response: &HttpResponse) -> bool {
        self.serves(&response.url)
    }

    fn manual_login_url(&self, target: &Url) -> Url {
        self.login_url(target)
    }

    async fn login(&self, http: &dyn Fetch, credential: &Credential) -> Result<(), AuthError> {
        let landing = self.landing_for(credential.student_type);
        let response = self.submit(http, credential, landing).await?;
        if response.landed_on(landing) {
            info!(username = %credential.username, "CAS login succeeded");
            Ok(())
        } else {
            warn!(username = %credential.username, landed = %response.url, "CAS login rejected");
            Err(AuthError::LoginFailed(format!(
                "expected to land on {}, landed on {}",
                landing, response.url
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use reqwest::Method;

    use super::*;
    use crate::http::mock::{form_field, page, page_with_cookie, query, MockTransport};
    use crate::http::{Direct, Transport};

    const SSO: &str = "https://authserver.campus.edu";
    const LANDING: &str = "https://portal.campus.edu/index.html";

    fn cas() -> CasLogin {
        CasLogin::new(SsoConfig {
            base_url: Url::parse(SSO).unwrap(),
            landing_url: Url::parse(LANDING).unwrap(),
            graduate_landing_url: Some(Url::parse("https://yjs.campus.edu/home").unwrap()),
        })
    }

    fn credential(password: &str) -> Credential {
        Credential {
            username: "2021001".to_string(),
            password: password.to_string(),
            student_type: StudentType::Undergraduate,
        }
    }

    fn login_form(lt: &str) -> String {
        format!(
            r#"<form id="casLoginForm">
                 <input name="username" type="text"/>
                 <input type="hidden" name="lt" value="{}"/>
                 <input type="hidden" name="execution" value="e1s1"/>
                 <input type="hidden" name="_eventId" value="submit"/>
               </form>"#,
            lt
        )
    }

    /// Authserver that accepts `hunter2` and hands out a new `lt` per page load
    fn authserver(captcha: &'static str) -> MockTransport {
        let page_loads = AtomicUsize::new(0);
        MockTransport::new(move |request| {
            let path = request.url.path();
            if path.ends_with("needCaptcha.html") {
                return page(request.url.as_str(), captcha);
            }
            if path.ends_with("authserver/login") && request.method == Method::GET {
                let n = page_loads.fetch_add(1, Ordering::SeqCst) + 1;
                return page(request.url.as_str(), &login_form(&format!("LT-{}", n)));
            }
            if path.ends_with("authserver/login") && request.method == Method::POST {
                let expected_lt = format!("LT-{}", page_loads.load(Ordering::SeqCst));
                let ok = form_field(request, "password").as_deref() == Some("hunter2")
                    && form_field(request, "lt") == Some(expected_lt);
                return if ok {
                    page_with_cookie(&query(request, "service").unwrap(), "welcome")
                } else {
                    page(request.url.as_str(), &login_form("LT-retry"))
                };
            }
            page(request.url.as_str(), "not found")
        })
    }

    #[tokio::test]
    async fn test_login_success_sets_sso_cookies() {
        let transport = authserver("false");
        cas().login(&Direct(&transport), &credential("hunter2")).await.unwrap();

        let posts = transport.calls().into_iter().filter(|r| r.method == Method::POST).collect::<Vec<_>>();
        assert_eq!(posts.len(), 1);
        assert_eq!(form_field(&posts[0], "username").as_deref(), Some("2021001"));
        assert_eq!(form_field(&posts[0], "execution").as_deref(), Some("e1s1"));
        assert_eq!(form_field(&posts[0], "_eventId").as_deref(), Some("submit"));
        assert!(transport.has_cookies(&Url::parse(SSO).unwrap()).await);
        assert!(transport.has_cookies(&Url::parse(LANDING).unwrap()).await);
    }

    #[tokio::test]
    async fn test_wrong_password_is_login_failed() {
        let transport = authserver("false");
        let err = cas().login(&Direct(&transport), &credential("wrong")).await.unwrap_err();
        assert!(matches!(err, AuthError::LoginFailed(_)));
    }

    #[tokio::test]
    async fn test_captcha_aborts_before_post() {
        let transport = authserver("true");
        let err = cas().login(&Direct(&transport), &credential("hunter2")).await.unwrap_err();

        assert!(matches!(err, AuthError::NeedsCaptcha { .. }));
        assert_eq!(transport.count(Method::POST, "authserver/login"), 0);
        assert_eq!(transport.count(Method::GET, "authserver/login"), 0);
    }

    #[tokio::test]
    async fn test_hidden_fields_rescraped_per_attempt() {
        let transport = authserver("false");
        let login = cas();
        login.login(&Direct(&transport), &credential("hunter2")).await.unwrap();
        login.login(&Direct(&transport), &credential("hunter2")).await.unwrap();

        let lts: Vec<String> = transport
            .calls()
            .iter()
            .filter(|r| r.method == Method::POST)
            .filter_map(|r| form_field(r, "lt"))
            .collect();
        assert_eq!(lts, vec!["LT-1".to_string(), "LT-2".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_form_is_invalid_response() {
        let transport = MockTransport::new(|request| {
            if request.url.path().ends_with("needCaptcha.html") {
                page(request.url.as_str(), "false")
            } else {
                page(request.url.as_str(), "<html>maintenance</html>")
            }
        });
        let err = cas().login(&Direct(&transport), &credential("hunter2")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_graduate_lands_on_graduate_portal() {
        let transport = authserver("false");
        let mut graduate = credential("hunter2");
        graduate.student_type = StudentType::Graduate;
        cas().login(&Direct(&transport), &graduate).await.unwrap();

        let post = transport.calls().into_iter().find(|r| r.method == Method::POST).unwrap();
        assert_eq!(query(&post, "service").as_deref(), Some("https://yjs.campus.edu/home"));
    }

    #[tokio::test]
    async fn test_service_login_posts_for_that_service() {
        let transport = authserver("false");
        let webvpn = Url::parse("https://webvpn.campus.edu/login").unwrap();
        let landed = cas()
            .login_for_service(&Direct(&transport), &credential("hunter2"), &webvpn)
            .await
            .unwrap();

        assert_eq!(landed.url, webvpn);
        let post = transport.calls().into_iter().find(|r| r.method == Method::POST).unwrap();
        assert_eq!(query(&post, "service").as_deref(), Some("https://webvpn.campus.edu/login"));

        let err = cas()
            .login_for_service(&Direct(&transport), &credential("wrong"), &webvpn)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::LoginFailed(_)));
    }

    #[test]
    fn test_urls() {
        let login = cas();
        let target = Url::parse("https://jwc.campus.edu/grades?term=2024").unwrap();
        assert_eq!(
            login.login_url(&target).as_str(),
            "https://authserver.campus.edu/authserver/login?service=https%3A%2F%2Fjwc.campus.edu%2Fgrades%3Fterm%3D2024"
        );
        assert_eq!(
            login.captcha_url("2021001").as_str(),
            "https://authserver.campus.edu/authserver/needCaptcha.html?username=2021001"
        );
        assert!(login
            .ticket_exchange_url(&target)
            .as_str()
            .starts_with("https://authserver.campus.edu/idp/authCenter/authenticate?service="));
        assert!(login.is_login_page(&login.login_url(&target)));
        assert!(!login.is_login_page(&login.ticket_exchange_url(&target)));
    }
}
