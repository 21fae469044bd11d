//! Form login for services that predate CAS (sports, wallet).
//!
//! These keep their own cookie session on their own host; a CAS session is of
//! no use to them and vice versa.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::flow::LoginFlow;
use super::{AuthError, Credential};
use crate::config::LegacyConfig;
use crate::http::{Fetch, HttpRequest, HttpResponse};
use crate::utils::hidden_inputs;

#[derive(Debug, Clone)]
pub struct LegacyLogin {
    config: LegacyConfig,
}

impl LegacyLogin {
    pub fn new(config: LegacyConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LoginFlow for LegacyLogin {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn probe(&self, target: &Url) -> Url {
        target.clone()
    }

    fn needs_login(&self, response: &HttpResponse) -> bool {
        response.landed_on(&self.config.login_url)
    }

    fn manual_login_url(&self, _target: &Url) -> Url {
        self.config.login_url.clone()
    }

    async fn login(&self, http: &dyn Fetch, credential: &Credential) -> Result<(), AuthError> {
        let login_url = &self.config.login_url;

        let page = http.fetch(HttpRequest::get(login_url.clone())).await?;
        let hidden = hidden_inputs(&page.text());
        debug!(service = %self.config.name, fields = hidden.len(), "Scraped legacy login form");

        let mut form = vec![
            (self.config.username_field.clone(), credential.username.clone()),
            (self.config.password_field.clone(), credential.password.clone()),
        ];
        form.extend(hidden);

        let response = http
            .fetch(HttpRequest::post_form(login_url.clone(), &form))
            .await?;
        if response.landed_on(login_url) {
            warn!(service = %self.config.name, username = %credential.username, "Legacy login rejected");
            return Err(AuthError::LoginFailed(format!(
                "{} login page was shown again",
                self.config.name
            )));
        }

        info!(service = %self.config.name, username = %credential.username, "Legacy login succeeded");
        Ok(())
    }
}
