use async_trait::async_trait;
use url::Url;

use super::{AuthError, Credential};
use crate::http::{Fetch, HttpResponse};

/// One flavor of campus login.
///
/// An `Authenticator` drives a flow through the probe / handshake /
/// retry-once cycle; the flow only knows its own protocol.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// URL whose response is the target data when the session is valid, and a
    /// login page otherwise.
    fn probe(&self, target: &Url) -> Url;

    /// Whether a probe response shows the session is not authenticated
    fn needs_login(&self, response: &HttpResponse) -> bool;

    /// Page a person can open to log in by hand
    fn manual_login_url(&self, target: &Url) -> Url;

    /// Run the handshake, leaving session cookies in the jar behind `http`.
    async fn login(&self, http: &dyn Fetch, credential: &Credential) -> Result<(), AuthError>;
}
