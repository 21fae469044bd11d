//! Credentials, login flows and the authenticated-fetch façade.
//!
//! Every authenticator variant owns its own cookie jar and session record but
//! shares the credential store and the proxy coordinator.

pub mod authenticator;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod legacy;
pub mod session;
pub mod sso;
pub mod vault;

pub use authenticator::Authenticator;
pub use credentials::{
    Credential, CredentialStore, KeyringBackend, MemoryBackend, SecretBackend, StudentType,
};
pub use error::AuthError;
pub use flow::LoginFlow;
pub use legacy::LegacyLogin;
pub use session::{FailedLogin, SessionState};
pub use sso::CasLogin;
pub use vault::EncryptedFileBackend;
