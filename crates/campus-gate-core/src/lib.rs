//! Campus SSO authentication, session and network-access proxy core.
//!
//! This crate provides the "authenticated fetch" primitive used by every
//! campus feature module:
//!
//! - `auth`: credential storage, the CAS and legacy login flows, and the
//!   `Authenticator` façade
//! - `proxy`: WebVPN URL translation and the direct/tunnel coordinator
//! - `sync`: the counting semaphore that serializes login handshakes
//! - `cache`: single-flight cache actors with optional disk persistence
//! - `services`: the container that wires everything together once at startup

pub mod auth;
pub mod cache;
pub mod config;
pub mod http;
pub mod proxy;
pub mod services;
pub mod sync;
pub mod utils;

pub use auth::{AuthError, Authenticator, Credential, CredentialStore, StudentType};
pub use config::Config;
pub use http::{HttpRequest, HttpResponse};
pub use services::CampusServices;
