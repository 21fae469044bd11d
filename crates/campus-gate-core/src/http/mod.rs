//! HTTP plumbing shared by every authenticator variant.
//!
//! This module provides:
//! - `HttpRequest` / `HttpResponse`: owned request/response values that can be
//!   rewritten by the WebVPN translator and replayed after a login
//! - `Transport`: the seam between the auth logic and the network, one
//!   instance (and therefore one cookie jar) per authenticator variant
//! - `ReqwestTransport`: the production transport

pub mod client;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use client::ReqwestTransport;
pub use transport::{Direct, Fetch, HttpRequest, HttpResponse, Transport, TransportError};
