//! Reaching campus-only hosts from off campus.
//!
//! Requests go direct first. Once a direct attempt to an enrolled host times
//! out, everything enrolled is rewritten onto the WebVPN until re-probed.

pub mod coordinator;
pub mod tunnel;
pub mod webvpn;

pub use coordinator::{ProxiedChannel, ProxyCoordinator, ProxyMode, ProxyState};
pub use tunnel::WebVpnSession;
pub use webvpn::WebVpnTranslator;
