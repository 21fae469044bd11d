//! Subsystem configuration management.
//!
//! This module handles loading and saving the configuration, which names the
//! SSO host and landing pages, the WebVPN route table, the optional legacy
//! form login, network timeouts and where credentials are kept.
//!
//! Configuration is stored at `~/.config/campus-gate/config.json`. A missing
//! file yields the built-in campus defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Application name used for config/data directory paths
const APP_NAME: &str = "campus-gate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default overall request timeout.
/// Campus servers are slow at term start; 30s avoids spurious failures.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for the first direct attempt before tunnelling.
/// On-campus round trips are well under a second.
const DEFAULT_DIRECT_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub sso: SsoConfig,
    pub webvpn: WebVpnConfig,
    pub legacy: Option<LegacyConfig>,
    pub network: NetworkConfig,
    pub storage: CredentialStorage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SsoConfig {
    /// Root of the CAS server, e.g. `https://authserver.campus.edu/`
    pub base_url: Url,
    /// Page a successful login redirects to
    pub landing_url: Url,
    /// Landing page for graduate students, when it differs
    #[serde(default)]
    pub graduate_landing_url: Option<Url>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebVpnConfig {
    pub base_url: Url,
    /// Hosts enrolled for tunnelling. Anything not listed is never proxied.
    #[serde(default)]
    pub routes: Vec<ProxyRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyRoute {
    pub host: String,
    pub scheme: RouteScheme,
    /// Opaque per-host path segment issued by the WebVPN appliance
    pub token: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RouteScheme {
    Https,
    Http,
}

impl RouteScheme {
    pub fn tag(self) -> &'static str {
        match self {
            RouteScheme::Https => "https",
            RouteScheme::Http => "http",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "https" => Some(RouteScheme::Https),
            "http" => Some(RouteScheme::Http),
            _ => None,
        }
    }
}

/// Form-based login used by services outside CAS (sports, wallet)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacyConfig {
    pub name: String,
    pub login_url: Url,
    pub username_field: String,
    pub password_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub direct_timeout_ms: u64,
    /// Return to direct connections this long after tunnelling was forced.
    /// Unset keeps the tunnel for the rest of the process lifetime.
    pub tunnel_reprobe_secs: Option<u64>,
    /// Concurrent login handshakes allowed per authenticator variant
    pub login_concurrency: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            direct_timeout_ms: DEFAULT_DIRECT_TIMEOUT_MS,
            tunnel_reprobe_secs: None,
            login_concurrency: 1,
        }
    }
}

impl NetworkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn direct_timeout(&self) -> Duration {
        Duration::from_millis(self.direct_timeout_ms)
    }

    pub fn tunnel_reprobe(&self) -> Option<Duration> {
        self.tunnel_reprobe_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialStorage {
    /// OS keychain
    #[default]
    Keyring,
    /// ChaCha20-Poly1305 sealed file; defaults to `<data_dir>/credential.bin`
    EncryptedFile { path: Option<PathBuf> },
    /// Not persisted
    Memory,
}

fn default_url(s: &str) -> Url {
    // Literal defaults below are well-formed
    Url::parse(s).unwrap_or_else(|e| panic!("invalid built-in URL {}: {}", s, e))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sso: SsoConfig {
                base_url: default_url("https://authserver.campus.edu/"),
                landing_url: default_url("https://portal.campus.edu/index.html"),
                graduate_landing_url: None,
            },
            webvpn: WebVpnConfig {
                base_url: default_url("https://webvpn.campus.edu/"),
                routes: vec![
                    ProxyRoute {
                        host: "jwc.campus.edu".to_string(),
                        scheme: RouteScheme::Https,
                        token: "77726476706e69737468656265737421fae0429e207e6b597d469dbf".to_string(),
                    },
                    ProxyRoute {
                        host: "classroom.campus.edu".to_string(),
                        scheme: RouteScheme::Http,
                        token: "77726476706e69737468656265737421f3f652d2253e7d1e7b0c9ce29b5b".to_string(),
                    },
                    ProxyRoute {
                        host: "bus.campus.edu".to_string(),
                        scheme: RouteScheme::Https,
                        token: "77726476706e69737468656265737421f2e2488b3c3e7b1e7b0c9ce29b5b".to_string(),
                    },
                ],
            },
            legacy: Some(LegacyConfig {
                name: "sports".to_string(),
                login_url: default_url("https://sports.campus.edu/login"),
                username_field: "userName".to_string(),
                password_field: "passWord".to_string(),
            }),
            network: NetworkConfig::default(),
            storage: CredentialStorage::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the sealed credential file and persisted caches
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Check semantic constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.network.login_concurrency == 0 {
            return Err(anyhow::anyhow!("network.login_concurrency must be at least 1"));
        }
        if self.network.direct_timeout_ms == 0 || self.network.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("network timeouts must be non-zero"));
        }
        if self.network.direct_timeout() >= self.network.request_timeout() {
            tracing::warn!(
                direct_ms = self.network.direct_timeout_ms,
                request_secs = self.network.request_timeout_secs,
                "Direct probe timeout is not shorter than the request timeout; tunnel fallback will be slow"
            );
        }

        for route in &self.webvpn.routes {
            if route.host.is_empty() || route.token.is_empty() {
                return Err(anyhow::anyhow!(
                    "webvpn route entries need both a host and a token"
                ));
            }
            if route.token.contains('/') {
                return Err(anyhow::anyhow!(
                    "webvpn token for {} must be a single path segment",
                    route.host
                ));
            }
        }
        let mut hosts: Vec<&str> = self.webvpn.routes.iter().map(|r| r.host.as_str()).collect();
        hosts.sort_unstable();
        if hosts.windows(2).any(|w| w[0].eq_ignore_ascii_case(w[1])) {
            return Err(anyhow::anyhow!("webvpn routes list the same host twice"));
        }

        if let Some(legacy) = &self.legacy {
            if legacy.username_field.is_empty() || legacy.password_field.is_empty() {
                return Err(anyhow::anyhow!(
                    "legacy login '{}' needs username and password field names",
                    legacy.name
                ));
            }
        }
        Ok(())
    }
}
