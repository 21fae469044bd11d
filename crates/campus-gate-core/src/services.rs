//! Everything a campus app needs, built once at startup.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{
    AuthError, Authenticator, CasLogin, CredentialStore, EncryptedFileBackend, LegacyLogin,
    StudentType,
};
use crate::cache::with_optional;
use crate::config::{Config, CredentialStorage};
use crate::http::{ReqwestTransport, Transport};
use crate::proxy::{ProxiedChannel, ProxyCoordinator, ProxyState, WebVpnSession, WebVpnTranslator};

const VAULT_FILE: &str = "credential.bin";

/// One cookie jar per authenticator variant plus the WebVPN's own
pub struct Transports {
    pub cas: Arc<dyn Transport>,
    pub legacy: Arc<dyn Transport>,
    pub webvpn: Arc<dyn Transport>,
}

impl Transports {
    pub fn reqwest(config: &Config) -> Result<Self> {
        let timeout = config.network.request_timeout();
        Ok(Self {
            cas: Arc::new(ReqwestTransport::new(timeout)?),
            legacy: Arc::new(ReqwestTransport::new(timeout)?),
            webvpn: Arc::new(ReqwestTransport::new(timeout)?),
        })
    }
}

pub struct CampusServices {
    config: Config,
    credentials: Arc<CredentialStore>,
    coordinator: Arc<ProxyCoordinator>,
    cas: Arc<Authenticator>,
    legacy: Option<Arc<Authenticator>>,
}

impl CampusServices {
    pub fn new(config: Config, credentials: Arc<CredentialStore>) -> Result<Self> {
        let transports = Transports::reqwest(&config)?;
        Ok(Self::with_transports(config, credentials, transports))
    }

    pub fn with_transports(
        config: Config,
        credentials: Arc<CredentialStore>,
        transports: Transports,
    ) -> Self {
        let concurrency = config.network.login_concurrency;
        let translator = Arc::new(WebVpnTranslator::from_config(&config.webvpn));
        let state = Arc::new(ProxyState::with_reprobe(config.network.tunnel_reprobe()));
        let tunnel = Arc::new(WebVpnSession::new(
            transports.webvpn,
            Arc::clone(&translator),
            CasLogin::new(config.sso.clone()),
            Arc::clone(&credentials),
            concurrency,
        ));
        let coordinator = Arc::new(ProxyCoordinator::new(
            translator,
            state,
            tunnel,
            config.network.direct_timeout(),
        ));

        let cas = Arc::new(Authenticator::new(
            Arc::new(CasLogin::new(config.sso.clone())),
            ProxiedChannel::new(transports.cas, Arc::clone(&coordinator)),
            Arc::clone(&credentials),
            concurrency,
        ));
        let legacy = config.legacy.clone().map(|legacy| {
            Arc::new(Authenticator::new(
                Arc::new(LegacyLogin::new(legacy)),
                ProxiedChannel::new(transports.legacy, Arc::clone(&coordinator)),
                Arc::clone(&credentials),
                concurrency,
            ))
        });

        debug!(legacy = legacy.is_some(), "Campus services initialized");
        Self {
            config,
            credentials,
            coordinator,
            cas,
            legacy,
        }
    }

    /// Credential store for the configured storage backend
    pub fn open_credential_store(config: &Config, vault_key: Option<String>) -> Result<CredentialStore> {
        match &config.storage {
            CredentialStorage::Keyring => Ok(CredentialStore::keyring()),
            CredentialStorage::Memory => Ok(CredentialStore::in_memory()),
            CredentialStorage::EncryptedFile { path } => {
                let key = vault_key.context("Encrypted credential storage needs a vault key")?;
                let path = match path {
                    Some(path) => path.clone(),
                    None => config.data_dir()?.join(VAULT_FILE),
                };
                Ok(CredentialStore::new(Box::new(EncryptedFileBackend::new(path, key))))
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn credentials(&self) -> Arc<CredentialStore> {
        Arc::clone(&self.credentials)
    }

    pub fn coordinator(&self) -> Arc<ProxyCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub fn cas(&self) -> Arc<Authenticator> {
        Arc::clone(&self.cas)
    }

    pub fn legacy(&self) -> Option<Arc<Authenticator>> {
        self.legacy.clone()
    }

    fn landing_url(&self, student_type: StudentType) -> Url {
        CasLogin::new(self.config.sso.clone())
            .landing_for(student_type)
            .clone()
    }

    /// Store a new credential and check it against the SSO server.
    ///
    /// A rejected password removes the credential again; a captcha or network
    /// problem keeps it so the user can retry.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        student_type: StudentType,
    ) -> Result<(), AuthError> {
        self.credentials.set(username, password, student_type);
        self.reset_sessions().await?;

        match self.cas.authenticate(&self.landing_url(student_type), None).await {
            Ok(_) => {
                info!(username = %username, "Logged in");
                Ok(())
            }
            Err(e @ AuthError::LoginFailed(_)) => {
                self.credentials.clear();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.credentials.clear();
        self.reset_sessions().await?;
        info!("Logged out of all campus services");
        Ok(())
    }

    async fn reset_sessions(&self) -> Result<(), AuthError> {
        self.cas.logout().await?;
        if let Some(legacy) = &self.legacy {
            legacy.logout().await?;
        }
        self.coordinator.tunnel().logout().await
    }

    /// Warm the CAS session, and the legacy one if configured.
    ///
    /// Failures are logged; the app starts either way.
    pub async fn initial_fetch(&self) {
        let Some(credential) = self.credentials.get() else {
            debug!("No credential configured, skipping warm-up");
            return;
        };

        let landing = self.landing_url(credential.student_type);
        let legacy_warmup = async {
            match (&self.legacy, &self.config.legacy) {
                (Some(legacy), Some(config)) => legacy
                    .authenticate(&service_root(&config.login_url), None)
                    .await
                    .map(|_| ()),
                _ => Ok(()),
            }
        };

        match with_optional(self.cas.authenticate(&landing, None), legacy_warmup).await {
            Ok((_, legacy)) => info!(legacy_ok = legacy.is_some(), "Initial warm-up finished"),
            Err(e) => warn!(error = %e, "Initial warm-up failed"),
        }
    }
}

/// Root page of the service behind `url`
fn service_root(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_path("/");
    root.set_query(None);
    root.set_fragment(None);
    root
}
