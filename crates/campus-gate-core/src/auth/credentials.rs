use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock};

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const SERVICE_NAME: &str = "campus-gate";

/// Keychain account under which the active credential is kept
const KEYRING_ACCOUNT: &str = "sso-credential";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StudentType {
    #[default]
    Undergraduate,
    Graduate,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub student_type: StudentType,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("student_type", &self.student_type)
            .finish()
    }
}

/// Durable storage for the serialized credential
pub trait SecretBackend: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, secret: &str) -> Result<()>;
    fn delete(&self) -> Result<()>;
}

/// OS keychain storage
pub struct KeyringBackend;

impl KeyringBackend {
    fn entry() -> Result<Entry> {
        Entry::new(SERVICE_NAME, KEYRING_ACCOUNT).context("Failed to create keyring entry")
    }
}

impl SecretBackend for KeyringBackend {
    fn load(&self) -> Result<Option<String>> {
        match Self::entry()?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve credential from keychain"),
        }
    }

    fn save(&self, secret: &str) -> Result<()> {
        Self::entry()?
            .set_password(secret)
            .context("Failed to store credential in keychain")
    }

    fn delete(&self) -> Result<()> {
        match Self::entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}

/// Process-local storage; nothing survives a restart
#[derive(Default)]
pub struct MemoryBackend {
    secret: Mutex<Option<String>>,
}

impl SecretBackend for MemoryBackend {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.secret.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, secret: &str) -> Result<()> {
        *self.secret.lock().unwrap_or_else(PoisonError::into_inner) = Some(secret.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        *self.secret.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Single source of truth for "is a user configured".
///
/// Other components hold an `Arc<CredentialStore>` and call `get()` per
/// request. The in-memory value is authoritative; persistence failures are
/// logged and never surface to callers.
pub struct CredentialStore {
    backend: Box<dyn SecretBackend>,
    current: RwLock<Option<Credential>>,
}

impl CredentialStore {
    /// Create a store and load whatever credential the backend holds
    pub fn new(backend: Box<dyn SecretBackend>) -> Self {
        let current = match backend.load() {
            Ok(Some(secret)) => match serde_json::from_str::<Credential>(&secret) {
                Ok(credential) => {
                    debug!(username = %credential.username, "Loaded stored credential");
                    Some(credential)
                }
                Err(e) => {
                    warn!(error = %e, "Stored credential is unreadable, ignoring it");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Failed to load stored credential");
                None
            }
        };

        Self {
            backend,
            current: RwLock::new(current),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::<MemoryBackend>::default())
    }

    pub fn keyring() -> Self {
        Self::new(Box::new(KeyringBackend))
    }

    pub fn set(&self, username: &str, password: &str, student_type: StudentType) {
        let credential = Credential {
            username: username.to_string(),
            password: password.to_string(),
            student_type,
        };

        match serde_json::to_string(&credential) {
            Ok(secret) => {
                if let Err(e) = self.backend.save(&secret) {
                    warn!(error = %format!("{:#}", e), "Failed to persist credential");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize credential"),
        }

        info!(username = %username, ?student_type, "Credential stored");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(credential);
    }

    pub fn get(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        if let Err(e) = self.backend.delete() {
            warn!(error = %format!("{:#}", e), "Failed to delete persisted credential");
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        info!("Credential cleared");
    }

    pub fn has_credential(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
