//! Encrypted file storage for hosts without an OS keychain.
//!
//! File layout: `salt (16) | nonce (12) | ciphertext`. The key is derived
//! from a passphrase with Argon2 and a fresh salt on every save.

use std::path::PathBuf;

use anyhow::{Context, Result};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;

use super::credentials::SecretBackend;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

pub struct EncryptedFileBackend {
    path: PathBuf,
    passphrase: String,
}

impl EncryptedFileBackend {
    pub fn new(path: PathBuf, passphrase: impl Into<String>) -> Self {
        Self {
            path,
            passphrase: passphrase.into(),
        }
    }

    fn cipher(&self, salt: &[u8]) -> Result<ChaCha20Poly1305> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| anyhow::anyhow!("Failed to derive vault key: {}", e))?;
        Ok(ChaCha20Poly1305::new(Key::from_slice(&key)))
    }
}

impl SecretBackend for EncryptedFileBackend {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let sealed = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read vault {}", self.path.display()))?;
        if sealed.len() < SALT_LEN + NONCE_LEN {
            return Err(anyhow::anyhow!("Vault file is truncated"));
        }

        let (salt, rest) = sealed.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let plaintext = self
            .cipher(salt)?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow::anyhow!("Failed to decrypt vault - wrong passphrase or corrupt file"))?;

        String::from_utf8(plaintext)
            .map(Some)
            .context("Vault contents are not UTF-8")
    }

    fn save(&self, secret: &str) -> Result<()> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher(&salt)?
            .encrypt(Nonce::from_slice(&nonce), secret.as_bytes())
            .map_err(|_| anyhow::anyhow!("Failed to encrypt credential"))?;

        let mut sealed = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&salt);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, sealed)
            .with_context(|| format!("Failed to write vault {}", self.path.display()))
    }

    fn delete(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove vault {}", self.path.display()))?;
        }
        Ok(())
    }
}
