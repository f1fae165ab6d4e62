//! Credential Service
//!
//! Symmetric encryption for secrets stored in descriptors (server URLs and
//! selected headers). AES-256-GCM with the key derived as SHA-256 of a
//! passphrase; output is `base64url(nonce || ciphertext)`.

use std::collections::BTreeMap;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use sha2::{Digest, Sha256};

use crate::error::CredentialError;

const NONCE_LEN: usize = 12;

pub trait CredentialService: Send + Sync {
    /// Encrypt a secret. Empty input yields empty output.
    fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError>;

    /// Reverse of [`CredentialService::encrypt`]. Empty input yields empty output.
    fn decrypt(&self, ciphertext: &str) -> Result<String, CredentialError>;
}

pub struct AesGcmCredentials {
    cipher: Aes256Gcm,
}

impl AesGcmCredentials {
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CredentialError> {
        if passphrase.is_empty() {
            return Err(CredentialError::InvalidKey("passphrase must not be empty".into()));
        }
        let digest = Sha256::digest(passphrase.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }
}

impl std::fmt::Debug for AesGcmCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesGcmCredentials { .. }")
    }
}

impl CredentialService for AesGcmCredentials {
    fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(URL_SAFE.encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CredentialError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let data = URL_SAFE
            .decode(ciphertext)
            .map_err(|e| CredentialError::Decryption(e.to_string()))?;
        if data.len() < NONCE_LEN {
            return Err(CredentialError::Decryption("ciphertext too short".into()));
        }

        let (nonce, sealed) = data.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CredentialError::Decryption("authentication failed".into()))?;

        String::from_utf8(plain).map_err(|e| CredentialError::Decryption(e.to_string()))
    }
}

/// Encrypt the named headers, leaving the rest untouched
pub fn encrypt_headers(
    service: &dyn CredentialService,
    headers: &BTreeMap<String, String>,
    sensitive: &[String],
) -> Result<BTreeMap<String, String>, CredentialError> {
    transform_headers(headers, sensitive, |value| service.encrypt(value))
}

/// Decrypt the named headers. Any failure fails the whole map.
pub fn decrypt_headers(
    service: &dyn CredentialService,
    headers: &BTreeMap<String, String>,
    sensitive: &[String],
) -> Result<BTreeMap<String, String>, CredentialError> {
    transform_headers(headers, sensitive, |value| service.decrypt(value))
}

fn transform_headers(
    headers: &BTreeMap<String, String>,
    sensitive: &[String],
    mut f: impl FnMut(&str) -> Result<String, CredentialError>,
) -> Result<BTreeMap<String, String>, CredentialError> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if sensitive.iter().any(|s| s == name) {
                f(value)?
            } else {
                value.clone()
            };
            Ok((name.clone(), value))
        })
        .collect()
}
