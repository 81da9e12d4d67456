//! At-rest protection for cached responses
//!
//! A cached response is sealed with ChaCha20-Poly1305 under a key derived by
//! HKDF-SHA256 from the access key ID and a per-entry random salt. Only a
//! caller presenting the same access key ID can open it again. The `public`
//! flag is stored in the clear and bound to the ciphertext as associated
//! data.

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::security::SecureString;
use crate::types::AuthServiceResponse;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_INFO: &[u8] = b"gatekey resolve cache v1";

#[derive(Debug, thiserror::Error)]
pub(crate) enum SealError {
    #[error("cache key derivation failed")]
    KeyDerivation,

    #[error("cache encryption failed")]
    Encrypt,

    #[error("cache decryption failed")]
    Decrypt,

    #[error("cache payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct SecretsRef<'a> {
    access_grant: &'a str,
    secret_key: &'a str,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
struct Secrets {
    access_grant: String,
    secret_key: String,
}

/// An encrypted [`AuthServiceResponse`]
#[derive(Clone)]
pub(crate) struct SealedResponse {
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
    public: bool,
}

impl fmt::Debug for SealedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedResponse")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

fn cipher(access_key_id: &str, salt: &[u8]) -> Result<ChaCha20Poly1305, SealError> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), access_key_id.as_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(KEY_INFO, &mut key[..])
        .map_err(|_| SealError::KeyDerivation)?;
    Ok(ChaCha20Poly1305::new(Key::from_slice(&key[..])))
}

impl SealedResponse {
    /// Encrypt `response` under `access_key_id`
    pub(crate) fn seal(access_key_id: &str, response: &AuthServiceResponse) -> Result<Self, SealError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut rng = rand::rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let plaintext = Zeroizing::new(serde_json::to_vec(&SecretsRef {
            access_grant: response.access_grant.as_str(),
            secret_key: response.secret_key.as_str(),
        })?);
        let aad = [u8::from(response.public)];

        let ciphertext = cipher(access_key_id, &salt)?
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| SealError::Encrypt)?;

        Ok(Self {
            salt,
            nonce,
            ciphertext,
            public: response.public,
        })
    }

    /// Decrypt with the access key ID the caller presented
    pub(crate) fn open(&self, access_key_id: &str) -> Result<AuthServiceResponse, SealError> {
        let aad = [u8::from(self.public)];
        let plaintext = Zeroizing::new(
            cipher(access_key_id, &self.salt)?
                .decrypt(
                    Nonce::from_slice(&self.nonce),
                    Payload {
                        msg: &self.ciphertext,
                        aad: &aad,
                    },
                )
                .map_err(|_| SealError::Decrypt)?,
        );

        let mut secrets: Secrets = serde_json::from_slice(&plaintext)?;
        Ok(AuthServiceResponse {
            access_grant: SecureString::new(std::mem::take(&mut secrets.access_grant)),
            secret_key: SecureString::new(std::mem::take(&mut secrets.secret_key)),
            public: self.public,
        })
    }

    /// Everything this entry keeps in memory, for leak checks
    #[cfg(test)]
    pub(crate) fn stored_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes.push(u8::from(self.public));
        bytes
    }
}
