//! Access keys and the key hashes derived from them
//!
//! An access key ID is the caller-facing form of a 16-byte [`EncryptionKey`]:
//! a version byte followed by the key, base32 encoded (RFC 4648 alphabet,
//! lowercase, no padding). The [`KeyHash`] of a key is its SHA-256 digest and
//! is what the record store uses as a primary key, so the store never holds
//! the key itself.

use crate::error::{Error, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Length of an encryption key in bytes
pub const ENCRYPTION_KEY_LEN: usize = 16;

/// Length of a key hash in bytes
pub const KEY_HASH_LEN: usize = 32;

/// Version byte prepended to the key before encoding
const ACCESS_KEY_VERSION: u8 = 1;

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Secret key material behind an access key ID
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EncryptionKey([u8; ENCRYPTION_KEY_LEN]);

impl EncryptionKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; ENCRYPTION_KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; ENCRYPTION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode an access key ID
    ///
    /// Decoding is case-insensitive. The decoded payload must be exactly one
    /// version byte followed by the 16 key bytes.
    pub fn from_base32(encoded: &str) -> Result<Self> {
        if encoded.is_empty() {
            return Err(Error::invalid_access_key("access key is empty"));
        }

        let data = base32_decode(encoded)?;
        if data.len() != ENCRYPTION_KEY_LEN + 1 {
            return Err(Error::invalid_access_key(format!(
                "decoded access key has length {}, expected {}",
                data.len(),
                ENCRYPTION_KEY_LEN + 1
            )));
        }
        if data[0] != ACCESS_KEY_VERSION {
            return Err(Error::invalid_access_key(format!(
                "unknown access key version {}",
                data[0]
            )));
        }

        let mut bytes = [0u8; ENCRYPTION_KEY_LEN];
        bytes.copy_from_slice(&data[1..]);
        Ok(Self(bytes))
    }

    /// Encode the key as an access key ID
    pub fn to_base32(&self) -> String {
        let mut data = Vec::with_capacity(ENCRYPTION_KEY_LEN + 1);
        data.push(ACCESS_KEY_VERSION);
        data.extend_from_slice(&self.0);
        base32_encode(&data)
    }

    /// Hash the key for use as a record primary key
    pub fn hash(&self) -> KeyHash {
        KeyHash(Sha256::digest(self.0).into())
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; ENCRYPTION_KEY_LEN] {
        &self.0
    }
}

impl FromStr for EncryptionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_base32(s)
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// SHA-256 digest of an [`EncryptionKey`]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyHash([u8; KEY_HASH_LEN]);

impl KeyHash {
    /// Build a key hash from stored bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_HASH_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidKeyHash { len: bytes.len() })?;
        Ok(Self(array))
    }

    /// Raw hash bytes
    pub fn as_bytes(&self) -> &[u8; KEY_HASH_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, suitable for logs
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; KEY_HASH_LEN]> for KeyHash {
    fn from(bytes: [u8; KEY_HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({})", self.to_hex())
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u16 = 0;
    let mut bits = 0u32;

    for &byte in data {
        buffer = (buffer << 8) | u16::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let index = ((buffer >> bits) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[index] as char);
        }
    }
    if bits > 0 {
        let index = ((buffer << (5 - bits)) & 0x1f) as usize;
        out.push(BASE32_ALPHABET[index] as char);
    }

    out
}

fn base32_decode(encoded: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded.len() * 5 / 8);
    let mut buffer: u16 = 0;
    let mut bits = 0u32;

    for ch in encoded.bytes() {
        let value = match ch.to_ascii_lowercase() {
            c @ b'a'..=b'z' => c - b'a',
            c @ b'2'..=b'7' => c - b'2' + 26,
            _ => {
                return Err(Error::invalid_access_key(format!(
                    "invalid base32 character {:?}",
                    ch as char
                )))
            }
        };
        buffer = (buffer << 5) | u16::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }

    Ok(out)
}
