//! Handling of secret-bearing strings
//!
//! Secret keys, access grants and bearer tokens travel as [`SecureString`],
//! which wipes its buffer on drop and never prints its contents.

use std::fmt;

use serde::{Deserialize, Deserializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string that is zeroed on drop and redacted in `Debug` and `Display`
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Wrap `value`
    pub fn new(value: String) -> Self {
        Self { inner: value }
    }

    /// Borrow the secret (use with caution)
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Give up the protection and take the plain string
    pub fn into_string(mut self) -> String {
        std::mem::take(&mut self.inner)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl PartialEq for SecureString {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for SecureString {}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString([REDACTED {} bytes])", self.len())
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_formatting() {
        let secret = SecureString::from("sk_live_123");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(format!("{:?}", secret), "SecureString([REDACTED 11 bytes])");
        assert!(!format!("{:?}", secret).contains("sk_live"));
    }

    #[test]
    fn test_access() {
        let secret = SecureString::new("grant".to_string());
        assert_eq!(secret.as_str(), "grant");
        assert_eq!(secret.len(), 5);
        assert!(!secret.is_empty());
        assert_eq!(secret.into_string(), "grant");
    }

    #[test]
    fn test_deserialize_from_json_string() {
        let secret: SecureString = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(secret, SecureString::from("abc"));
    }
}
