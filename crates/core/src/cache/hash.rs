//! Request fingerprinting: canonical URL string to storage key.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

/// Length of a rendered key in hex characters.
pub const KEY_LEN: usize = 64;

/// One-way digest used to derive storage keys.
pub trait KeyHasher: Send + Sync {
    fn digest(&self, input: &[u8]) -> Vec<u8>;
}

/// SHA-256 key hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl KeyHasher for Sha256Hasher {
    fn digest(&self, input: &[u8]) -> Vec<u8> {
        Sha256::digest(input).to_vec()
    }
}

/// Storage key for one cache entry.
///
/// Rendered as lowercase hex; used verbatim as the on-disk file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheEntryKey(String);

impl CacheEntryKey {
    /// Parse a key previously rendered with [`CacheEntryKey::as_str`].
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        if s.len() != KEY_LEN || !s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(Error::InvalidKeyInput(format!("not a {KEY_LEN}-char lowercase hex key: {s}")));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheEntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives [`CacheEntryKey`]s with an injected hasher.
#[derive(Clone)]
pub struct Fingerprinter {
    hasher: Arc<dyn KeyHasher>,
}

impl fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprinter").finish_non_exhaustive()
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(Arc::new(Sha256Hasher))
    }
}

impl Fingerprinter {
    pub fn new(hasher: Arc<dyn KeyHasher>) -> Self {
        Self { hasher }
    }

    /// Compute the key for a canonical URL string.
    ///
    /// Empty, whitespace-only or unparsable input is rejected.
    pub fn key_for(&self, canonical_url: &str) -> Result<CacheEntryKey, Error> {
        if canonical_url.trim().is_empty() {
            return Err(Error::InvalidKeyInput("empty URL".into()));
        }
        url::Url::parse(canonical_url).map_err(|e| Error::InvalidKeyInput(format!("{canonical_url}: {e}")))?;

        let digest = self.hasher.digest(canonical_url.as_bytes());
        if digest.is_empty() {
            return Err(Error::InvalidKeyInput("hasher produced an empty digest".into()));
        }
        Ok(CacheEntryKey(hex::encode(digest)))
    }
}

/// Compute the key for a canonical URL string with the default SHA-256 hasher.
pub fn key_for(canonical_url: &str) -> Result<CacheEntryKey, Error> {
    Fingerprinter::default().key_for(canonical_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_stability() {
        let key1 = key_for("https://example.com/").unwrap();
        let key2 = key_for("https://example.com/").unwrap();
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_key_different_urls() {
        let bar = key_for("foo://bar").unwrap();
        let baz = key_for("foo://baz").unwrap();
        assert_ne!(bar, baz);
    }

    #[test]
    fn test_key_format() {
        let key = key_for("https://example.com/").unwrap();
        assert_eq!(key.as_str().len(), KEY_LEN);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_known_digest() {
        let key = key_for("https://example.com/").unwrap();
        assert_eq!(key.as_str(), hex::encode(Sha256::digest(b"https://example.com/")));
    }

    #[test]
    fn test_key_rejects_empty() {
        assert!(matches!(key_for(""), Err(Error::InvalidKeyInput(_))));
        assert!(matches!(key_for("   "), Err(Error::InvalidKeyInput(_))));
    }

    #[test]
    fn test_key_rejects_unparsable() {
        assert!(matches!(key_for("not a url"), Err(Error::InvalidKeyInput(_))));
    }

    #[test]
    fn test_from_hex_round_trip() {
        let key = key_for("https://example.com/").unwrap();
        assert_eq!(CacheEntryKey::from_hex(key.as_str()).unwrap(), key);
        assert!(CacheEntryKey::from_hex("abc").is_err());
        assert!(CacheEntryKey::from_hex(&"G".repeat(KEY_LEN)).is_err());
    }

    #[test]
    fn test_injected_hasher() {
        struct Fixed;
        impl KeyHasher for Fixed {
            fn digest(&self, _input: &[u8]) -> Vec<u8> {
                vec![0xab; 4]
            }
        }

        let fp = Fingerprinter::new(Arc::new(Fixed));
        assert_eq!(fp.key_for("https://example.com/").unwrap().as_str(), "abababab");
    }
}
