//! Keyed hashing of file names and file content
//!
//! Both hashes are HMACs so the remote store can match files without ever
//! seeing plaintext names or unkeyed digests:
//! - name hash: hex HMAC-SHA256 under the folder's name key
//! - content hash: hex HMAC-SHA256 or HMAC-SHA512 under the folder's node
//!   key, fed incrementally so large files are never held in memory

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};

use crate::domain::errors::DomainError;
use crate::domain::newtypes::{ContentHash, NameHash};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Computes the keyed name hash of `name`
pub fn name_hash(key: &[u8], name: &str) -> Result<NameHash, DomainError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| DomainError::InvalidKey(e.to_string()))?;
    mac.update(name.as_bytes());
    NameHash::new(hex::encode(mac.finalize().into_bytes()))
}

/// Digest used for content hashes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentHashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl ContentHashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentHashAlgorithm::Sha256 => "sha256",
            ContentHashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for ContentHashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentHashAlgorithm {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(ContentHashAlgorithm::Sha256),
            "sha512" => Ok(ContentHashAlgorithm::Sha512),
            _ => Err(DomainError::UnknownVariant {
                kind: "content hash algorithm",
                value: s.to_string(),
            }),
        }
    }
}

/// Incremental keyed content hasher
pub enum ContentHasher {
    Sha256(HmacSha256),
    Sha512(HmacSha512),
}

impl ContentHasher {
    pub fn new(algorithm: ContentHashAlgorithm, key: &[u8]) -> Result<Self, DomainError> {
        let hasher = match algorithm {
            ContentHashAlgorithm::Sha256 => ContentHasher::Sha256(
                HmacSha256::new_from_slice(key)
                    .map_err(|e| DomainError::InvalidKey(e.to_string()))?,
            ),
            ContentHashAlgorithm::Sha512 => ContentHasher::Sha512(
                HmacSha512::new_from_slice(key)
                    .map_err(|e| DomainError::InvalidKey(e.to_string()))?,
            ),
        };
        Ok(hasher)
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            ContentHasher::Sha256(mac) => mac.update(chunk),
            ContentHasher::Sha512(mac) => mac.update(chunk),
        }
    }

    pub fn finalize(self) -> Result<ContentHash, DomainError> {
        let digest = match self {
            ContentHasher::Sha256(mac) => hex::encode(mac.finalize().into_bytes()),
            ContentHasher::Sha512(mac) => hex::encode(mac.finalize().into_bytes()),
        };
        ContentHash::new(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"folder-hash-key";

    #[test]
    fn test_name_hash_is_keyed_and_stable() {
        let a = name_hash(KEY, "IMG_0001.jpg").unwrap();
        let b = name_hash(KEY, "IMG_0001.jpg").unwrap();
        let other_key = name_hash(b"another-key", "IMG_0001.jpg").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, other_key);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_name_hash_known_vector() {
        // RFC 4231 test case 2
        let hash = name_hash(b"Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            hash.as_str(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_content_hash_incremental_matches_single_shot() {
        let mut chunked = ContentHasher::new(ContentHashAlgorithm::Sha256, KEY).unwrap();
        chunked.update(b"hello ");
        chunked.update(b"world");

        let mut whole = ContentHasher::new(ContentHashAlgorithm::Sha256, KEY).unwrap();
        whole.update(b"hello world");

        assert_eq!(chunked.finalize().unwrap(), whole.finalize().unwrap());
    }

    #[test]
    fn test_content_hash_lengths() {
        let mut sha256 = ContentHasher::new(ContentHashAlgorithm::Sha256, KEY).unwrap();
        sha256.update(b"data");
        assert_eq!(sha256.finalize().unwrap().as_str().len(), 64);

        let mut sha512 = ContentHasher::new(ContentHashAlgorithm::Sha512, KEY).unwrap();
        sha512.update(b"data");
        assert_eq!(sha512.finalize().unwrap().as_str().len(), 128);
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(
            "SHA512".parse::<ContentHashAlgorithm>().unwrap(),
            ContentHashAlgorithm::Sha512
        );
        assert!("md5".parse::<ContentHashAlgorithm>().is_err());
    }
}
