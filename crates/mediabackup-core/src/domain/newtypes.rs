//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Opaque string identifiers
// ============================================================================

/// Declares a non-empty, opaque string identifier.
///
/// Identifiers handed to us by collaborators (account provider, remote
/// store, local media index) carry no structure we can validate beyond
/// being non-empty and free of surrounding whitespace.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Create a new ", $label, ", rejecting empty values")]
            ///
            /// # Errors
            /// Returns `DomainError::InvalidId` if the value is empty or padded
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(DomainError::InvalidId(format!(
                        "{} cannot be empty",
                        $label
                    )));
                }
                if value.trim() != value {
                    return Err(DomainError::InvalidId(format!(
                        "{} has surrounding whitespace: {value:?}",
                        $label
                    )));
                }
                Ok(Self(value))
            }

            /// Get the inner string reference
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// Identifier of an authenticated account (user session)
    UserId,
    "user id"
);

string_id!(
    /// Identifier of the remote parent folder backups are uploaded into
    FolderId,
    "folder id"
);

string_id!(
    /// Identifier of a remote file link (draft or active)
    LinkId,
    "link id"
);

string_id!(
    /// Stable identifier of this device as an upload client
    ClientUid,
    "client uid"
);

string_id!(
    /// Local file handle (content URI or absolute path)
    FileUri,
    "file uri"
);

// ============================================================================
// Bucket identifier
// ============================================================================

/// Identifier of a local source bucket (a media collection on the device)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(i64);

impl BucketId {
    /// Wrap a platform bucket id
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw platform id
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl Display for BucketId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BucketId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid bucket id '{s}': {e}")))
    }
}

impl From<i64> for BucketId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Hash types
// ============================================================================

/// Validates a lowercase hexadecimal digest of the given byte lengths
fn validate_hex_digest(value: &str, allowed_bytes: &[usize]) -> Result<(), DomainError> {
    if value.is_empty() {
        return Err(DomainError::InvalidHash("Hash cannot be empty".to_string()));
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err(DomainError::InvalidHash(format!(
            "Hash is not lowercase hex: {value}"
        )));
    }

    if !allowed_bytes.iter().any(|bytes| value.len() == bytes * 2) {
        return Err(DomainError::InvalidHash(format!(
            "Hash has wrong length: {} hex characters",
            value.len()
        )));
    }

    Ok(())
}

/// Keyed hash of a file name (hex HMAC-SHA256)
///
/// Used to look up remote duplicates without exposing plaintext names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NameHash(String);

impl NameHash {
    /// SHA-256 output size in bytes
    const DIGEST_BYTES: usize = 32;

    /// Create a new NameHash
    ///
    /// # Errors
    /// Returns error if the value is not a 32-byte lowercase hex digest
    pub fn new(hash: impl Into<String>) -> Result<Self, DomainError> {
        let hash = hash.into();
        validate_hex_digest(&hash, &[Self::DIGEST_BYTES])?;
        Ok(Self(hash))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NameHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NameHash {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for NameHash {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<NameHash> for String {
    fn from(hash: NameHash) -> Self {
        hash.0
    }
}

/// Keyed hash of file content (hex digest, SHA-256 or SHA-512 based)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Accepted digest sizes in bytes (SHA-256, SHA-512)
    const DIGEST_BYTES: [usize; 2] = [32, 64];

    /// Create a new ContentHash
    ///
    /// Upper-case input is normalised so digests reported by remote
    /// services compare equal to locally computed ones.
    ///
    /// # Errors
    /// Returns error if the value is not a 32- or 64-byte hex digest
    pub fn new(hash: impl Into<String>) -> Result<Self, DomainError> {
        let hash = hash.into().to_ascii_lowercase();
        validate_hex_digest(&hash, &Self::DIGEST_BYTES)?;
        Ok(Self(hash))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}
