//! Digest Helpers
//!
//! Every tamper-evidence guarantee in the engine (commitments, chain links,
//! frame references) is a SHA-256 digest. This module provides:
//! - `HexDigest`, a 32-byte digest that travels as 64 lowercase hex chars
//! - `DigestHasher`, a domain-separated incremental hasher
//! - helpers for validating client-supplied hex digests

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Length of a digest rendered as hex.
pub const DIGEST_HEX_LEN: usize = 64;

/// A SHA-256 digest.
///
/// Serialized as a lowercase hex string so that JSON snapshots and chain
/// events can be audited without a binary decoder.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HexDigest(pub [u8; 32]);

impl HexDigest {
    /// The all-zero digest, used as the genesis link.
    pub const ZERO: HexDigest = HexDigest([0u8; 32]);

    /// Hash arbitrary bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for HexDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for HexDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexDigest({})", self.short())
    }
}

/// Error parsing a hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestParseError {
    /// Wrong number of characters.
    #[error("expected {} hex characters, got {}", DIGEST_HEX_LEN, .0)]
    Length(usize),
    /// Non-hex character present.
    #[error("digest contains non-hex characters")]
    NotHex,
}

impl FromStr for HexDigest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(DigestParseError::Length(s.len()));
        }
        let bytes = hex::decode(s).map_err(|_| DigestParseError::NotHex)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl Serialize for HexDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HexDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether `s` is a well-formed 64-character hex digest.
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Domain-separated SHA-256 hasher.
///
/// Order of updates is significant.
pub struct DigestHasher {
    hasher: Sha256,
}

impl DigestHasher {
    /// Create a hasher with a domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create a hasher without a domain separator.
    pub fn plain() -> Self {
        Self { hasher: Sha256::new() }
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with UTF-8 text.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.hasher.update(value.as_bytes());
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a digest.
    #[inline]
    pub fn update_digest(&mut self, digest: &HexDigest) {
        self.hasher.update(digest.0);
    }

    /// Finalize and return the digest.
    pub fn finalize(self) -> HexDigest {
        HexDigest(self.hasher.finalize().into())
    }
}

// =============================================================================
// TESTS
// =============================================================================
