//! Roll Commitment Protocol
//!
//! Before rolling, the acting player publishes `H(salt | player_id | turn)`.
//! After the roll they reveal the salt; anyone can recompute the hash.
//! Binding the player and turn number stops a commitment from being
//! replayed into another player's or another turn's slot.
//!
//! The preimage is the UTF-8 string `"{salt}|{player_id}|{turn_number}"`
//! hashed with plain SHA-256, so clients in any language can produce it.
//! Salts are hex and player ids exclude `|`, which keeps the encoding
//! unambiguous.

use crate::core::hash::{DigestHasher, HexDigest};

/// Minimum salt length in hex characters (64 bits of entropy).
pub const MIN_SALT_LEN: usize = 16;

/// Maximum salt length in hex characters.
pub const MAX_SALT_LEN: usize = 256;

/// Separator between preimage fields.
const FIELD_SEPARATOR: &str = "|";

/// Compute `H(salt | player_id | turn_number)`.
pub fn commit(salt: &str, player_id: &str, turn_number: u32) -> HexDigest {
    let mut hasher = DigestHasher::plain();
    hasher.update_str(salt);
    hasher.update_str(FIELD_SEPARATOR);
    hasher.update_str(player_id);
    hasher.update_str(FIELD_SEPARATOR);
    hasher.update_str(&turn_number.to_string());
    hasher.finalize()
}

/// Recompute and compare.
pub fn verify(hash: &HexDigest, salt: &str, player_id: &str, turn_number: u32) -> bool {
    commit(salt, player_id, turn_number) == *hash
}

/// Errors for malformed salts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitmentError {
    /// Salt outside the allowed length.
    #[error("salt must be {}-{} hex characters, got {}", MIN_SALT_LEN, MAX_SALT_LEN, .0)]
    SaltLength(usize),

    /// Salt contains non-hex characters.
    #[error("salt must be hex encoded")]
    SaltNotHex,
}

/// Validate the shape of a revealed salt.
pub fn validate_salt(salt: &str) -> Result<(), CommitmentError> {
    if salt.len() < MIN_SALT_LEN || salt.len() > MAX_SALT_LEN {
        return Err(CommitmentError::SaltLength(salt.len()));
    }
    if !salt.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CommitmentError::SaltNotHex);
    }
    Ok(())
}
