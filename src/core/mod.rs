//! Core primitives.
//!
//! Digests, canonical serialization and time. Everything above this layer
//! hashes through `hash` and serializes hashed data through `canonical`.

pub mod canonical;
pub mod clock;
pub mod hash;

// Re-export core types
pub use canonical::{canonical_json, to_canonical_string};
pub use clock::{Clock, ManualClock, SystemClock, TimestampMs};
pub use hash::{is_hex_digest, DigestHasher, HexDigest};
