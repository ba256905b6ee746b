//! Turn Proof System
//!
//! Makes a physically rolled die auditable without a trusted observer:
//! - Commit/reveal of a secret salt before and after the roll
//! - Hash-chained log of every room transition
//! - Multi-sample evidence validation and consensus
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commitment.rs - H(salt | player | turn) commit/verify      │
//! │  chain.rs      - Append-only SHA-256 event chain            │
//! │  evidence.rs   - Structural/timing/motion checks + voting   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod chain;
pub mod commitment;
pub mod evidence;

// Re-export key types
pub use chain::{
    ChainError, ChainEvent, ChainEventType, ChainFault, ChainFaultKind, ChainSnapshot,
    ChainVerification, HashChain,
};
pub use commitment::{commit, verify, CommitmentError};
pub use evidence::{
    consensus, validate, DetectionSample, EvidenceBuilder, EvidenceContext, EvidencePackage,
    EvidenceResult, EvidenceRules, EvidenceStatus, FlagReason,
};
