//! # Dice Proof Server
//!
//! Turn verification for physically rolled dice played over video. Two
//! players take turns; every roll is bound to a commitment made before the
//! throw, checked against multi-frame detector evidence, and recorded in a
//! tamper-evident hash chain that a third party can audit.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DICE PROOF SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── hash.rs     - SHA-256 hex digests                       │
//! │  ├── canonical.rs- Sorted-key JSON for hashing               │
//! │  └── clock.rs    - Injectable millisecond clock              │
//! │                                                              │
//! │  proof/          - Tamper evidence                           │
//! │  ├── commitment.rs - Commit/reveal                           │
//! │  ├── chain.rs    - Append-only hash chain                    │
//! │  └── evidence.rs - Evidence checks and consensus             │
//! │                                                              │
//! │  trust/          - Derived trust signals                     │
//! │  ├── fairness.rs - Chi-square outcome monitor                │
//! │  └── reputation.rs - Tier from rolls and violations          │
//! │                                                              │
//! │  game/           - Room state and turn protocol (no I/O)     │
//! │  ├── config.rs   - Protocol constants                        │
//! │  ├── state.rs    - Room, player and turn model               │
//! │  ├── turn.rs     - Turn state machine                        │
//! │  ├── events.rs   - Push events                               │
//! │  └── view.rs     - Public snapshot                           │
//! │                                                              │
//! │  store/          - Room persistence (memory, JSON files)     │
//! │                                                              │
//! │  network/        - Actors and transport                      │
//! │  ├── actor.rs    - One serial actor per room                 │
//! │  ├── rooms.rs    - Room registry                             │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── auth.rs     - JWT identity                              │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Operations on a room never interleave: each room is owned by one actor.
//! - A room is persisted before an operation is acknowledged, and a failed
//!   write leaves the previous snapshot in place.
//! - Every phase transition appends one chain event; a snapshot whose chain
//!   does not verify is refused on load.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod proof;
pub mod store;
pub mod trust;

// Re-export commonly used types
pub use core::clock::{Clock, ManualClock, SystemClock, TimestampMs};
pub use core::hash::HexDigest;
pub use game::config::ProtocolConfig;
pub use game::state::{PlayerId, Room, RoomId};
pub use game::turn::{TurnAction, TurnError};
pub use network::actor::{spawn_room_actor, RoomHandle};
pub use proof::chain::HashChain;
pub use store::{FileRoomStore, MemoryRoomStore, RoomStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
