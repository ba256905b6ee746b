//! Game Logic Module
//!
//! Room state and the turn protocol. Nothing in here performs I/O; the
//! clock and persistence are supplied by the caller.
//!
//! ## Module Structure
//!
//! - `config`: Protocol constants
//! - `state`: Room, player and turn data model
//! - `turn`: Turn state machine transitions
//! - `events`: Push events for live observers
//! - `view`: Public room snapshot for `getState`

pub mod config;
pub mod events;
pub mod state;
pub mod turn;
pub mod view;

// Re-export key types
pub use config::ProtocolConfig;
pub use events::{PushEvent, PushEventKind};
pub use state::{
    Checklist, PhaseName, Player, PlayerId, Room, RoomId, RoomStatus, TurnPhase, TurnRecord,
};
pub use turn::{Exhaustion, Transition, TurnAction, TurnError};
pub use view::{ActionAck, PlayerView, RoomView, TurnView};
