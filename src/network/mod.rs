//! Network Layer
//!
//! Room actors and the WebSocket surface in front of them. Protocol rules
//! live in `game/`; this layer only serializes access to rooms, persists
//! them and moves messages.

pub mod actor;
pub mod auth;
pub mod protocol;
pub mod rooms;
pub mod server;

pub use actor::{spawn_room_actor, ActionOutcome, RoomCommand, RoomError, RoomHandle};
pub use auth::{validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
pub use rooms::RoomManager;
pub use server::{ClientSession, DiceServer, DiceServerError, ServerConfig};
