//! Room Actor
//!
//! One tokio task owns each room. Commands arrive over an mpsc mailbox and
//! run one at a time, so operations on a room never interleave no matter
//! how many connections drive it.
//!
//! ```text
//!   connection ──┐                     ┌──────────────────────┐
//!   connection ──┼── RoomCommand ────▶ │  RoomActor           │──▶ RoomStore
//!   connection ──┘   (mpsc, oneshot)   │  clone → apply →     │
//!        ▲                             │  save → swap → push  │
//!        └────────── PushEvent ─────── └──────────────────────┘
//!                    (broadcast)
//! ```
//!
//! A mutation is applied to a copy of the room. The copy is persisted and
//! only then replaces the live room, so a failed save leaves both the
//! in-memory and the durable state at the last acknowledged operation.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::core::clock::Clock;
use crate::core::hash::HexDigest;
use crate::game::config::ProtocolConfig;
use crate::game::events::PushEvent;
use crate::game::state::{PlayerId, Room, RoomId};
use crate::game::turn::{TurnAction, TurnError};
use crate::game::view::{ActionAck, RoomView};
use crate::proof::chain::{ChainSnapshot, ChainVerification};
use crate::store::RoomStore;

/// Commands queued per room before senders wait.
pub const MAILBOX_CAPACITY: usize = 64;

/// Push events buffered per room before slow subscribers lag.
pub const PUSH_CAPACITY: usize = 256;

/// Room actor and registry errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    /// The turn state machine rejected the operation.
    #[error(transparent)]
    Turn(#[from] TurnError),

    /// The updated room could not be persisted; nothing changed.
    #[error("failed to persist room: {0}")]
    Persist(String),

    /// The stored room could not be loaded.
    #[error("failed to load room: {0}")]
    Load(String),

    /// The actor has stopped.
    #[error("room actor closed")]
    Closed,
}

/// What the actor answers to a mutating command.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    /// `{success, newChainTip, errors?}` for the caller.
    pub ack: ActionAck,
    /// Set when the operation was rejected without a state change.
    pub error: Option<RoomError>,
}

impl ActionOutcome {
    fn rejected(tip: HexDigest, err: RoomError) -> Self {
        Self {
            ack: ActionAck { success: false, new_chain_tip: tip, errors: vec![err.to_string()] },
            error: Some(err),
        }
    }
}

/// Mailbox commands.
#[derive(Debug)]
pub enum RoomCommand {
    /// Run a player operation.
    Act {
        /// Acting player.
        player_id: PlayerId,
        /// The operation.
        action: TurnAction,
        /// Reply channel.
        reply: oneshot::Sender<ActionOutcome>,
    },
    /// Snapshot the room.
    GetState {
        /// Reply channel.
        reply: oneshot::Sender<RoomView>,
    },
    /// Re-verify the hash chain.
    VerifyChain {
        /// Reply channel.
        reply: oneshot::Sender<ChainVerification>,
    },
    /// Export the hash chain.
    ExportChain {
        /// Reply channel.
        reply: oneshot::Sender<ChainSnapshot>,
    },
}

/// Cloneable address of a running room actor.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
    events: broadcast::Sender<PushEvent>,
}

impl RoomHandle {
    /// Room served by this actor.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Run an operation and wait for its outcome.
    pub async fn act(
        &self,
        player_id: PlayerId,
        action: TurnAction,
    ) -> Result<ActionOutcome, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Act { player_id, action, reply }).await?;
        rx.await.map_err(|_| RoomError::Closed)
    }

    /// Full public snapshot.
    pub async fn get_state(&self) -> Result<RoomView, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::GetState { reply }).await?;
        rx.await.map_err(|_| RoomError::Closed)
    }

    /// Re-verify the room's chain.
    pub async fn verify_chain(&self) -> Result<ChainVerification, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::VerifyChain { reply }).await?;
        rx.await.map_err(|_| RoomError::Closed)
    }

    /// Copy of the room's chain.
    pub async fn export_chain(&self) -> Result<ChainSnapshot, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::ExportChain { reply }).await?;
        rx.await.map_err(|_| RoomError::Closed)
    }

    /// Receive push events from now on. Delivery is best-effort: a slow
    /// receiver sees `RecvError::Lagged` and should re-fetch state.
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.events.subscribe()
    }

    /// Whether the actor task is still running.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender.send(cmd).await.map_err(|_| RoomError::Closed)
    }
}

/// Start an actor owning `room`.
pub fn spawn_room_actor(
    room: Room,
    store: Arc<dyn RoomStore>,
    clock: Arc<dyn Clock>,
    config: Arc<ProtocolConfig>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let (events, _) = broadcast::channel(PUSH_CAPACITY);
    let handle = RoomHandle { id: room.id.clone(), sender: tx, events: events.clone() };

    let actor = RoomActor { room, store, clock, config, events };
    tokio::spawn(actor.run(rx));

    handle
}

struct RoomActor {
    room: Room,
    store: Arc<dyn RoomStore>,
    clock: Arc<dyn Clock>,
    config: Arc<ProtocolConfig>,
    events: broadcast::Sender<PushEvent>,
}

impl RoomActor {
    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>) {
        debug!(room = %self.room.id, "room actor started");

        while let Some(cmd) = rx.recv().await {
            match cmd {
                RoomCommand::Act { player_id, action, reply } => {
                    let outcome = self.act(player_id, action).await;
                    let _ = reply.send(outcome);
                }
                RoomCommand::GetState { reply } => {
                    let _ = reply.send(RoomView::of(&self.room, &self.config));
                }
                RoomCommand::VerifyChain { reply } => {
                    let _ = reply.send(self.room.hash_chain.verify());
                }
                RoomCommand::ExportChain { reply } => {
                    let _ = reply.send(self.room.hash_chain.export_snapshot());
                }
            }
        }

        debug!(room = %self.room.id, "room actor stopped");
    }

    async fn act(&mut self, player_id: PlayerId, action: TurnAction) -> ActionOutcome {
        let name = action.name();
        let now = self.clock.now_ms();
        let mut next = self.room.clone();

        let transition = match next.apply(&player_id, action, &self.config, now) {
            Ok(transition) => transition,
            Err(err) => {
                warn!(room = %self.room.id, player = %player_id, action = name, error = %err, "action rejected");
                return ActionOutcome::rejected(self.room.hash_chain.tip(), err.into());
            }
        };

        // Nothing to persist (rejoin of a seated player).
        if transition.event.is_none() && transition.push.is_empty() {
            return ActionOutcome {
                ack: ActionAck { success: true, new_chain_tip: self.room.hash_chain.tip(), errors: Vec::new() },
                error: None,
            };
        }

        let next = match self.persist(next).await {
            Ok(room) => room,
            Err(err) => {
                error!(room = %self.room.id, action = name, error = %err, "persist failed");
                return ActionOutcome::rejected(self.room.hash_chain.tip(), err);
            }
        };
        self.room = next;

        for event in transition.push.iter().cloned() {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }

        debug!(room = %self.room.id, player = %player_id, action = name, chain_length = self.room.hash_chain.len(), "action applied");

        ActionOutcome {
            ack: ActionAck {
                success: !transition.is_violation(),
                new_chain_tip: self.room.hash_chain.tip(),
                errors: transition.violations,
            },
            error: None,
        }
    }

    /// Save on the blocking pool and hand the room back.
    async fn persist(&self, room: Room) -> Result<Room, RoomError> {
        let store = Arc::clone(&self.store);
        let (room, result) = tokio::task::spawn_blocking(move || {
            let result = store.save(&room);
            (room, result)
        })
        .await
        .map_err(|e| RoomError::Persist(e.to_string()))?;

        result.map_err(|e| RoomError::Persist(e.to_string()))?;
        Ok(room)
    }
}
