//! WebSocket Server
//!
//! Async WebSocket server for table clients. Each connection gets a
//! `ClientSession` that authenticates it, seats it in one room and routes
//! its operations to that room's actor. Room events are forwarded back on
//! the same socket.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::config::env_or;
use crate::game::events::PushEvent;
use crate::game::state::{PlayerId, RoomId};
use crate::game::turn::TurnAction;
use crate::network::actor::{RoomError, RoomHandle};
use crate::network::auth::{validate_token, AuthConfig, AuthError};
use crate::network::protocol::{
    AckMessage, AuthRequest, AuthResult, ClientMessage, ErrorCode, JoinRequest, JoinedInfo,
    ServerError, ServerMessage,
};
use crate::network::rooms::RoomManager;

/// Outgoing messages buffered per connection.
const OUTBOX_CAPACITY: usize = 64;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Messages a connection may send per second.
    pub messages_per_second: u32,
    /// Directory for room snapshots. In-memory storage when None.
    pub data_dir: Option<PathBuf>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            messages_per_second: 20,
            data_dir: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `DICE_BIND_ADDR`, `DICE_MAX_CONNECTIONS`,
    /// `DICE_MESSAGES_PER_SECOND` and `DICE_DATA_DIR`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            bind_addr: env_or("DICE_BIND_ADDR", d.bind_addr),
            max_connections: env_or("DICE_MAX_CONNECTIONS", d.max_connections),
            messages_per_second: env_or("DICE_MESSAGES_PER_SECOND", d.messages_per_second),
            data_dir: std::env::var("DICE_DATA_DIR").ok().map(PathBuf::from),
            version: d.version,
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum DiceServerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// The table server.
pub struct DiceServer {
    /// Server configuration.
    config: ServerConfig,
    /// Token validation settings.
    auth: Arc<AuthConfig>,
    /// Live rooms.
    rooms: Arc<RoomManager>,
    /// Open connections.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl DiceServer {
    /// Create a server over a room registry.
    pub fn new(config: ServerConfig, auth: AuthConfig, rooms: Arc<RoomManager>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            auth: Arc::new(auth),
            rooms,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// Accept connections until `shutdown` is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), DiceServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(
            addr = %self.config.bind_addr,
            auth = self.auth.is_configured(),
            "dice server listening"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let auth = Arc::clone(&self.auth);
        let rooms = Arc::clone(&self.rooms);
        let config = self.config.clone();
        let connections = Arc::clone(&self.connections);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        connections.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    connections.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOX_CAPACITY);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut session = ClientSession::new(addr, auth, rooms, config.version.clone(), msg_tx.clone());
            let limiter = connection_limiter(config.messages_per_second);

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if limiter.check().is_err() {
                                    let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                        ErrorCode::RateLimited,
                                        "Too many messages",
                                    ))).await;
                                    continue;
                                }

                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => session.handle(client_msg).await,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidInput,
                                            format!("Invalid message format: {}", e),
                                        ))).await;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            // tungstenite answers pings itself
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            drop(session);
            drop(msg_tx);
            let _ = sender_task.await;
            connections.fetch_sub(1, Ordering::SeqCst);

            info!("Client {} cleaned up", addr);
        });
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Get live room count.
    pub async fn room_count(&self) -> usize {
        self.rooms.room_count().await
    }
}

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Per-connection message limiter allowing `per_second` messages a second,
/// bursting up to the same amount. Zero is treated as one.
fn connection_limiter(per_second: u32) -> DefaultDirectRateLimiter {
    let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(per_second))
}

// =============================================================================
// CLIENT SESSION
// =============================================================================

/// A seat held by a connection.
struct Seat {
    handle: RoomHandle,
    player_id: PlayerId,
    forwarder: JoinHandle<()>,
}

impl Drop for Seat {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Per-connection protocol state.
pub struct ClientSession {
    addr: SocketAddr,
    auth: Arc<AuthConfig>,
    rooms: Arc<RoomManager>,
    version: String,
    outbox: mpsc::Sender<ServerMessage>,
    /// Identity proven by a token.
    identity: Option<PlayerId>,
    seat: Option<Seat>,
}

impl ClientSession {
    /// Create a session that replies through `outbox`.
    pub fn new(
        addr: SocketAddr,
        auth: Arc<AuthConfig>,
        rooms: Arc<RoomManager>,
        version: String,
        outbox: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self { addr, auth, rooms, version, outbox, identity: None, seat: None }
    }

    /// Room and player this session is seated as.
    pub fn seat(&self) -> Option<(&RoomId, &PlayerId)> {
        self.seat.as_ref().map(|s| (s.handle.id(), &s.player_id))
    }

    /// Handle one client message.
    pub async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Auth(auth) => self.handle_auth(auth).await,
            ClientMessage::Join(req) => self.handle_join(req).await,
            ClientMessage::GetState => {
                let Some(handle) = self.room_handle().await else { return };
                match handle.get_state().await {
                    Ok(view) => self.send(ServerMessage::State(view)).await,
                    Err(e) => self.send_room_error(&e).await,
                }
            }
            ClientMessage::VerifyChain => {
                let Some(handle) = self.room_handle().await else { return };
                match handle.verify_chain().await {
                    Ok(result) => self.send(ServerMessage::ChainVerified(result)).await,
                    Err(e) => self.send_room_error(&e).await,
                }
            }
            ClientMessage::ExportChain => {
                let Some(handle) = self.room_handle().await else { return };
                match handle.export_chain().await {
                    Ok(chain) => self.send(ServerMessage::Chain(chain)).await,
                    Err(e) => self.send_room_error(&e).await,
                }
            }
            ClientMessage::Ping { timestamp } => {
                self.send(ServerMessage::Pong {
                    timestamp,
                    server_time: chrono::Utc::now().timestamp_millis(),
                })
                .await;
            }
            ClientMessage::Leave => {
                if let Some(seat) = self.seat.take() {
                    debug!(room = %seat.handle.id(), player = %seat.player_id, "left room");
                }
            }
            other => match other.into_action() {
                Some(action) => self.handle_action(action).await,
                None => debug!("Unhandled message type from {}", self.addr),
            },
        }
    }

    /// Handle authentication.
    async fn handle_auth(&mut self, auth: AuthRequest) {
        let result = validate_token(&auth.token, &self.auth)
            .and_then(|claims| claims.player_id());

        match result {
            Ok(player_id) => {
                info!(addr = %self.addr, player = %player_id, client_version = %auth.client_version, "authenticated");
                self.identity = Some(player_id.clone());
                self.send(ServerMessage::AuthResult(AuthResult {
                    success: true,
                    player_id: Some(player_id.to_string()),
                    error: None,
                    server_version: self.version.clone(),
                }))
                .await;
            }
            Err(e) => {
                warn!(addr = %self.addr, error = %e, "authentication failed");
                let code = match e {
                    AuthError::Expired => ErrorCode::TokenExpired,
                    AuthError::NotConfigured => ErrorCode::AuthFailed,
                    _ => ErrorCode::InvalidToken,
                };
                self.send(ServerMessage::AuthResult(AuthResult {
                    success: false,
                    player_id: None,
                    error: Some(e.to_string()),
                    server_version: self.version.clone(),
                }))
                .await;
                self.send_error(code, e.to_string()).await;
            }
        }
    }

    /// Seat the connection in a room.
    async fn handle_join(&mut self, req: JoinRequest) {
        if self.seat.is_some() {
            self.send_error(ErrorCode::AlreadyInRoom, "Already joined a room").await;
            return;
        }

        let player_id = match self.resolve_player(req.player_id.as_deref()) {
            Ok(id) => id,
            Err((code, message)) => {
                self.send_error(code, message).await;
                return;
            }
        };

        let opened = match req.room_id.as_deref() {
            Some(raw) => match RoomId::parse(raw) {
                Ok(id) => self.rooms.open(&id).await,
                Err(e) => {
                    self.send_error(ErrorCode::Validation, e.to_string()).await;
                    return;
                }
            },
            None => self.rooms.create().await,
        };
        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                self.send_room_error(&e).await;
                return;
            }
        };

        // Subscribe first so the join's own events reach this connection.
        let events = handle.subscribe();
        let outcome = match handle
            .act(player_id.clone(), TurnAction::Join { perspective: req.perspective })
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.send_room_error(&e).await;
                return;
            }
        };

        if let Some(err) = &outcome.error {
            self.send(ServerMessage::Ack(AckMessage {
                action: "join".into(),
                ack: outcome.ack,
                code: Some(error_code(err)),
            }))
            .await;
            return;
        }

        info!(addr = %self.addr, room = %handle.id(), player = %player_id, "joined room");
        let forwarder = spawn_forwarder(handle.clone(), events, self.outbox.clone());
        self.send(ServerMessage::Joined(JoinedInfo {
            room_id: handle.id().to_string(),
            player_id: player_id.to_string(),
            ack: outcome.ack,
        }))
        .await;
        self.seat = Some(Seat { handle, player_id, forwarder });
    }

    /// Route a turn operation to the seated room.
    async fn handle_action(&mut self, action: TurnAction) {
        let Some(seat) = &self.seat else {
            self.send_error(ErrorCode::NotInRoom, "Join a room first").await;
            return;
        };

        let name = action.name();
        debug!(room = %seat.handle.id(), player = %seat.player_id, action = name, "routing action");
        match seat.handle.act(seat.player_id.clone(), action).await {
            Ok(outcome) => {
                let code = outcome.error.as_ref().map(error_code);
                self.send(ServerMessage::Ack(AckMessage { action: name.into(), ack: outcome.ack, code }))
                    .await;
            }
            Err(e) => self.send_room_error(&e).await,
        }
    }

    /// Token identity when auth is configured, otherwise the claimed id.
    fn resolve_player(&self, claimed: Option<&str>) -> Result<PlayerId, (ErrorCode, String)> {
        if self.auth.is_configured() {
            return self
                .identity
                .clone()
                .ok_or((ErrorCode::NotAuthenticated, "Must authenticate first".to_string()));
        }
        let raw = claimed.ok_or((ErrorCode::Validation, "player_id is required".to_string()))?;
        PlayerId::parse(raw).map_err(|e| (ErrorCode::Validation, e.to_string()))
    }

    async fn room_handle(&self) -> Option<RoomHandle> {
        match &self.seat {
            Some(seat) => Some(seat.handle.clone()),
            None => {
                self.send_error(ErrorCode::NotInRoom, "Join a room first").await;
                None
            }
        }
    }

    async fn send(&self, msg: ServerMessage) {
        if self.outbox.send(msg).await.is_err() {
            debug!("Outbox closed for {}", self.addr);
        }
    }

    async fn send_error(&self, code: ErrorCode, message: impl Into<String>) {
        self.send(ServerMessage::Error(ServerError::new(code, message))).await;
    }

    async fn send_room_error(&self, err: &RoomError) {
        self.send_error(error_code(err), err.to_string()).await;
    }
}

fn error_code(err: &RoomError) -> ErrorCode {
    match err {
        RoomError::Turn(e) => ErrorCode::from(e),
        RoomError::Persist(_) | RoomError::Load(_) | RoomError::Closed => ErrorCode::RoomUnavailable,
    }
}

/// Forward room events to a connection. A lagged subscriber gets the full
/// room state in place of the events it missed.
fn spawn_forwarder(
    handle: RoomHandle,
    mut events: broadcast::Receiver<PushEvent>,
    outbox: mpsc::Sender<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let room_id = handle.id().to_string();
        loop {
            let msg = match events.recv().await {
                Ok(event) => ServerMessage::Event { room_id: room_id.clone(), event },
                Err(RecvError::Lagged(missed)) => {
                    debug!(room = %room_id, missed, "subscriber lagged, sending state");
                    match handle.get_state().await {
                        Ok(view) => ServerMessage::State(view),
                        Err(_) => break,
                    }
                }
                Err(RecvError::Closed) => break,
            };
            if outbox.send(msg).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::game::config::ProtocolConfig;
    use crate::game::events::PushEventKind;
    use crate::network::auth::TokenClaims;
    use crate::store::MemoryRoomStore;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use std::time::Duration;

    const SECRET: &str = "table-secret-key-256-bits-long!!";

    fn rooms() -> Arc<RoomManager> {
        Arc::new(RoomManager::new(
            Arc::new(MemoryRoomStore::new()),
            Arc::new(ManualClock::new(1_000)),
            ProtocolConfig::default(),
        ))
    }

    fn session(
        rooms: Arc<RoomManager>,
        auth: AuthConfig,
    ) -> (ClientSession, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(64);
        let addr = SocketAddr::from(([127, 0, 0, 1], 9000));
        (ClientSession::new(addr, Arc::new(auth), rooms, "test".into(), tx), rx)
    }

    fn join(room: &str, player: &str) -> ClientMessage {
        ClientMessage::Join(JoinRequest {
            room_id: Some(room.into()),
            player_id: Some(player.into()),
            perspective: None,
        })
    }

    /// Next message matching `pred`, skipping others.
    async fn expect<F>(rx: &mut mpsc::Receiver<ServerMessage>, pred: F) -> ServerMessage
    where
        F: Fn(&ServerMessage) -> bool,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for message")
                .expect("outbox closed");
            if pred(&msg) {
                return msg;
            }
        }
    }

    fn error_with(code: ErrorCode) -> impl Fn(&ServerMessage) -> bool {
        move |m| matches!(m, ServerMessage::Error(e) if e.code == code)
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.messages_per_second, 20);
        assert!(config.data_dir.is_none());
    }

    #[tokio::test]
    async fn test_server_creation_and_shutdown() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = DiceServer::new(config, AuthConfig::default(), rooms());

        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.room_count().await, 0);
        server.shutdown();
    }

    #[test]
    fn test_connection_limiter_burst() {
        let limiter = connection_limiter(2);

        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[test]
    fn test_connection_limiter_zero_allows_one() {
        let limiter = connection_limiter(0);

        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[tokio::test]
    async fn test_action_before_join_is_rejected() {
        let (mut s, mut rx) = session(rooms(), AuthConfig::default());
        s.handle(ClientMessage::FinalizeTurn).await;
        expect(&mut rx, error_with(ErrorCode::NotInRoom)).await;

        s.handle(ClientMessage::GetState).await;
        expect(&mut rx, error_with(ErrorCode::NotInRoom)).await;
    }

    #[tokio::test]
    async fn test_join_requires_player_id_without_auth() {
        let (mut s, mut rx) = session(rooms(), AuthConfig::default());
        s.handle(ClientMessage::Join(JoinRequest::default())).await;
        expect(&mut rx, error_with(ErrorCode::Validation)).await;

        s.handle(join("table", "bad id!")).await;
        expect(&mut rx, error_with(ErrorCode::Validation)).await;
        assert!(s.seat().is_none());
    }

    #[tokio::test]
    async fn test_join_and_play_through_sessions() {
        let rooms = rooms();
        let (mut alice, mut alice_rx) = session(rooms.clone(), AuthConfig::default());
        let (mut bob, mut bob_rx) = session(rooms.clone(), AuthConfig::default());

        alice.handle(join("table", "alice")).await;
        expect(&mut alice_rx, |m| matches!(m, ServerMessage::Joined(j) if j.ack.success)).await;
        bob.handle(join("table", "bob")).await;
        expect(&mut bob_rx, |m| matches!(m, ServerMessage::Joined(_))).await;

        // Alice sees the game start through her forwarder.
        expect(&mut alice_rx, |m| {
            matches!(m, ServerMessage::Event { event, .. } if event.kind == PushEventKind::GameStarted)
        })
        .await;

        alice.handle(join("table", "alice")).await;
        expect(&mut alice_rx, error_with(ErrorCode::AlreadyInRoom)).await;

        // Out of turn.
        bob.handle(ClientMessage::SubmitPreRollFrame { frame_hash: "ab".repeat(32) }).await;
        let msg = expect(&mut bob_rx, |m| matches!(m, ServerMessage::Ack(_))).await;
        match msg {
            ServerMessage::Ack(ack) => {
                assert_eq!(ack.action, "submit_pre_roll_frame");
                assert!(!ack.ack.success);
                assert_eq!(ack.code, Some(ErrorCode::Conflict));
            }
            other => panic!("unexpected {:?}", other),
        }

        alice.handle(ClientMessage::GetState).await;
        let msg = expect(&mut alice_rx, |m| matches!(m, ServerMessage::State(_))).await;
        match msg {
            ServerMessage::State(view) => {
                assert_eq!(view.players.len(), 2);
                assert_eq!(view.chain_length, 1);
            }
            other => panic!("unexpected {:?}", other),
        }

        alice.handle(ClientMessage::VerifyChain).await;
        expect(&mut alice_rx, |m| matches!(m, ServerMessage::ChainVerified(v) if v.valid)).await;
    }

    #[tokio::test]
    async fn test_third_player_is_refused() {
        let rooms = rooms();
        for p in ["alice", "bob"] {
            let (mut s, mut rx) = session(rooms.clone(), AuthConfig::default());
            s.handle(join("table", p)).await;
            expect(&mut rx, |m| matches!(m, ServerMessage::Joined(_))).await;
        }

        let (mut carol, mut rx) = session(rooms, AuthConfig::default());
        carol.handle(join("table", "carol")).await;
        let msg = expect(&mut rx, |m| matches!(m, ServerMessage::Ack(_))).await;
        match msg {
            ServerMessage::Ack(ack) => assert_eq!(ack.code, Some(ErrorCode::Conflict)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(carol.seat().is_none());
    }

    #[tokio::test]
    async fn test_join_requires_token_when_auth_configured() {
        let auth = AuthConfig { secret: Some(SECRET.into()), ..Default::default() };
        let (mut s, mut rx) = session(rooms(), auth);

        s.handle(join("table", "alice")).await;
        expect(&mut rx, error_with(ErrorCode::NotAuthenticated)).await;

        let now = chrono::Utc::now().timestamp() as u64;
        let claims = TokenClaims { sub: "user-1".into(), exp: now + 600, iat: now, iss: None, aud: None };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        s.handle(ClientMessage::Auth(AuthRequest { token, client_version: "1".into() })).await;
        expect(&mut rx, |m| matches!(m, ServerMessage::AuthResult(r) if r.success)).await;

        // The claimed id is ignored in favour of the token subject.
        s.handle(join("table", "alice")).await;
        expect(&mut rx, |m| matches!(m, ServerMessage::Joined(_))).await;
        let (_, player) = s.seat().unwrap();
        assert_eq!(player, &claims.player_id().unwrap());
    }

    #[tokio::test]
    async fn test_bad_token_is_rejected() {
        let auth = AuthConfig { secret: Some(SECRET.into()), ..Default::default() };
        let (mut s, mut rx) = session(rooms(), auth);

        s.handle(ClientMessage::Auth(AuthRequest { token: "nope".into(), client_version: "1".into() }))
            .await;
        expect(&mut rx, |m| matches!(m, ServerMessage::AuthResult(r) if !r.success)).await;
        expect(&mut rx, error_with(ErrorCode::InvalidToken)).await;
    }

    #[tokio::test]
    async fn test_ping_and_leave() {
        let (mut s, mut rx) = session(rooms(), AuthConfig::default());
        s.handle(ClientMessage::Ping { timestamp: 42 }).await;
        expect(&mut rx, |m| matches!(m, ServerMessage::Pong { timestamp: 42, .. })).await;

        s.handle(join("table", "alice")).await;
        expect(&mut rx, |m| matches!(m, ServerMessage::Joined(_))).await;
        s.handle(ClientMessage::Leave).await;
        assert!(s.seat().is_none());
    }
}
