//! Turn State Machine
//!
//! Every room operation is a method on `Room` that either fails without
//! touching the room or performs exactly one transition. Protocol
//! violations are transitions too: they append a chain event and penalise
//! the player, then report the reasons back through `Transition`.
//!
//! ## Phase order
//!
//! ```text
//! (checklist) -> pre-roll frame -> commit -> reveal -> declare -> evidence
//!                     ^             |                    ^          |
//!                     +-- bad reveal+                    +-- reroll-+
//!                                                                   |
//!                         finalize <- (confirmation if uncertain) <-+
//! ```
//!
//! Callers own the clock: `now` is passed in so that the actor can use a
//! system clock and tests a manual one.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::core::clock::TimestampMs;
use crate::core::hash::HexDigest;
use crate::game::config::ProtocolConfig;
use crate::game::events::{PushEvent, PushEventKind};
use crate::game::state::{
    Checklist, Committed, Declared, PhaseName, Player, PlayerId, PreRoll, Revealed, Room,
    RoomStatus, TurnPhase, TurnRecord, ROOM_CAPACITY,
};
use crate::proof::chain::{ChainEvent, ChainEventType};
use crate::proof::commitment::{self, validate_salt};
use crate::proof::evidence::{validate, EvidenceContext, EvidencePackage, EvidenceStatus, MAX_FACE};
use crate::trust::reputation::ReputationTier;

/// Longest accepted dispute reason, in characters.
pub const MAX_DISPUTE_REASON_LEN: usize = 500;

// =============================================================================
// ERRORS
// =============================================================================

/// A limit that ends the turn for this player until arbitration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Exhaustion {
    /// The turn used every reroll.
    #[error("max rerolls reached ({max})")]
    MaxRerollsReached {
        /// Configured limit.
        max: u32,
    },

    /// The player reached the suspension threshold.
    #[error("player {player} is suspended")]
    Suspended {
        /// Suspended player.
        player: PlayerId,
    },
}

/// Rejected operation. The room is unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TurnError {
    /// Malformed input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Wrong phase or wrong player.
    #[error("not allowed: {0}")]
    Conflict(String),

    /// A limit was reached.
    #[error(transparent)]
    Exhaustion(#[from] Exhaustion),

    /// Unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TurnError {
    /// Machine-readable code for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Exhaustion(Exhaustion::MaxRerollsReached { .. }) => "max_rerolls_reached",
            Self::Exhaustion(Exhaustion::Suspended { .. }) => "suspended",
            Self::Internal(_) => "internal",
        }
    }
}

fn wrong_phase(expected: PhaseName, actual: PhaseName) -> TurnError {
    TurnError::Conflict(format!("expected phase {:?}, turn is in {:?}", expected, actual))
}

fn parse_digest(field: &str, raw: &str) -> Result<HexDigest, TurnError> {
    raw.parse()
        .map_err(|e| TurnError::Validation(format!("{}: {}", field, e)))
}

// =============================================================================
// TRANSITIONS
// =============================================================================

/// Effect of a successful operation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transition {
    /// Chain event appended, if any.
    pub event: Option<ChainEvent>,
    /// Push events for subscribers, in order.
    pub push: Vec<PushEvent>,
    /// Violation reasons; empty for a clean transition.
    pub violations: Vec<String>,
}

impl Transition {
    fn none() -> Self {
        Self::default()
    }

    fn notify(mut self, kind: PushEventKind, payload: serde_json::Value) -> Self {
        self.push.push(PushEvent::new(kind, payload));
        self
    }

    fn recorded(mut self, event: ChainEvent) -> Self {
        self.push.push(PushEvent::from_chain(&event));
        self.event = Some(event);
        self
    }

    fn violation(mut self, reasons: Vec<String>) -> Self {
        self.violations = reasons;
        self
    }

    /// Whether the operation recorded a violation.
    pub fn is_violation(&self) -> bool {
        !self.violations.is_empty()
    }
}

/// A room operation requested by a player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TurnAction {
    /// Take a seat (or reconnect).
    Join {
        /// Display metadata.
        #[serde(default)]
        perspective: Option<String>,
    },
    /// Pass the setup checklist.
    SubmitChecklist {
        /// The four items.
        checklist: Checklist,
    },
    /// Publish the baseline frame.
    SubmitPreRollFrame {
        /// Hex digest.
        frame_hash: String,
    },
    /// Publish `H(salt | player | turn)`.
    Commit {
        /// Hex digest.
        commitment_hash: String,
    },
    /// Reveal the salt.
    Reveal {
        /// Hex salt.
        salt: String,
    },
    /// Declare the rolled face.
    DeclareRoll {
        /// Face 1-6.
        value: i64,
        /// Hex digest of the settled die.
        post_roll_frame_hash: String,
    },
    /// Submit detector evidence.
    SubmitEvidence {
        /// The package.
        evidence: EvidencePackage,
    },
    /// Opponent's verdict on uncertain evidence.
    ConfirmEvidence {
        /// Whether the opponent accepts the declaration.
        agree: bool,
    },
    /// Clear the declaration and evidence and roll again.
    RequestReroll,
    /// Halt the game for arbitration.
    Dispute {
        /// Free text.
        reason: String,
    },
    /// Close the turn.
    FinalizeTurn,
}

impl TurnAction {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::SubmitChecklist { .. } => "submit_checklist",
            Self::SubmitPreRollFrame { .. } => "submit_pre_roll_frame",
            Self::Commit { .. } => "commit",
            Self::Reveal { .. } => "reveal",
            Self::DeclareRoll { .. } => "declare_roll",
            Self::SubmitEvidence { .. } => "submit_evidence",
            Self::ConfirmEvidence { .. } => "confirm_evidence",
            Self::RequestReroll => "request_reroll",
            Self::Dispute { .. } => "dispute",
            Self::FinalizeTurn => "finalize_turn",
        }
    }
}

impl Room {
    /// Dispatch an action to its transition.
    pub fn apply(
        &mut self,
        player_id: &PlayerId,
        action: TurnAction,
        config: &ProtocolConfig,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        match action {
            TurnAction::Join { perspective } => self.join(player_id.clone(), perspective, now),
            TurnAction::SubmitChecklist { checklist } => {
                self.submit_checklist(player_id, checklist, config)
            }
            TurnAction::SubmitPreRollFrame { frame_hash } => {
                self.submit_pre_roll_frame(player_id, &frame_hash, config, now)
            }
            TurnAction::Commit { commitment_hash } => {
                self.commit(player_id, &commitment_hash, config, now)
            }
            TurnAction::Reveal { salt } => self.reveal(player_id, &salt, config, now),
            TurnAction::DeclareRoll { value, post_roll_frame_hash } => {
                self.declare_roll(player_id, value, &post_roll_frame_hash, config, now)
            }
            TurnAction::SubmitEvidence { evidence } => {
                self.submit_evidence(player_id, evidence, config, now)
            }
            TurnAction::ConfirmEvidence { agree } => {
                self.confirm_evidence(player_id, agree, config, now)
            }
            TurnAction::RequestReroll => self.request_reroll(player_id, config, now),
            TurnAction::Dispute { reason } => self.dispute(player_id, &reason, now),
            TurnAction::FinalizeTurn => self.finalize_turn(player_id, config, now),
        }
    }

    // -------------------------------------------------------------------------
    // Seating
    // -------------------------------------------------------------------------

    /// Seat a player. The second seat starts turn 1. A player already
    /// seated is acknowledged without any change.
    pub fn join(
        &mut self,
        player_id: PlayerId,
        perspective: Option<String>,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        if self.player(&player_id).is_some() {
            return Ok(Transition::none());
        }
        self.ensure_open()?;
        if self.status != RoomStatus::Pending || self.players.len() >= ROOM_CAPACITY {
            return Err(TurnError::Conflict("room is full".into()));
        }

        let seat = self.players.len();
        self.players.push(Player::new(player_id.clone(), now, perspective));
        let mut transition = Transition::none().notify(
            PushEventKind::PlayerJoined,
            json!({ "playerId": player_id, "seat": seat }),
        );

        if self.players.len() == ROOM_CAPACITY {
            self.status = RoomStatus::Active;
            self.turn_index = 0;
            self.turn_number = 1;
            let first = self.players[0].id.clone();
            self.turns.insert(1, TurnRecord::new(1, first.clone(), now));

            let players: Vec<&PlayerId> = self.players.iter().map(|p| &p.id).collect();
            let event = self.hash_chain.append(
                ChainEventType::GameStarted,
                json!({ "players": players, "firstPlayer": first, "turnNumber": 1 }),
                now,
            );
            info!(room = %self.id, first_player = %first, "game started");
            transition = transition.recorded(event);
        }

        Ok(transition)
    }

    /// Record a passed setup checklist. All four items must be checked.
    pub fn submit_checklist(
        &mut self,
        player_id: &PlayerId,
        checklist: Checklist,
        config: &ProtocolConfig,
    ) -> Result<Transition, TurnError> {
        let missing = checklist.missing();
        if !missing.is_empty() {
            return Err(TurnError::Validation(format!(
                "checklist incomplete: {}",
                missing.join(", ")
            )));
        }
        self.ensure_open()?;
        self.ensure_can_play(player_id, config)?;

        if let Some(player) = self.player_mut(player_id) {
            player.checklist_complete = true;
        }
        Ok(Transition::none().notify(
            PushEventKind::ChecklistCompleted,
            json!({ "playerId": player_id }),
        ))
    }

    // -------------------------------------------------------------------------
    // Commit / reveal
    // -------------------------------------------------------------------------

    /// Publish the pre-roll baseline frame.
    pub fn submit_pre_roll_frame(
        &mut self,
        player_id: &PlayerId,
        frame_hash: &str,
        config: &ProtocolConfig,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        let frame = parse_digest("frameHash", frame_hash)?;
        self.ensure_acting(player_id, config)?;
        if !self.player(player_id).map(|p| p.checklist_complete).unwrap_or(false) {
            return Err(TurnError::Conflict("setup checklist has not been completed".into()));
        }

        let turn = self.turn_mut()?;
        if !matches!(turn.phase, TurnPhase::AwaitingPreRollFrame) {
            return Err(wrong_phase(PhaseName::AwaitingPreRollFrame, turn.phase.name()));
        }
        turn.phase = TurnPhase::AwaitingCommitment(PreRoll {
            pre_roll_frame_hash: frame,
            submitted_at: now,
        });

        let turn_number = self.turn_number;
        Ok(self.record(
            ChainEventType::PreRollFrameSubmitted,
            json!({ "playerId": player_id, "turnNumber": turn_number, "preRollFrameHash": frame }),
            now,
        ))
    }

    /// Publish the commitment hash.
    pub fn commit(
        &mut self,
        player_id: &PlayerId,
        commitment_hash: &str,
        config: &ProtocolConfig,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        let commitment_hash = parse_digest("commitmentHash", commitment_hash)?;
        self.ensure_acting(player_id, config)?;

        let turn = self.turn_mut()?;
        let pre_roll = match &turn.phase {
            TurnPhase::AwaitingCommitment(pre_roll) => pre_roll.clone(),
            other => return Err(wrong_phase(PhaseName::AwaitingCommitment, other.name())),
        };
        turn.phase = TurnPhase::AwaitingReveal(Committed {
            pre_roll,
            commitment_hash,
            commit_timestamp: now,
        });

        let turn_number = self.turn_number;
        Ok(self.record(
            ChainEventType::CommitmentMade,
            json!({ "playerId": player_id, "turnNumber": turn_number, "commitmentHash": commitment_hash }),
            now,
        ))
    }

    /// Reveal the salt. A mismatch or a reveal after the commit window is
    /// a violation that sends the turn back to the pre-roll frame.
    pub fn reveal(
        &mut self,
        player_id: &PlayerId,
        salt: &str,
        config: &ProtocolConfig,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        validate_salt(salt).map_err(|e| TurnError::Validation(e.to_string()))?;
        self.ensure_acting(player_id, config)?;

        let turn_number = self.turn_number;
        let turn = self.turn_mut()?;
        let committed = match &turn.phase {
            TurnPhase::AwaitingReveal(committed) => committed.clone(),
            other => return Err(wrong_phase(PhaseName::AwaitingReveal, other.name())),
        };

        let mut reasons = Vec::new();
        let elapsed = now - committed.commit_timestamp;
        if elapsed > config.commit_reveal_window_ms {
            reasons.push(format!(
                "reveal {} ms after commitment exceeds {} ms window",
                elapsed, config.commit_reveal_window_ms
            ));
        }
        if !commitment::verify(&committed.commitment_hash, salt, player_id.as_str(), turn_number) {
            reasons.push("revealed salt does not match commitment".to_string());
        }

        if !reasons.is_empty() {
            turn.phase = TurnPhase::AwaitingPreRollFrame;
            self.penalise(player_id);
            warn!(room = %self.id, player = %player_id, turn = turn_number, ?reasons, "reveal rejected");
            return Ok(self
                .record(
                    ChainEventType::RevealRejected,
                    json!({
                        "playerId": player_id,
                        "turnNumber": turn_number,
                        "commitmentHash": committed.commitment_hash,
                        "reasons": reasons,
                    }),
                    now,
                )
                .violation(reasons));
        }

        turn.phase = TurnPhase::AwaitingDeclaration(Revealed {
            committed: committed.clone(),
            revealed_salt: salt.to_string(),
            reveal_timestamp: now,
            window_start: now,
        });
        Ok(self.record(
            ChainEventType::CommitmentRevealed,
            json!({
                "playerId": player_id,
                "turnNumber": turn_number,
                "commitmentHash": committed.commitment_hash,
                "salt": salt,
            }),
            now,
        ))
    }

    // -------------------------------------------------------------------------
    // Declaration and evidence
    // -------------------------------------------------------------------------

    /// Declare the rolled face.
    pub fn declare_roll(
        &mut self,
        player_id: &PlayerId,
        value: i64,
        post_roll_frame_hash: &str,
        config: &ProtocolConfig,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        if !(1..=i64::from(MAX_FACE)).contains(&value) {
            return Err(TurnError::Validation(format!("declared value {} outside 1-{}", value, MAX_FACE)));
        }
        let post_roll = parse_digest("postRollFrameHash", post_roll_frame_hash)?;
        self.ensure_acting(player_id, config)?;

        let turn = self.turn_mut()?;
        let revealed = match &turn.phase {
            TurnPhase::AwaitingDeclaration(revealed) => revealed.clone(),
            other => return Err(wrong_phase(PhaseName::AwaitingDeclaration, other.name())),
        };
        turn.phase = TurnPhase::AwaitingEvidence(Declared {
            revealed,
            declared_value: value as u8,
            post_roll_frame_hash: post_roll,
            declare_timestamp: now,
        });

        let turn_number = self.turn_number;
        Ok(self.record(
            ChainEventType::RollDeclared,
            json!({
                "playerId": player_id,
                "turnNumber": turn_number,
                "declaredValue": value,
                "postRollFrameHash": post_roll,
            }),
            now,
        ))
    }

    /// Validate and vote on evidence for the declared roll.
    ///
    /// Structural problems are rejected outright. Timing, motion and
    /// duplicate-frame problems flag the evidence, penalise the player and
    /// leave the phase where it is; only a reroll moves on from there.
    pub fn submit_evidence(
        &mut self,
        player_id: &PlayerId,
        evidence: EvidencePackage,
        config: &ProtocolConfig,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        self.ensure_acting(player_id, config)?;
        let turn_number = self.turn_number;

        let turn = self.current_turn().ok_or_else(|| TurnError::Internal("no current turn".into()))?;
        let declared = match &turn.phase {
            TurnPhase::AwaitingEvidence(declared) => declared.clone(),
            other => return Err(wrong_phase(PhaseName::AwaitingEvidence, other.name())),
        };
        if turn.flagged {
            return Err(TurnError::Conflict("evidence was flagged; request a reroll".into()));
        }

        let ctx = EvidenceContext {
            turn_number,
            window_start: declared.revealed.window_start,
            seen_frames: &self.seen_frames,
        };
        let mut result = validate(&evidence, &ctx, &config.evidence_rules());
        if result.is_structural() {
            let detail: Vec<String> = result.reasons.iter().map(ToString::to_string).collect();
            return Err(TurnError::Validation(detail.join("; ")));
        }

        let digest = evidence.digest().map_err(|e| TurnError::Internal(e.to_string()))?;
        let frames: Vec<HexDigest> = evidence
            .frame_hashes
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        self.seen_frames.extend(frames);
        let algorithm_version = evidence.algorithm_version.clone();
        self.evidence.insert(turn_number, evidence);

        if result.status == EvidenceStatus::Flagged {
            let reasons: Vec<String> = result.reasons.iter().map(ToString::to_string).collect();
            let flags = result.reasons.clone();
            let turn = self.turn_mut()?;
            turn.flagged = true;
            turn.evidence_result = Some(result);
            self.penalise(player_id);
            warn!(room = %self.id, player = %player_id, turn = turn_number, ?reasons, "evidence flagged");
            return Ok(self
                .record(
                    ChainEventType::EvidenceFlagged,
                    json!({
                        "playerId": player_id,
                        "turnNumber": turn_number,
                        "evidenceDigest": digest,
                        "flags": flags,
                    }),
                    now,
                )
                .violation(reasons));
        }

        let accepted =
            result.status == EvidenceStatus::Verified && result.value == Some(declared.declared_value);
        if result.status == EvidenceStatus::Verified && !accepted {
            result.status = EvidenceStatus::Uncertain;
        }

        let payload = json!({
            "playerId": player_id,
            "turnNumber": turn_number,
            "evidenceDigest": digest,
            "status": result.status,
            "value": result.value,
            "confidence": result.confidence,
            "matchCount": result.match_count,
            "declaredValue": declared.declared_value,
            "algorithmVersion": algorithm_version,
        });

        let turn = self.turn_mut()?;
        turn.evidence_result = Some(result);
        turn.phase = if accepted {
            TurnPhase::AwaitingFinalize { declared }
        } else {
            TurnPhase::AwaitingConfirmation { declared, disagreed: false }
        };

        Ok(self.record(ChainEventType::EvidenceSubmitted, payload, now))
    }

    /// Opponent accepts or rejects uncertain evidence.
    pub fn confirm_evidence(
        &mut self,
        player_id: &PlayerId,
        agree: bool,
        config: &ProtocolConfig,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        self.ensure_active()?;
        self.ensure_can_play(player_id, config)?;
        if self.acting_player().map(|p| &p.id == player_id).unwrap_or(false) {
            return Err(TurnError::Conflict("only the opponent can confirm evidence".into()));
        }

        let turn_number = self.turn_number;
        let turn = self.turn_mut()?;
        let declared = match &turn.phase {
            TurnPhase::AwaitingConfirmation { disagreed: true, .. } => {
                return Err(TurnError::Conflict(
                    "evidence already rejected; awaiting reroll or dispute".into(),
                ))
            }
            TurnPhase::AwaitingConfirmation { declared, .. } => declared.clone(),
            other => return Err(wrong_phase(PhaseName::AwaitingConfirmation, other.name())),
        };
        let declared_value = declared.declared_value;

        if agree {
            turn.phase = TurnPhase::AwaitingFinalize { declared };
            Ok(self.record(
                ChainEventType::EvidenceConfirmed,
                json!({ "confirmedBy": player_id, "turnNumber": turn_number, "declaredValue": declared_value }),
                now,
            ))
        } else {
            turn.phase = TurnPhase::AwaitingConfirmation { declared, disagreed: true };
            Ok(self.record(
                ChainEventType::EvidenceRejected,
                json!({ "rejectedBy": player_id, "turnNumber": turn_number, "declaredValue": declared_value }),
                now,
            ))
        }
    }

    /// Clear the declaration and evidence and return to AwaitingDeclaration.
    ///
    /// Available after the opponent disagreed, or after flagged evidence.
    /// The detection window restarts now.
    pub fn request_reroll(
        &mut self,
        player_id: &PlayerId,
        config: &ProtocolConfig,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        self.ensure_acting(player_id, config)?;
        let turn_number = self.turn_number;

        let turn = self.current_turn().ok_or_else(|| TurnError::Internal("no current turn".into()))?;
        let declared = match &turn.phase {
            TurnPhase::AwaitingConfirmation { declared, disagreed: true } => declared.clone(),
            TurnPhase::AwaitingEvidence(declared) if turn.flagged => declared.clone(),
            other => {
                return Err(TurnError::Conflict(format!(
                    "reroll needs rejected or flagged evidence, turn is in {:?}",
                    other.name()
                )))
            }
        };
        if turn.reroll_count >= config.max_rerolls {
            return Err(Exhaustion::MaxRerollsReached { max: config.max_rerolls }.into());
        }

        let superseded_digest = match self.evidence.remove(&turn_number) {
            Some(package) => Some(package.digest().map_err(|e| TurnError::Internal(e.to_string()))?),
            None => None,
        };

        let turn = self.turn_mut()?;
        turn.reroll_count += 1;
        turn.flagged = false;
        turn.evidence_result = None;
        let reroll_count = turn.reroll_count;
        turn.phase = TurnPhase::AwaitingDeclaration(Revealed {
            window_start: now,
            ..declared.revealed.clone()
        });

        info!(room = %self.id, player = %player_id, turn = turn_number, reroll_count, "reroll");
        Ok(self.record(
            ChainEventType::RerollRequested,
            json!({
                "playerId": player_id,
                "turnNumber": turn_number,
                "rerollCount": reroll_count,
                "superseded": {
                    "declaredValue": declared.declared_value,
                    "postRollFrameHash": declared.post_roll_frame_hash,
                    "evidenceDigest": superseded_digest,
                },
            }),
            now,
        ))
    }

    // -------------------------------------------------------------------------
    // Closing
    // -------------------------------------------------------------------------

    /// Halt the room for external arbitration. Any seated player may
    /// dispute, including a suspended one.
    pub fn dispute(
        &mut self,
        player_id: &PlayerId,
        reason: &str,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(TurnError::Validation("dispute reason is required".into()));
        }
        if reason.chars().count() > MAX_DISPUTE_REASON_LEN {
            return Err(TurnError::Validation(format!(
                "dispute reason longer than {} characters",
                MAX_DISPUTE_REASON_LEN
            )));
        }
        self.ensure_open()?;
        if self.player(player_id).is_none() {
            return Err(TurnError::Conflict("player is not seated in this room".into()));
        }

        let from = self.current_phase();
        let turn_number = self.turn_number;
        if let Some(turn) = self.turns.get_mut(&turn_number) {
            if let Some(from) = from {
                turn.phase = TurnPhase::Disputed {
                    disputed_by: player_id.clone(),
                    reason: reason.to_string(),
                    from,
                    disputed_at: now,
                };
            }
        }
        self.status = RoomStatus::Disputed;

        warn!(room = %self.id, player = %player_id, turn = turn_number, reason, "game disputed");
        Ok(self.record(
            ChainEventType::GameDisputed,
            json!({
                "playerId": player_id,
                "turnNumber": turn_number,
                "phase": from,
                "reason": reason,
            }),
            now,
        ))
    }

    /// Close the turn, count the outcome and pass the turn.
    pub fn finalize_turn(
        &mut self,
        player_id: &PlayerId,
        config: &ProtocolConfig,
        now: TimestampMs,
    ) -> Result<Transition, TurnError> {
        self.ensure_active()?;
        self.ensure_can_play(player_id, config)?;

        let turn_number = self.turn_number;
        let turn = self.turn_mut()?;
        let declared = match &turn.phase {
            TurnPhase::AwaitingFinalize { declared } => declared.clone(),
            other => return Err(wrong_phase(PhaseName::AwaitingFinalize, other.name())),
        };
        let value = declared.declared_value;
        let evidence_status = turn.evidence_result.as_ref().map(|r| r.status);
        let reroll_count = turn.reroll_count;
        let actor = turn.player_id.clone();
        turn.phase = TurnPhase::Finalized { declared, value, finalized_at: now };

        let fairness_rules = config.fairness_rules();
        if let Some(player) = self.player_mut(&actor) {
            player.roll_count += 1;
            player.fairness.record(value, &fairness_rules);
        }
        self.fairness.record(value, &fairness_rules);
        self.finalized_turns += 1;

        let completed = config.max_turns.map(|max| self.finalized_turns >= max).unwrap_or(false);
        let (next_player, next_turn) = if completed {
            self.status = RoomStatus::Completed;
            (None, None)
        } else {
            self.turn_index = (self.turn_index + 1) % self.players.len().max(1);
            self.turn_number += 1;
            let next = self.players[self.turn_index].id.clone();
            self.turns
                .insert(self.turn_number, TurnRecord::new(self.turn_number, next.clone(), now));
            (Some(next), Some(self.turn_number))
        };

        info!(room = %self.id, player = %actor, turn = turn_number, value, completed, "roll finalized");
        Ok(self.record(
            ChainEventType::RollFinalized,
            json!({
                "playerId": actor,
                "finalizedBy": player_id,
                "turnNumber": turn_number,
                "value": value,
                "evidenceStatus": evidence_status,
                "rerollCount": reroll_count,
                "nextPlayer": next_player,
                "nextTurnNumber": next_turn,
                "gameCompleted": completed,
            }),
            now,
        ))
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn record(
        &mut self,
        event_type: ChainEventType,
        data: serde_json::Value,
        now: TimestampMs,
    ) -> Transition {
        let event = self.hash_chain.append(event_type, data, now);
        Transition::none().recorded(event)
    }

    fn penalise(&mut self, player_id: &PlayerId) {
        if let Some(player) = self.player_mut(player_id) {
            player.violation_count += 1;
        }
    }

    fn turn_mut(&mut self) -> Result<&mut TurnRecord, TurnError> {
        let turn_number = self.turn_number;
        self.turns
            .get_mut(&turn_number)
            .ok_or_else(|| TurnError::Internal(format!("turn {} has no record", turn_number)))
    }

    /// Room is neither disputed nor completed.
    fn ensure_open(&self) -> Result<(), TurnError> {
        match self.status {
            RoomStatus::Disputed => Err(TurnError::Conflict("room is disputed".into())),
            RoomStatus::Completed => Err(TurnError::Conflict("game is completed".into())),
            RoomStatus::Pending | RoomStatus::Active => Ok(()),
        }
    }

    /// Room is mid-game.
    fn ensure_active(&self) -> Result<(), TurnError> {
        self.ensure_open()?;
        if self.status == RoomStatus::Pending {
            return Err(TurnError::Conflict("game has not started".into()));
        }
        Ok(())
    }

    /// Player is seated and not suspended.
    fn ensure_can_play(&self, player_id: &PlayerId, config: &ProtocolConfig) -> Result<(), TurnError> {
        let player = self
            .player(player_id)
            .ok_or_else(|| TurnError::Conflict("player is not seated in this room".into()))?;
        if player.tier(&config.reputation_rules()) == ReputationTier::Suspended {
            return Err(Exhaustion::Suspended { player: player_id.clone() }.into());
        }
        Ok(())
    }

    /// Player may act on the current turn.
    fn ensure_acting(&self, player_id: &PlayerId, config: &ProtocolConfig) -> Result<(), TurnError> {
        self.ensure_active()?;
        self.ensure_can_play(player_id, config)?;
        if self.acting_player().map(|p| &p.id != player_id).unwrap_or(true) {
            return Err(TurnError::Conflict("not this player's turn".into()));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::commitment::commit;
    use crate::trust::fairness::FairnessStatus;

    const T0: TimestampMs = 1_700_000_000_000;
    const SALT: &str = "5eed5eed5eed5eed0123456789abcdef";

    fn pid(s: &str) -> PlayerId {
        PlayerId::parse(s).unwrap()
    }

    fn digest(tag: &str) -> String {
        HexDigest::of(tag.as_bytes()).to_hex()
    }

    fn full_checklist() -> Checklist {
        Checklist {
            surface_clear: true,
            camera_fixed: true,
            lighting_adequate: true,
            single_die_visible: true,
        }
    }

    fn evidence(turn: u32, values: [i64; 3], timestamp: TimestampMs, tag: &str) -> EvidencePackage {
        EvidencePackage {
            turn_number: i64::from(turn),
            surface_hash: digest("surface"),
            frame_hashes: (0..3).map(|i| digest(&format!("{}-{}-{}", tag, turn, i))).collect(),
            dice_values: values.to_vec(),
            stabilization_time_ms: 600,
            residual_motion_score: 0.01,
            algorithm_version: "pip-detector/2".into(),
            timestamp: Some(timestamp),
        }
    }

    /// Room with alice and bob seated and both checklists passed.
    fn started_room() -> Room {
        let config = ProtocolConfig::default();
        let mut room = Room::new(crate::game::state::RoomId::parse("r1").unwrap(), T0);
        room.join(pid("alice"), None, T0).unwrap();
        room.join(pid("bob"), Some("overhead".into()), T0).unwrap();
        room.submit_checklist(&pid("alice"), full_checklist(), &config).unwrap();
        room.submit_checklist(&pid("bob"), full_checklist(), &config).unwrap();
        room
    }

    /// Drive the acting player up to AwaitingEvidence; returns reveal time.
    fn roll_to_evidence(room: &mut Room, player: &PlayerId, value: i64, now: TimestampMs) -> TimestampMs {
        let config = ProtocolConfig::default();
        let turn = room.turn_number;
        room.submit_pre_roll_frame(player, &digest("h0"), &config, now).unwrap();
        room.commit(player, &commit(SALT, player.as_str(), turn).to_hex(), &config, now + 100).unwrap();
        room.reveal(player, SALT, &config, now + 200).unwrap();
        room.declare_roll(player, value, &digest("h1"), &config, now + 300).unwrap();
        now + 200
    }

    #[test]
    fn test_end_to_end_turn() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let (alice, bob) = (pid("alice"), pid("bob"));
        assert_eq!(room.hash_chain.len(), 1);

        let reveal_at = roll_to_evidence(&mut room, &alice, 4, T0);
        let t = room
            .submit_evidence(&alice, evidence(1, [4, 4, 4], reveal_at + 1_000, "a"), &config, reveal_at + 1_000)
            .unwrap();
        assert!(!t.is_violation());
        let result = room.current_turn().unwrap().evidence_result.clone().unwrap();
        assert_eq!(result.status, EvidenceStatus::Verified);
        assert_eq!(result.confidence, 1.0);

        room.finalize_turn(&alice, &config, reveal_at + 2_000).unwrap();

        assert_eq!(room.turn_index, 1);
        assert_eq!(room.turn_number, 2);
        assert_eq!(room.acting_player().unwrap().id, bob);
        assert_eq!(room.hash_chain.len(), 7);
        assert!(room.hash_chain.verify().valid);
        assert_eq!(room.player(&alice).unwrap().roll_count, 1);
        assert_eq!(room.turns[&1].final_value(), Some(4));

        let types: Vec<ChainEventType> = room.hash_chain.events().iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                ChainEventType::GameStarted,
                ChainEventType::PreRollFrameSubmitted,
                ChainEventType::CommitmentMade,
                ChainEventType::CommitmentRevealed,
                ChainEventType::RollDeclared,
                ChainEventType::EvidenceSubmitted,
                ChainEventType::RollFinalized,
            ]
        );
    }

    #[test]
    fn test_join_rules() {
        let mut room = Room::new(crate::game::state::RoomId::parse("r2").unwrap(), T0);
        let first = room.join(pid("alice"), None, T0).unwrap();
        assert!(first.event.is_none());
        assert_eq!(first.push[0].kind, PushEventKind::PlayerJoined);
        assert_eq!(room.status, RoomStatus::Pending);

        let rejoin = room.join(pid("alice"), None, T0 + 1).unwrap();
        assert_eq!(rejoin, Transition::default());

        let second = room.join(pid("bob"), None, T0 + 2).unwrap();
        assert_eq!(second.event.unwrap().event_type, ChainEventType::GameStarted);
        assert_eq!(room.status, RoomStatus::Active);
        assert_eq!(room.turn_number, 1);

        assert!(matches!(room.join(pid("carol"), None, T0 + 3), Err(TurnError::Conflict(_))));
    }

    #[test]
    fn test_join_reports_closed_room() {
        let mut room = started_room();
        room.dispute(&pid("bob"), "die left the table", T0 + 5).unwrap();
        assert_eq!(
            room.join(pid("carol"), None, T0 + 6),
            Err(TurnError::Conflict("room is disputed".into()))
        );
        assert_eq!(room.join(pid("alice"), None, T0 + 7), Ok(Transition::default()));

        // a seat is still free in both rooms below
        let mut room = Room::new(crate::game::state::RoomId::parse("r9").unwrap(), T0);
        room.join(pid("alice"), None, T0).unwrap();
        room.dispute(&pid("alice"), "wrong table", T0 + 1).unwrap();
        assert_eq!(
            room.join(pid("bob"), None, T0 + 2),
            Err(TurnError::Conflict("room is disputed".into()))
        );

        let mut room = Room::new(crate::game::state::RoomId::parse("r10").unwrap(), T0);
        room.join(pid("alice"), None, T0).unwrap();
        room.status = RoomStatus::Completed;
        assert_eq!(
            room.join(pid("bob"), None, T0 + 1),
            Err(TurnError::Conflict("game is completed".into()))
        );
    }

    #[test]
    fn test_checklist_gate() {
        let config = ProtocolConfig::default();
        let mut room = Room::new(crate::game::state::RoomId::parse("r3").unwrap(), T0);
        room.join(pid("alice"), None, T0).unwrap();
        room.join(pid("bob"), None, T0).unwrap();
        assert_eq!(room.current_phase(), Some(PhaseName::AwaitingChecklist));

        let err = room.submit_pre_roll_frame(&pid("alice"), &digest("h0"), &config, T0).unwrap_err();
        assert!(matches!(err, TurnError::Conflict(_)));

        let partial = Checklist { surface_clear: true, ..Default::default() };
        let err = room.submit_checklist(&pid("alice"), partial, &config).unwrap_err();
        assert!(matches!(err, TurnError::Validation(_)));

        let chain_len = room.hash_chain.len();
        room.submit_checklist(&pid("alice"), full_checklist(), &config).unwrap();
        assert_eq!(room.hash_chain.len(), chain_len);
        assert_eq!(room.current_phase(), Some(PhaseName::AwaitingPreRollFrame));
    }

    #[test]
    fn test_phases_cannot_be_skipped() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let alice = pid("alice");

        let err = room.declare_roll(&alice, 4, &digest("h1"), &config, T0).unwrap_err();
        assert!(matches!(err, TurnError::Conflict(_)));
        let err = room.reveal(&alice, SALT, &config, T0).unwrap_err();
        assert!(matches!(err, TurnError::Conflict(_)));

        let err = room.submit_pre_roll_frame(&pid("bob"), &digest("h0"), &config, T0).unwrap_err();
        assert!(matches!(err, TurnError::Conflict(_)));
        assert_eq!(room.hash_chain.len(), 1);
    }

    #[test]
    fn test_malformed_input_is_validation() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let alice = pid("alice");

        let err = room.submit_pre_roll_frame(&alice, "not-a-hash", &config, T0).unwrap_err();
        assert!(matches!(err, TurnError::Validation(_)));

        roll_to_evidence(&mut room, &alice, 4, T0);
        let mut bad = evidence(1, [4, 4, 4], T0 + 1_000, "bad");
        bad.dice_values = vec![4, 4];
        let len = room.hash_chain.len();
        let err = room.submit_evidence(&alice, bad, &config, T0 + 1_000).unwrap_err();
        assert!(matches!(err, TurnError::Validation(_)));
        assert_eq!(room.hash_chain.len(), len);
        assert_eq!(room.player(&alice).unwrap().violation_count, 0);
        assert!(room.evidence.is_empty());
    }

    #[test]
    fn test_bad_reveal_is_violation() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let alice = pid("alice");

        room.submit_pre_roll_frame(&alice, &digest("h0"), &config, T0).unwrap();
        room.commit(&alice, &commit(SALT, "alice", 1).to_hex(), &config, T0).unwrap();
        let t = room.reveal(&alice, "ffffffffffffffffffffffffffffffff", &config, T0 + 10).unwrap();

        assert!(t.is_violation());
        assert_eq!(t.event.unwrap().event_type, ChainEventType::RevealRejected);
        assert_eq!(room.player(&alice).unwrap().violation_count, 1);
        assert_eq!(room.current_phase(), Some(PhaseName::AwaitingPreRollFrame));
    }

    #[test]
    fn test_late_reveal_is_violation() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let alice = pid("alice");

        room.submit_pre_roll_frame(&alice, &digest("h0"), &config, T0).unwrap();
        room.commit(&alice, &commit(SALT, "alice", 1).to_hex(), &config, T0).unwrap();
        let late = T0 + config.commit_reveal_window_ms + 1;
        let t = room.reveal(&alice, SALT, &config, late).unwrap();

        assert_eq!(t.violations.len(), 1);
        assert!(t.violations[0].contains("window"));
    }

    #[test]
    fn test_commitment_bound_to_turn() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let alice = pid("alice");

        room.submit_pre_roll_frame(&alice, &digest("h0"), &config, T0).unwrap();
        room.commit(&alice, &commit(SALT, "alice", 2).to_hex(), &config, T0).unwrap();
        let t = room.reveal(&alice, SALT, &config, T0 + 1).unwrap();
        assert!(t.is_violation());
    }

    #[test]
    fn test_timing_windows() {
        let config = ProtocolConfig::default();
        let alice = pid("alice");

        let mut room = started_room();
        let reveal_at = roll_to_evidence(&mut room, &alice, 4, T0);
        let t = room
            .submit_evidence(&alice, evidence(1, [4, 4, 4], reveal_at + 5_000, "ok"), &config, reveal_at + 5_000)
            .unwrap();
        assert!(!t.is_violation());

        let mut room = started_room();
        let reveal_at = roll_to_evidence(&mut room, &alice, 4, T0);
        let t = room
            .submit_evidence(&alice, evidence(1, [4, 4, 4], reveal_at + 15_000, "late"), &config, reveal_at + 15_000)
            .unwrap();
        assert!(t.is_violation());

        let mut room = started_room();
        let reveal_at = roll_to_evidence(&mut room, &alice, 4, T0);
        let t = room
            .submit_evidence(&alice, evidence(1, [4, 4, 4], reveal_at - 1, "early"), &config, reveal_at)
            .unwrap();
        assert!(t.is_violation());
    }

    #[test]
    fn test_extreme_evidence_timestamps_are_violations() {
        let config = ProtocolConfig::default();
        let alice = pid("alice");

        for timestamp in [i64::MIN, i64::MAX] {
            let mut room = started_room();
            let reveal_at = roll_to_evidence(&mut room, &alice, 4, T0);
            let t = room
                .submit_evidence(&alice, evidence(1, [4, 4, 4], timestamp, "edge"), &config, reveal_at + 1_000)
                .unwrap();

            assert!(t.is_violation());
            assert_eq!(t.event.unwrap().event_type, ChainEventType::EvidenceFlagged);
            assert_eq!(room.current_phase(), Some(PhaseName::AwaitingEvidence));
            assert!(room.hash_chain.verify().valid);
        }
    }

    #[test]
    fn test_flagged_evidence_holds_phase_until_reroll() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let alice = pid("alice");
        let reveal_at = roll_to_evidence(&mut room, &alice, 4, T0);

        let mut moved = evidence(1, [4, 4, 4], reveal_at + 1_000, "moved");
        moved.residual_motion_score = 0.4;
        let t = room.submit_evidence(&alice, moved, &config, reveal_at + 1_000).unwrap();

        assert!(t.is_violation());
        assert_eq!(t.event.unwrap().event_type, ChainEventType::EvidenceFlagged);
        assert_eq!(room.current_phase(), Some(PhaseName::AwaitingEvidence));
        assert_eq!(room.player(&alice).unwrap().violation_count, 1);

        let again = evidence(1, [4, 4, 4], reveal_at + 2_000, "again");
        assert!(matches!(
            room.submit_evidence(&alice, again, &config, reveal_at + 2_000),
            Err(TurnError::Conflict(_))
        ));

        let reroll_at = reveal_at + 20_000;
        let t = room.request_reroll(&alice, &config, reroll_at).unwrap();
        let event = t.event.unwrap();
        assert_eq!(event.event_type, ChainEventType::RerollRequested);
        assert!(event.data["superseded"]["evidenceDigest"].is_string());
        assert_eq!(room.current_phase(), Some(PhaseName::AwaitingDeclaration));
        assert!(room.evidence.is_empty());

        // window re-anchored at the reroll
        room.declare_roll(&alice, 5, &digest("h2"), &config, reroll_at + 10).unwrap();
        let t = room
            .submit_evidence(&alice, evidence(1, [5, 5, 2], reroll_at + 1_000, "retry"), &config, reroll_at + 1_000)
            .unwrap();
        assert!(!t.is_violation());
        assert_eq!(room.current_phase(), Some(PhaseName::AwaitingFinalize));
    }

    #[test]
    fn test_duplicate_frames_are_violations() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let (alice, bob) = (pid("alice"), pid("bob"));

        let reveal_at = roll_to_evidence(&mut room, &alice, 3, T0);
        room.submit_evidence(&alice, evidence(1, [3, 3, 3], reveal_at + 500, "x"), &config, reveal_at + 500)
            .unwrap();
        room.finalize_turn(&alice, &config, reveal_at + 600).unwrap();

        let reveal_at = roll_to_evidence(&mut room, &bob, 3, T0 + 10_000);
        let mut replay = evidence(2, [3, 3, 3], reveal_at + 500, "y");
        replay.frame_hashes[1] = digest("x-1-1");
        let t = room.submit_evidence(&bob, replay, &config, reveal_at + 500).unwrap();
        assert!(t.is_violation());
        assert!(t.violations[0].contains("already used"));
    }

    #[test]
    fn test_uncertain_needs_opponent_confirmation() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let (alice, bob) = (pid("alice"), pid("bob"));
        let reveal_at = roll_to_evidence(&mut room, &alice, 2, T0);

        room.submit_evidence(&alice, evidence(1, [1, 2, 3], reveal_at + 500, "u"), &config, reveal_at + 500)
            .unwrap();
        assert_eq!(room.current_phase(), Some(PhaseName::AwaitingConfirmation));
        assert!(matches!(
            room.finalize_turn(&alice, &config, reveal_at + 600),
            Err(TurnError::Conflict(_))
        ));
        assert!(matches!(
            room.confirm_evidence(&alice, true, &config, reveal_at + 600),
            Err(TurnError::Conflict(_))
        ));

        let t = room.confirm_evidence(&bob, true, &config, reveal_at + 700).unwrap();
        assert_eq!(t.event.unwrap().event_type, ChainEventType::EvidenceConfirmed);
        room.finalize_turn(&bob, &config, reveal_at + 800).unwrap();
        assert_eq!(room.turns[&1].final_value(), Some(2));
    }

    #[test]
    fn test_consensus_disagreeing_with_declaration_is_uncertain() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let alice = pid("alice");
        let reveal_at = roll_to_evidence(&mut room, &alice, 6, T0);

        room.submit_evidence(&alice, evidence(1, [1, 1, 1], reveal_at + 500, "m"), &config, reveal_at + 500)
            .unwrap();
        let turn = room.current_turn().unwrap();
        assert_eq!(turn.evidence_result.as_ref().unwrap().status, EvidenceStatus::Uncertain);
        assert_eq!(room.current_phase(), Some(PhaseName::AwaitingConfirmation));
    }

    #[test]
    fn test_reroll_bound() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let (alice, bob) = (pid("alice"), pid("bob"));
        let mut now = roll_to_evidence(&mut room, &alice, 2, T0);

        for attempt in 1..=config.max_rerolls {
            room.submit_evidence(&alice, evidence(1, [1, 2, 3], now + 100, &format!("r{}", attempt)), &config, now + 100)
                .unwrap();
            room.confirm_evidence(&bob, false, &config, now + 200).unwrap();
            now += 1_000;
            room.request_reroll(&alice, &config, now).unwrap();
            assert_eq!(room.current_turn().unwrap().reroll_count, attempt);
            room.declare_roll(&alice, 2, &digest("h1"), &config, now + 10).unwrap();
        }

        room.submit_evidence(&alice, evidence(1, [1, 2, 3], now + 100, "last"), &config, now + 100)
            .unwrap();
        room.confirm_evidence(&bob, false, &config, now + 200).unwrap();
        let len = room.hash_chain.len();
        let err = room.request_reroll(&alice, &config, now + 300).unwrap_err();
        assert_eq!(err, TurnError::Exhaustion(Exhaustion::MaxRerollsReached { max: 3 }));
        assert_eq!(err.code(), "max_rerolls_reached");
        assert_eq!(room.hash_chain.len(), len);
        assert_eq!(room.current_turn().unwrap().reroll_count, config.max_rerolls);
    }

    #[test]
    fn test_reroll_needs_disagreement() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let alice = pid("alice");
        let reveal_at = roll_to_evidence(&mut room, &alice, 2, T0);
        room.submit_evidence(&alice, evidence(1, [1, 2, 3], reveal_at + 100, "n"), &config, reveal_at + 100)
            .unwrap();
        assert!(matches!(
            room.request_reroll(&alice, &config, reveal_at + 200),
            Err(TurnError::Conflict(_))
        ));
    }

    #[test]
    fn test_suspended_player_is_blocked() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let (alice, bob) = (pid("alice"), pid("bob"));
        room.player_mut(&alice).unwrap().violation_count = config.suspend_threshold;

        let err = room.submit_pre_roll_frame(&alice, &digest("h0"), &config, T0).unwrap_err();
        assert_eq!(err.code(), "suspended");

        room.dispute(&alice, "opponent camera feed frozen", T0 + 1).unwrap();
        assert_eq!(room.status, RoomStatus::Disputed);
        assert!(matches!(
            room.submit_checklist(&bob, full_checklist(), &config),
            Err(TurnError::Conflict(_))
        ));
    }

    #[test]
    fn test_dispute_halts_turn() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let (alice, bob) = (pid("alice"), pid("bob"));
        room.submit_pre_roll_frame(&alice, &digest("h0"), &config, T0).unwrap();

        assert!(matches!(room.dispute(&bob, "   ", T0), Err(TurnError::Validation(_))));
        let t = room.dispute(&bob, "die left the table", T0 + 5).unwrap();
        let event = t.event.unwrap();
        assert_eq!(event.event_type, ChainEventType::GameDisputed);
        assert_eq!(event.data["phase"], "awaiting_commitment");

        match &room.current_turn().unwrap().phase {
            TurnPhase::Disputed { from, disputed_by, .. } => {
                assert_eq!(*from, PhaseName::AwaitingCommitment);
                assert_eq!(disputed_by, &bob);
            }
            other => panic!("unexpected phase {:?}", other),
        }
        assert!(matches!(room.dispute(&alice, "again", T0 + 6), Err(TurnError::Conflict(_))));
    }

    #[test]
    fn test_max_turns_completes_game() {
        let config = ProtocolConfig { max_turns: Some(2), ..Default::default() };
        let mut room = started_room();
        let players = [pid("alice"), pid("bob")];

        for (i, player) in players.iter().enumerate() {
            let start = T0 + (i as i64) * 10_000;
            let reveal_at = roll_to_evidence(&mut room, player, 5, start);
            let turn = room.turn_number;
            room.submit_evidence(player, evidence(turn, [5, 5, 5], reveal_at + 100, "g"), &config, reveal_at + 100)
                .unwrap();
            let t = room.finalize_turn(player, &config, reveal_at + 200).unwrap();
            assert_eq!(t.event.unwrap().data["gameCompleted"], i == 1);
        }

        assert_eq!(room.status, RoomStatus::Completed);
        assert_eq!(room.fairness.total(), 2);
        assert_eq!(room.player(&players[1]).unwrap().fairness.total(), 1);
        assert_eq!(room.fairness.snapshot(&config.fairness_rules()).status, FairnessStatus::Normal);
        assert!(matches!(
            room.submit_pre_roll_frame(&players[0], &digest("h0"), &config, T0 + 50_000),
            Err(TurnError::Conflict(_))
        ));
    }

    #[test]
    fn test_action_dispatch_and_serde() {
        let config = ProtocolConfig::default();
        let mut room = started_room();
        let action: TurnAction = serde_json::from_value(json!({
            "action": "submit_pre_roll_frame",
            "frame_hash": digest("h0"),
        }))
        .unwrap();
        assert_eq!(action.name(), "submit_pre_roll_frame");
        let t = room.apply(&pid("alice"), action, &config, T0).unwrap();
        assert_eq!(t.push.len(), 1);
        assert_eq!(t.push[0].kind, PushEventKind::PreRollFrameSubmitted);
    }
}
