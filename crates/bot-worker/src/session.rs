//! One game from snapshot to result.
//!
//! A session consumes its game feed strictly in order. After every event it
//! checks once whether it is our move; if so it asks the pipeline for a
//! move, plays it on the local position and sends it to the server. The
//! server's next state confirms it or, on disagreement, the position is
//! rebuilt from the server's move list.

use std::sync::Arc;
use std::time::Duration;

use chess_core::{GamePosition, SyncOutcome, Variant};
use futures::{Stream, StreamExt};
use shakmaty::Color;
use tracing::{debug, error, info, warn};

use crate::actions::GameActions;
use crate::challenge::TimeControl;
use crate::chat::ChatRouter;
use crate::clock::TimePolicy;
use crate::draw::{DrawNegotiator, DrawResponse};
use crate::events::{Clock, GameDelta, GameEvent, GameSnapshot, TerminalReason};
use crate::pipeline::{MoveCandidate, MovePipeline};
use crate::pool::EnginePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first snapshot
    Init,
    /// Snapshot applied, turn not yet evaluated
    Active,
    AwaitingOpponent,
    Deciding,
    NegotiatingDraw,
    Terminated,
}

/// Longest pause between two attempts at the same turn.
pub const MAX_TURN_BACKOFF: Duration = Duration::from_secs(2);

/// Retry ceiling for a turn on which no stage produced a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnRetry {
    pub max_attempts: u32,
    /// Delay after the first failed attempt, doubled after each further one
    pub backoff: Duration,
}

impl TurnRetry {
    /// Pause after failed attempt `attempt` (1-based), never above
    /// [`MAX_TURN_BACKOFF`] unless the base delay already is.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff
            .saturating_mul(factor)
            .min(MAX_TURN_BACKOFF.max(self.backoff))
    }
}

impl Default for TurnRetry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Everything a session needs besides its own game, shared by all sessions.
pub struct SessionContext {
    pub own_id: String,
    pub time_policy: TimePolicy,
    pub retry: TurnRetry,
    pub pool: EnginePool,
    pub pipeline: MovePipeline,
    pub draws: DrawNegotiator,
    pub chat: ChatRouter,
    pub actions: Arc<dyn GameActions>,
}

pub struct GameSession {
    game_id: String,
    ctx: Arc<SessionContext>,
    state: SessionState,
    color: Option<Color>,
    position: Option<GamePosition>,
    clock: Clock,
    increment_ms: u64,
    /// Ply count at which the opponent's last draw offer was answered
    draw_answered_at: Option<usize>,
    /// Full move at which we last considered offering a draw
    offer_considered_at: Option<u32>,
    /// Our last sent move, until the server's move list contains it
    unconfirmed: Option<String>,
}

impl GameSession {
    pub fn new(game_id: impl Into<String>, ctx: Arc<SessionContext>) -> Self {
        Self {
            game_id: game_id.into(),
            ctx,
            state: SessionState::Init,
            color: None,
            position: None,
            clock: Clock::default(),
            increment_ms: 0,
            draw_answered_at: None,
            offer_considered_at: None,
            unconfirmed: None,
        }
    }

    /// Seed the increment from the accepted challenge, used until a snapshot
    /// reports the game's own clock.
    pub fn with_time_control(mut self, time_control: Option<TimeControl>) -> Self {
        if let Some(tc) = time_control {
            self.increment_ms = u64::from(tc.increment) * 1000;
        }
        self
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn position(&self) -> Option<&GamePosition> {
        self.position.as_ref()
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    /// Run until the game ends or the feed does.
    pub async fn consume<S>(&mut self, mut events: S) -> SessionState
    where
        S: Stream<Item = GameEvent> + Unpin,
    {
        while let Some(event) = events.next().await {
            self.handle_event(event).await;
            if self.is_terminated() {
                break;
            }
        }
        self.state
    }

    pub async fn handle_event(&mut self, event: GameEvent) {
        if self.is_terminated() {
            return;
        }

        match event {
            GameEvent::FullState(snapshot) => self.on_snapshot(snapshot),
            GameEvent::StateDelta(delta) => self.on_delta(delta).await,
            GameEvent::ChatLine { username, text, room } => self.on_chat(&username, &text, &room).await,
            GameEvent::DrawOffer => self.on_draw_offer().await,
            GameEvent::Status(reason) => self.finish(reason),
        }

        if !self.is_terminated() {
            self.play_if_our_turn().await;
        }
    }

    fn on_snapshot(&mut self, snapshot: GameSnapshot) {
        let Some(variant) = Variant::from_key(&snapshot.variant) else {
            warn!(game_id = %self.game_id, variant = %snapshot.variant, "Unsupported variant, leaving game");
            self.terminate();
            return;
        };

        let is_us = |id: &Option<String>| {
            id.as_deref()
                .is_some_and(|id| id.eq_ignore_ascii_case(&self.ctx.own_id))
        };
        let color = if is_us(&snapshot.white_id) {
            Color::White
        } else if is_us(&snapshot.black_id) {
            Color::Black
        } else {
            warn!(game_id = %self.game_id, "Not a participant, leaving game");
            self.terminate();
            return;
        };

        let position = match GamePosition::from_moves(variant, snapshot.initial_fen.as_deref(), &snapshot.moves) {
            Ok(position) => position,
            Err(e) => {
                error!(game_id = %self.game_id, error = %e, "Unreadable game snapshot");
                self.terminate();
                return;
            }
        };

        info!(
            game_id = %self.game_id,
            color = ?color,
            variant = variant.key(),
            moves = position.applied(),
            "Game snapshot"
        );
        self.color = Some(color);
        self.position = Some(position);
        self.clock = snapshot.clock;
        self.unconfirmed = None;
        if let Some(increment_ms) = snapshot.increment_ms {
            self.increment_ms = increment_ms;
        }
        self.state = SessionState::Active;
    }

    async fn on_delta(&mut self, delta: GameDelta) {
        let (Some(position), Some(color)) = (self.position.as_mut(), self.color) else {
            debug!(game_id = %self.game_id, "State before snapshot, ignored");
            return;
        };

        // A state sent before our move reached the server
        let stale = self.unconfirmed.is_some()
            && delta.moves.len() + 1 == position.applied()
            && position.moves().starts_with(&delta.moves);
        if stale {
            debug!(game_id = %self.game_id, "State predates our move");
        } else {
            self.unconfirmed = None;
        }

        let synced = if stale { Ok(SyncOutcome::Unchanged) } else { position.sync(&delta.moves) };
        match synced {
            Ok(SyncOutcome::Unchanged) => {}
            Ok(SyncOutcome::Extended(added)) => {
                debug!(game_id = %self.game_id, added, applied = position.applied(), "Moves applied")
            }
            Ok(SyncOutcome::Rebuilt) => {
                warn!(game_id = %self.game_id, applied = position.applied(), "Position resynchronized")
            }
            Err(e) => warn!(game_id = %self.game_id, error = %e, "Bad move list in game state"),
        }
        self.clock = delta.clock;

        let opponent_offers = match color {
            Color::White => delta.black_draw_offer,
            Color::Black => delta.white_draw_offer,
        };
        let ply = position.applied();
        if opponent_offers && self.draw_answered_at != Some(ply) {
            self.on_draw_offer().await;
        }
    }

    async fn on_draw_offer(&mut self) {
        let (Some(position), Some(color)) = (self.position.as_ref(), self.color) else {
            return;
        };
        self.draw_answered_at = Some(position.applied());
        self.state = SessionState::NegotiatingDraw;

        let ctx = Arc::clone(&self.ctx);
        let response = ctx.draws.respond(position, color, &ctx.pool).await;
        info!(game_id = %self.game_id, full_moves = position.fullmoves(), response = ?response, "Draw offer");

        match response {
            DrawResponse::Accept => match ctx.actions.accept_draw(&self.game_id).await {
                Ok(()) => self.terminate(),
                Err(e) => {
                    warn!(game_id = %self.game_id, error = %e, "Failed to accept draw");
                    self.state = SessionState::Active;
                }
            },
            DrawResponse::Decline => {
                if let Err(e) = ctx.actions.decline_draw(&self.game_id).await {
                    warn!(game_id = %self.game_id, error = %e, "Failed to decline draw");
                }
                self.state = SessionState::Active;
            }
        }
    }

    async fn on_chat(&self, username: &str, text: &str, room: &str) {
        let Some(reply) = self.ctx.chat.route(username, text) else {
            return;
        };
        if let Err(e) = self.ctx.actions.post_chat(&self.game_id, room, reply).await {
            warn!(game_id = %self.game_id, error = %e, "Failed to post chat reply");
        }
    }

    fn finish(&mut self, reason: TerminalReason) {
        info!(game_id = %self.game_id, reason = ?reason, "Game over");
        self.terminate();
    }

    fn terminate(&mut self) {
        self.state = SessionState::Terminated;
    }

    fn our_turn(&self) -> bool {
        match (&self.position, self.color) {
            (Some(position), Some(color)) => position.turn() == color && !position.is_game_over(),
            _ => false,
        }
    }

    async fn play_if_our_turn(&mut self) {
        let Some(full_moves) = self.position.as_ref().map(GamePosition::fullmoves) else {
            return;
        };
        if !self.our_turn() {
            self.state = SessionState::AwaitingOpponent;
            return;
        }
        self.state = SessionState::Deciding;
        let consider_offer = self.offer_considered_at != Some(full_moves);
        self.offer_considered_at = Some(full_moves);

        let ctx = Arc::clone(&self.ctx);
        let (Some(position), Some(color)) = (self.position.as_ref(), self.color) else {
            return;
        };

        if consider_offer && ctx.draws.should_offer(position, color, &ctx.pool).await {
            info!(game_id = %self.game_id, full_moves, "Offering a draw");
            if let Err(e) = ctx.actions.offer_draw(&self.game_id).await {
                warn!(game_id = %self.game_id, error = %e, "Failed to offer draw");
            }
        }

        let remaining_ms = match color {
            Color::White => self.clock.white_ms,
            Color::Black => self.clock.black_ms,
        };
        let think_secs = ctx.time_policy.allocate(
            remaining_ms,
            self.increment_ms as f64 / 1000.0,
            full_moves,
        );
        let budget = Duration::from_secs_f64(think_secs);

        for attempt in 1..=ctx.retry.max_attempts {
            if let Some(candidate) = ctx.pipeline.decide(position, &ctx.pool, budget).await {
                self.play(candidate).await;
                return;
            }
            warn!(game_id = %self.game_id, attempt, "No move found");
            if attempt < ctx.retry.max_attempts {
                tokio::time::sleep(ctx.retry.delay(attempt)).await;
            }
        }
        error!(
            game_id = %self.game_id,
            attempts = ctx.retry.max_attempts,
            "Giving up on this turn until the next game event"
        );
        self.state = SessionState::Active;
    }

    async fn play(&mut self, candidate: MoveCandidate) {
        let Some(position) = self.position.as_mut() else {
            return;
        };
        if let Err(e) = position.push_uci(&candidate.uci) {
            error!(game_id = %self.game_id, uci = %candidate.uci, error = %e, "Chosen move rejected locally");
            self.state = SessionState::Active;
            return;
        }
        info!(
            game_id = %self.game_id,
            uci = %candidate.uci,
            source = ?candidate.source,
            score = candidate.score,
            "Playing move"
        );
        self.state = SessionState::AwaitingOpponent;

        // Not reapplied on failure; the next game state resynchronizes
        match self.ctx.actions.make_move(&self.game_id, &candidate.uci).await {
            Ok(()) => self.unconfirmed = Some(candidate.uci),
            Err(e) => warn!(game_id = %self.game_id, uci = %candidate.uci, error = %e, "Failed to send move"),
        }
    }
}
