//! Draw offers: answering the opponent's and deciding when to make our own.

use std::time::Duration;

use chess_core::GamePosition;
use shakmaty::Color;
use tracing::{debug, warn};

use crate::oracle::Score;
use crate::pool::EnginePool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawPolicy {
    /// No draw talk before this full move
    pub min_full_moves: u32,
    /// Accept when our evaluation is at or below this
    pub accept_threshold_cp: i32,
    pub analysis_time: Duration,
    /// Offer every N full moves past the gate; 0 never offers
    pub offer_every: u32,
    /// Offer only when our evaluation is below this
    pub offer_threshold_cp: i32,
}

impl Default for DrawPolicy {
    fn default() -> Self {
        Self {
            min_full_moves: 30,
            accept_threshold_cp: 30,
            analysis_time: Duration::from_millis(100),
            offer_every: 10,
            offer_threshold_cp: -150,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawResponse {
    Accept,
    Decline,
}

pub struct DrawNegotiator {
    policy: DrawPolicy,
}

impl DrawNegotiator {
    pub fn new(policy: DrawPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DrawPolicy {
        &self.policy
    }

    /// Verdict on an offer given our evaluation, `None` when it could not be
    /// obtained.
    pub fn judge_offer(&self, full_moves: u32, eval: Option<Score>) -> DrawResponse {
        if full_moves < self.policy.min_full_moves {
            return DrawResponse::Decline;
        }
        match eval {
            None => DrawResponse::Decline,
            Some(Score::Mate(n)) if n > 0 => DrawResponse::Decline,
            Some(Score::Mate(_)) => DrawResponse::Accept,
            Some(Score::Centipawns(cp)) if cp <= self.policy.accept_threshold_cp => DrawResponse::Accept,
            Some(Score::Centipawns(_)) => DrawResponse::Decline,
        }
    }

    /// Answer the opponent's offer for the side playing `color`.
    pub async fn respond(&self, position: &GamePosition, color: Color, pool: &EnginePool) -> DrawResponse {
        let full_moves = position.fullmoves();
        if full_moves < self.policy.min_full_moves {
            debug!(full_moves, "Draw offer before the move gate");
            return DrawResponse::Decline;
        }
        let eval = self.evaluate(position, color, pool).await;
        let response = self.judge_offer(full_moves, eval);
        debug!(full_moves, eval = ?eval, response = ?response, "Draw offer judged");
        response
    }

    /// Whether this full move is one where we consider offering.
    pub fn offer_due(&self, full_moves: u32) -> bool {
        self.policy.offer_every > 0
            && full_moves >= self.policy.min_full_moves
            && (full_moves - self.policy.min_full_moves) % self.policy.offer_every == 0
    }

    pub fn wants_to_offer(&self, eval: Option<Score>) -> bool {
        match eval {
            Some(Score::Centipawns(cp)) => cp < self.policy.offer_threshold_cp,
            Some(Score::Mate(n)) => n < 0,
            None => false,
        }
    }

    /// Evaluate and decide on offering a draw ourselves.
    pub async fn should_offer(&self, position: &GamePosition, color: Color, pool: &EnginePool) -> bool {
        if !self.offer_due(position.fullmoves()) {
            return false;
        }
        let eval = self.evaluate(position, color, pool).await;
        self.wants_to_offer(eval)
    }

    /// Evaluation from `color`'s point of view.
    async fn evaluate(&self, position: &GamePosition, color: Color, pool: &EnginePool) -> Option<Score> {
        let mut engine = match pool.checkout().await {
            Ok(engine) => engine,
            Err(e) => {
                warn!(error = %e, "No engine for draw evaluation");
                return None;
            }
        };
        match engine.analyze(position, self.policy.analysis_time).await {
            Ok(score) if position.turn() == color => Some(score),
            Ok(score) => Some(score.flip()),
            Err(e) => {
                warn!(error = %e, "Draw evaluation failed");
                None
            }
        }
    }
}
