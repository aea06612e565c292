#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bot_worker::chat::ChatRouter;
use bot_worker::clock::TimePolicy;
use bot_worker::draw::{DrawNegotiator, DrawPolicy};
use bot_worker::events::{Clock, GameDelta, GameEvent, GameSnapshot};
use bot_worker::pipeline::MovePipeline;
use bot_worker::pool::EnginePool;
use bot_worker::session::{GameSession, SessionContext, TurnRetry};
use bot_worker::testing::{FakeOracleFactory, RecordingActions};

pub const BOT: &str = "indibot";
pub const OPPONENT: &str = "someone";
pub const GAME: &str = "game0001";

/// A session wired to fake engines and a recording server.
pub struct Harness {
    pub factory: FakeOracleFactory,
    pub actions: Arc<RecordingActions>,
    pub pool: EnginePool,
    pub ctx: Arc<SessionContext>,
}

impl Harness {
    /// Engine-only pipeline on a one-engine pool.
    pub async fn new() -> Self {
        Self::with_pipeline(MovePipeline::new(None, Vec::new(), 5)).await
    }

    pub async fn with_pipeline(pipeline: MovePipeline) -> Self {
        let factory = FakeOracleFactory::new();
        let actions = Arc::new(RecordingActions::new());
        let pool = EnginePool::start(Arc::new(factory.clone()), 1)
            .await
            .expect("pool starts");
        let ctx = Arc::new(SessionContext {
            own_id: BOT.to_string(),
            time_policy: TimePolicy::default(),
            retry: TurnRetry {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
            pool: pool.clone(),
            pipeline,
            draws: DrawNegotiator::new(DrawPolicy::default()),
            chat: ChatRouter::new(BOT, Some("owner")),
            actions: actions.clone(),
        });
        Self {
            factory,
            actions,
            pool,
            ctx,
        }
    }

    pub fn session(&self) -> GameSession {
        GameSession::new(GAME, Arc::clone(&self.ctx))
    }
}

/// Snapshot of a game with us on `bot_white`'s side.
pub fn snapshot(bot_white: bool, initial_fen: Option<&str>, moves: &[&str]) -> GameEvent {
    let (white, black) = if bot_white { (BOT, OPPONENT) } else { (OPPONENT, BOT) };
    GameEvent::FullState(GameSnapshot {
        variant: if initial_fen.is_some() { "fromPosition" } else { "standard" }.to_string(),
        initial_fen: initial_fen.map(str::to_string),
        white_id: Some(white.to_string()),
        black_id: Some(black.to_string()),
        moves: moves.iter().map(|m| m.to_string()).collect(),
        clock: Clock {
            white_ms: 60_000,
            black_ms: 60_000,
        },
        increment_ms: Some(0),
    })
}

pub fn delta(moves: &[&str], clock: Clock) -> GameEvent {
    GameEvent::StateDelta(GameDelta {
        moves: moves.iter().map(|m| m.to_string()).collect(),
        clock,
        white_draw_offer: false,
        black_draw_offer: false,
    })
}

pub fn clock(white_ms: u64, black_ms: u64) -> Clock {
    Clock { white_ms, black_ms }
}
