//! Search oracle capability.
//!
//! The pool and the pipeline only see these traits; the process-backed
//! implementation lives in [`crate::stockfish`] and deterministic fakes in
//! [`crate::testing`].

use std::time::Duration;

use async_trait::async_trait;
use chess_core::GamePosition;

use crate::error::BotError;

/// Engine evaluation relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Mate in N; positive when the side to move delivers it
    Mate(i32),
}

impl Score {
    /// The same evaluation seen from the other side.
    pub fn flip(self) -> Self {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }
}

#[async_trait]
pub trait SearchOracle: Send {
    /// Best move in UCI notation, `None` when the engine has no move.
    async fn search(
        &mut self,
        position: &GamePosition,
        budget: Duration,
    ) -> Result<Option<String>, BotError>;

    async fn analyze(&mut self, position: &GamePosition, budget: Duration) -> Result<Score, BotError>;

    /// False once the underlying process has exited.
    fn is_alive(&mut self) -> bool;

    async fn quit(&mut self);
}

/// Starts fresh oracle instances for the pool.
#[async_trait]
pub trait OracleFactory: Send + Sync {
    async fn spawn(&self) -> Result<Box<dyn SearchOracle>, BotError>;
}
