//! Move selection: tablebase, then opening book, then engine search.
//!
//! Each stage yields at most one candidate and the first stage that does
//! wins. Candidates that cannot be played on the current position are
//! discarded before selection.

use std::sync::Arc;
use std::time::Duration;

use chess_core::book::BookMove;
use chess_core::GamePosition;
use tracing::{debug, info, warn};

use crate::book::BookSource;
use crate::pool::EnginePool;
use crate::tablebase::{TablebaseMove, TablebaseProbe};

/// Largest DTZ magnitude that still fits below one WDL step.
const DTZ_CLAMP: i32 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveSource {
    Tablebase,
    Book,
    Engine,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCandidate {
    pub uci: String,
    pub source: MoveSource,
    pub score: i64,
}

pub struct MovePipeline {
    tablebase: Option<Arc<dyn TablebaseProbe>>,
    books: Vec<Arc<dyn BookSource>>,
    max_tablebase_pieces: usize,
}

impl MovePipeline {
    pub fn new(
        tablebase: Option<Arc<dyn TablebaseProbe>>,
        books: Vec<Arc<dyn BookSource>>,
        max_tablebase_pieces: usize,
    ) -> Self {
        Self {
            tablebase,
            books,
            max_tablebase_pieces,
        }
    }

    /// Pick a move, borrowing an engine from the pool only if the lookups
    /// have nothing.
    pub async fn decide(
        &self,
        position: &GamePosition,
        pool: &EnginePool,
        budget: Duration,
    ) -> Option<MoveCandidate> {
        if let Some(candidate) = self.tablebase_move(position).await {
            return Some(candidate);
        }
        if let Some(candidate) = self.book_move(position).await {
            return Some(candidate);
        }
        self.engine_move(position, pool, budget).await
    }

    pub fn tablebase_eligible(&self, position: &GamePosition) -> bool {
        self.tablebase.is_some()
            && position.piece_count() <= self.max_tablebase_pieces
            && !position.is_game_over()
    }

    async fn tablebase_move(&self, position: &GamePosition) -> Option<MoveCandidate> {
        let probe = self.tablebase.as_ref()?;
        if !self.tablebase_eligible(position) {
            return None;
        }

        let moves = match probe.probe(position).await {
            Ok(moves) => moves,
            Err(e) => {
                warn!(error = %e, "Tablebase probe failed");
                return None;
            }
        };
        let playable: Vec<TablebaseMove> = moves
            .into_iter()
            .filter(|m| is_playable(position, &m.uci))
            .collect();

        let (best, score) = select_tablebase_move(&playable)?;
        info!(uci = %best.uci, wdl = best.wdl, dtz = ?best.dtz, score, "Tablebase move");
        Some(MoveCandidate {
            uci: best.uci.clone(),
            source: MoveSource::Tablebase,
            score,
        })
    }

    async fn book_move(&self, position: &GamePosition) -> Option<MoveCandidate> {
        let mut found: Vec<(BookMove, &str)> = Vec::new();
        for source in &self.books {
            match source.lookup(position).await {
                Ok(moves) => found.extend(
                    moves
                        .into_iter()
                        .filter(|m| is_playable(position, &m.uci))
                        .map(|m| (m, source.name())),
                ),
                Err(e) => warn!(book = source.name(), error = %e, "Book lookup failed"),
            }
        }

        let (best, book) = select_book_move(found)?;
        info!(uci = %best.uci, weight = best.weight, book, "Book move");
        Some(MoveCandidate {
            uci: best.uci,
            source: MoveSource::Book,
            score: i64::from(best.weight),
        })
    }

    async fn engine_move(
        &self,
        position: &GamePosition,
        pool: &EnginePool,
        budget: Duration,
    ) -> Option<MoveCandidate> {
        let mut engine = match pool.checkout().await {
            Ok(engine) => engine,
            Err(e) => {
                warn!(error = %e, "No engine available");
                return None;
            }
        };

        match engine.search(position, budget).await {
            Ok(Some(uci)) if is_playable(position, &uci) => {
                debug!(uci = %uci, budget_ms = budget.as_millis() as u64, "Engine move");
                Some(MoveCandidate {
                    uci,
                    source: MoveSource::Engine,
                    score: 0,
                })
            }
            Ok(Some(uci)) => {
                warn!(uci = %uci, "Engine returned an illegal move");
                None
            }
            Ok(None) => {
                warn!("Engine returned no move");
                None
            }
            Err(e) => {
                warn!(error = %e, "Engine search failed");
                None
            }
        }
    }
}

/// Tablebase ranking: the WDL class dominates, a shorter DTZ breaks ties
/// inside a class.
pub fn tablebase_score(mv: &TablebaseMove) -> i64 {
    let dtz = mv.dtz.unwrap_or(0).clamp(-DTZ_CLAMP, DTZ_CLAMP);
    i64::from(mv.wdl) * 1000 - i64::from(dtz)
}

/// Highest scoring move; the first one wins a tie.
pub fn select_tablebase_move(moves: &[TablebaseMove]) -> Option<(&TablebaseMove, i64)> {
    let mut best: Option<(&TablebaseMove, i64)> = None;
    for mv in moves {
        let score = tablebase_score(mv);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((mv, score));
        }
    }
    best
}

/// Heaviest move across all sources; the first one wins a tie.
pub fn select_book_move<T>(moves: impl IntoIterator<Item = (BookMove, T)>) -> Option<(BookMove, T)> {
    let mut best: Option<(BookMove, T)> = None;
    for (mv, tag) in moves {
        let heavier = match &best {
            Some((top, _)) => mv.weight > top.weight,
            None => true,
        };
        if heavier {
            best = Some((mv, tag));
        }
    }
    best
}

fn is_playable(position: &GamePosition, uci: &str) -> bool {
    position.clone().push_uci(uci).is_ok()
}
