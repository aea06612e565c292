//! Deterministic stand-ins for the engine, the game server and the lookup
//! services. Used by the unit tests here and the scenario tests at the
//! workspace root.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chess_core::book::BookMove;
use chess_core::GamePosition;

use crate::actions::{ChallengeActions, GameActions};
use crate::book::BookSource;
use crate::challenge::DeclineReason;
use crate::error::BotError;
use crate::oracle::{OracleFactory, Score, SearchOracle};
use crate::tablebase::{TablebaseMove, TablebaseProbe};

/// One `search` call seen by a fake engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub engine_id: usize,
    pub fen: String,
    pub budget: Duration,
}

#[derive(Default)]
struct OracleState {
    alive: Vec<bool>,
    searches: Vec<SearchCall>,
    analyses: usize,
    scripted_moves: VecDeque<Option<String>>,
    score: Option<Score>,
    search_delay: Duration,
    spawn_delay: Duration,
    fail_spawns: bool,
    quits: usize,
    busy: usize,
    max_busy: usize,
}

/// Factory of scripted engines sharing one state, so tests can inspect and
/// sabotage engines after the pool owns them.
///
/// Engines get ids in spawn order. Without a script, `search` plays the
/// first legal move; `analyze` returns the configured score, or fails when
/// none is set.
#[derive(Clone)]
pub struct FakeOracleFactory {
    state: Arc<Mutex<OracleState>>,
}

impl Default for FakeOracleFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeOracleFactory {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(OracleState {
                score: Some(Score::Centipawns(0)),
                ..OracleState::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OracleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn spawned(&self) -> usize {
        self.lock().alive.len()
    }

    /// Simulate a crash of engine `id`.
    pub fn kill(&self, id: usize) {
        if let Some(alive) = self.lock().alive.get_mut(id) {
            *alive = false;
        }
    }

    pub fn is_alive(&self, id: usize) -> bool {
        self.lock().alive.get(id).copied().unwrap_or(false)
    }

    pub fn fail_spawns(&self, fail: bool) {
        self.lock().fail_spawns = fail;
    }

    pub fn searches(&self) -> Vec<SearchCall> {
        self.lock().searches.clone()
    }

    pub fn analyses(&self) -> usize {
        self.lock().analyses
    }

    pub fn quit_count(&self) -> usize {
        self.lock().quits
    }

    /// Queue answers for the next searches; `None` means "no move".
    pub fn script_moves<I, S>(&self, moves: I)
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        self.lock()
            .scripted_moves
            .extend(moves.into_iter().map(|m| m.map(Into::into)));
    }

    /// Score returned by `analyze`, from the side to move; `None` fails.
    pub fn set_score(&self, score: Option<Score>) {
        self.lock().score = score;
    }

    pub fn set_search_delay(&self, delay: Duration) {
        self.lock().search_delay = delay;
    }

    /// Startup time of every engine spawned from now on.
    pub fn set_spawn_delay(&self, delay: Duration) {
        self.lock().spawn_delay = delay;
    }

    /// Most searches ever running at once.
    pub fn max_concurrent(&self) -> usize {
        self.lock().max_busy
    }
}

#[async_trait]
impl OracleFactory for FakeOracleFactory {
    async fn spawn(&self) -> Result<Box<dyn SearchOracle>, BotError> {
        let delay = self.lock().spawn_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        if state.fail_spawns {
            return Err(BotError::Stockfish("fake spawn failure".into()));
        }
        let id = state.alive.len();
        state.alive.push(true);
        Ok(Box::new(FakeOracle {
            id,
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct FakeOracle {
    id: usize,
    state: Arc<Mutex<OracleState>>,
}

impl FakeOracle {
    fn lock(&self) -> MutexGuard<'_, OracleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SearchOracle for FakeOracle {
    async fn search(
        &mut self,
        position: &GamePosition,
        budget: Duration,
    ) -> Result<Option<String>, BotError> {
        let delay = {
            let mut state = self.lock();
            state.searches.push(SearchCall {
                engine_id: self.id,
                fen: position.fen(),
                budget,
            });
            state.busy += 1;
            state.max_busy = state.max_busy.max(state.busy);
            state.search_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.busy -= 1;
        if !state.alive.get(self.id).copied().unwrap_or(false) {
            return Err(BotError::Stockfish("fake engine is dead".into()));
        }
        Ok(match state.scripted_moves.pop_front() {
            Some(scripted) => scripted,
            None => position.legal_uci().into_iter().next(),
        })
    }

    async fn analyze(&mut self, _position: &GamePosition, _budget: Duration) -> Result<Score, BotError> {
        let mut state = self.lock();
        state.analyses += 1;
        state
            .score
            .ok_or_else(|| BotError::Stockfish("fake analysis failure".into()))
    }

    fn is_alive(&mut self) -> bool {
        self.lock().alive.get(self.id).copied().unwrap_or(false)
    }

    async fn quit(&mut self) {
        let mut state = self.lock();
        state.quits += 1;
        if let Some(alive) = state.alive.get_mut(self.id) {
            *alive = false;
        }
    }
}

/// Everything sent to the fake game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Move { game_id: String, uci: String },
    AcceptDraw(String),
    DeclineDraw(String),
    OfferDraw(String),
    Chat { game_id: String, room: String, text: String },
    AcceptChallenge(String),
    DeclineChallenge(String, DeclineReason),
}

/// Records every outbound call. Failed calls are recorded too.
#[derive(Default)]
pub struct RecordingActions {
    actions: Mutex<Vec<Action>>,
    fail_moves: AtomicBool,
    fail_challenges: AtomicBool,
}

impl RecordingActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// UCI moves sent, in order.
    pub fn moves(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Move { uci, .. } => Some(uci),
                _ => None,
            })
            .collect()
    }

    pub fn fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_challenges(&self, fail: bool) {
        self.fail_challenges.store(fail, Ordering::SeqCst);
    }

    fn record(&self, action: Action) {
        self.actions.lock().unwrap_or_else(|p| p.into_inner()).push(action);
    }
}

#[async_trait]
impl GameActions for RecordingActions {
    async fn make_move(&self, game_id: &str, uci: &str) -> Result<(), BotError> {
        self.record(Action::Move {
            game_id: game_id.to_string(),
            uci: uci.to_string(),
        });
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(BotError::Lichess("fake move rejected".into()));
        }
        Ok(())
    }

    async fn accept_draw(&self, game_id: &str) -> Result<(), BotError> {
        self.record(Action::AcceptDraw(game_id.to_string()));
        Ok(())
    }

    async fn decline_draw(&self, game_id: &str) -> Result<(), BotError> {
        self.record(Action::DeclineDraw(game_id.to_string()));
        Ok(())
    }

    async fn offer_draw(&self, game_id: &str) -> Result<(), BotError> {
        self.record(Action::OfferDraw(game_id.to_string()));
        Ok(())
    }

    async fn post_chat(&self, game_id: &str, room: &str, text: &str) -> Result<(), BotError> {
        self.record(Action::Chat {
            game_id: game_id.to_string(),
            room: room.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl ChallengeActions for RecordingActions {
    async fn accept_challenge(&self, challenge_id: &str) -> Result<(), BotError> {
        self.record(Action::AcceptChallenge(challenge_id.to_string()));
        if self.fail_challenges.load(Ordering::SeqCst) {
            return Err(BotError::Lichess("fake challenge call failed".into()));
        }
        Ok(())
    }

    async fn decline_challenge(&self, challenge_id: &str, reason: DeclineReason) -> Result<(), BotError> {
        self.record(Action::DeclineChallenge(challenge_id.to_string(), reason));
        if self.fail_challenges.load(Ordering::SeqCst) {
            return Err(BotError::Lichess("fake challenge call failed".into()));
        }
        Ok(())
    }
}

/// Tablebase answering every probe with the same moves, or always failing.
pub struct StaticTablebase {
    moves: Option<Vec<TablebaseMove>>,
    probes: AtomicUsize,
}

impl StaticTablebase {
    pub fn new(moves: Vec<TablebaseMove>) -> Self {
        Self {
            moves: Some(moves),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            moves: None,
            probes: AtomicUsize::new(0),
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TablebaseProbe for StaticTablebase {
    async fn probe(&self, _position: &GamePosition) -> Result<Vec<TablebaseMove>, BotError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.moves
            .clone()
            .ok_or_else(|| BotError::Tablebase("fake tablebase offline".into()))
    }
}

/// Book whose every lookup fails, like a corrupt file.
pub struct BrokenBook;

#[async_trait]
impl BookSource for BrokenBook {
    fn name(&self) -> &str {
        "broken"
    }

    async fn lookup(&self, _position: &GamePosition) -> Result<Vec<BookMove>, BotError> {
        Err(BotError::Book("fake corrupt book".into()))
    }
}
