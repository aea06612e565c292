//! Game position tracking driven by the server's move list.
//!
//! The server reports the whole move list of a game on every update, so a
//! position is either rebuilt from its starting arrangement or extended by
//! the moves it has not seen yet. Rebuilding from the same snapshot always
//! yields the same position.

use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position};

use crate::error::ChessError;

/// Rule set of a game. Only the variants the bot plays are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Standard,
    Chess960,
}

impl Variant {
    /// Map a Lichess variant key. `fromPosition` games use standard rules.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "standard" | "fromPosition" => Some(Variant::Standard),
            "chess960" => Some(Variant::Chess960),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Variant::Standard => "standard",
            Variant::Chess960 => "chess960",
        }
    }

    pub fn castling_mode(self) -> CastlingMode {
        match self {
            Variant::Standard => CastlingMode::Standard,
            Variant::Chess960 => CastlingMode::Chess960,
        }
    }
}

/// What [`GamePosition::sync`] had to do to match a move list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The list matched the applied moves exactly.
    Unchanged,
    /// The list extended the applied moves; this many were played.
    Extended(usize),
    /// The list disagreed with the applied moves and the position was rebuilt.
    Rebuilt,
}

#[derive(Debug, Clone)]
pub struct GamePosition {
    variant: Variant,
    start: Chess,
    current: Chess,
    moves: Vec<String>,
}

impl GamePosition {
    /// Starting position for a game. `initial_fen` may be absent or the
    /// literal `startpos`, both meaning the standard arrangement.
    pub fn new(variant: Variant, initial_fen: Option<&str>) -> Result<Self, ChessError> {
        let start = match initial_fen.map(str::trim) {
            None | Some("") | Some("startpos") => Chess::default(),
            Some(fen) => parse_fen(fen, variant.castling_mode())?,
        };
        Ok(Self {
            variant,
            current: start.clone(),
            start,
            moves: Vec::new(),
        })
    }

    /// Rebuild a position from a full snapshot.
    pub fn from_moves<S: AsRef<str>>(
        variant: Variant,
        initial_fen: Option<&str>,
        moves: &[S],
    ) -> Result<Self, ChessError> {
        let mut position = Self::new(variant, initial_fen)?;
        for uci in moves {
            position.push_uci(uci.as_ref())?;
        }
        Ok(position)
    }

    /// Bring the position in line with a cumulative move list.
    ///
    /// Only the suffix beyond the applied moves is played. A list that does
    /// not extend the applied moves replaces them. On error the position is
    /// left untouched.
    pub fn sync<S: AsRef<str>>(&mut self, moves: &[S]) -> Result<SyncOutcome, ChessError> {
        let applied = self.moves.len();
        let extends = moves.len() >= applied
            && moves
                .iter()
                .zip(&self.moves)
                .all(|(theirs, ours)| theirs.as_ref() == ours);

        if extends {
            let suffix = &moves[applied..];
            if suffix.is_empty() {
                return Ok(SyncOutcome::Unchanged);
            }
            let mut next = self.clone();
            for uci in suffix {
                next.push_uci(uci.as_ref())?;
            }
            *self = next;
            return Ok(SyncOutcome::Extended(suffix.len()));
        }

        let mut rebuilt = Self {
            variant: self.variant,
            start: self.start.clone(),
            current: self.start.clone(),
            moves: Vec::with_capacity(moves.len()),
        };
        for uci in moves {
            rebuilt.push_uci(uci.as_ref())?;
        }
        *self = rebuilt;
        Ok(SyncOutcome::Rebuilt)
    }

    /// Play one move given in UCI notation.
    pub fn push_uci(&mut self, uci: &str) -> Result<(), ChessError> {
        let parsed: UciMove = uci
            .parse()
            .map_err(|_| ChessError::BadMove(uci.to_string()))?;
        let mv = parsed
            .to_move(&self.current)
            .map_err(|_| ChessError::IllegalMove {
                uci: uci.to_string(),
                ply: self.moves.len(),
            })?;
        self.current.play_unchecked(mv);
        self.moves.push(uci.to_string());
        Ok(())
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn board(&self) -> &Chess {
        &self.current
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    /// Number of moves (plies) applied since the starting arrangement.
    pub fn applied(&self) -> usize {
        self.moves.len()
    }

    pub fn turn(&self) -> Color {
        self.current.turn()
    }

    pub fn fullmoves(&self) -> u32 {
        self.current.fullmoves().get()
    }

    pub fn is_game_over(&self) -> bool {
        self.current.is_game_over()
    }

    pub fn piece_count(&self) -> usize {
        self.current.board().occupied().count()
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.current, EnPassantMode::Legal).to_string()
    }

    pub fn start_fen(&self) -> String {
        Fen::from_position(&self.start, EnPassantMode::Legal).to_string()
    }

    /// FEN without move counters, used to key opening books.
    pub fn book_key(&self) -> String {
        crate::book::normalize_fen(&self.fen())
    }

    /// Legal moves in the UCI notation matching the game's castling mode.
    pub fn legal_uci(&self) -> Vec<String> {
        let mode = self.variant.castling_mode();
        self.current
            .legal_moves()
            .iter()
            .map(|m| m.to_uci(mode).to_string())
            .collect()
    }
}

impl PartialEq for GamePosition {
    fn eq(&self, other: &Self) -> bool {
        self.variant == other.variant && self.moves == other.moves && self.fen() == other.fen()
    }
}

fn parse_fen(fen: &str, mode: CastlingMode) -> Result<Chess, ChessError> {
    let parsed: Fen = fen.parse().map_err(|e| ChessError::InvalidFen {
        fen: fen.to_string(),
        reason: format!("{e}"),
    })?;
    parsed
        .into_position::<Chess>(mode)
        .map_err(|e| ChessError::InvalidFen {
            fen: fen.to_string(),
            reason: format!("{e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHESS960_START: &str = "bqnbrkrn/pppppppp/8/8/8/8/PPPPPPPP/BQNBRKRN w GEge - 0 1";

    #[test]
    fn test_snapshot_replay_is_idempotent() {
        let moves = ["e2e4", "e7e5", "g1f3"];
        let first = GamePosition::from_moves(Variant::Standard, Some("startpos"), &moves).unwrap();
        let second = GamePosition::from_moves(Variant::Standard, Some("startpos"), &moves).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.applied(), 3);
        assert_eq!(first.turn(), Color::Black);
        assert_eq!(first.fullmoves(), 2);
    }

    #[test]
    fn test_sync_applies_only_suffix() {
        let mut pos = GamePosition::from_moves(Variant::Standard, None, &["e2e4"]).unwrap();
        let outcome = pos.sync(&["e2e4", "e7e5", "d2d4"]).unwrap();
        assert_eq!(outcome, SyncOutcome::Extended(2));
        assert_eq!(pos.moves(), &["e2e4", "e7e5", "d2d4"]);

        // Same list again must not replay anything
        let outcome = pos.sync(&["e2e4", "e7e5", "d2d4"]).unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
        assert_eq!(pos.applied(), 3);
    }

    #[test]
    fn test_sync_rebuilds_on_divergence() {
        let mut pos = GamePosition::from_moves(Variant::Standard, None, &["e2e4", "e7e5"]).unwrap();
        let outcome = pos.sync(&["e2e4", "c7c5"]).unwrap();
        assert_eq!(outcome, SyncOutcome::Rebuilt);
        assert_eq!(pos.moves(), &["e2e4", "c7c5"]);

        // A shorter list (our optimistic move never reached the server)
        let outcome = pos.sync(&["e2e4"]).unwrap();
        assert_eq!(outcome, SyncOutcome::Rebuilt);
        assert_eq!(pos.turn(), Color::Black);
    }

    #[test]
    fn test_illegal_move_leaves_position_untouched() {
        let mut pos = GamePosition::from_moves(Variant::Standard, None, &["e2e4"]).unwrap();
        let before = pos.clone();
        assert!(pos.sync(&["e2e4", "e7e5", "e1e3"]).is_err());
        assert_eq!(pos, before);
        assert!(matches!(pos.push_uci("zz"), Err(ChessError::BadMove(_))));
    }

    #[test]
    fn test_chess960_start() {
        let pos = GamePosition::from_moves(Variant::Chess960, Some(CHESS960_START), &["g2g3"]).unwrap();
        assert_eq!(pos.variant(), Variant::Chess960);
        assert_eq!(pos.turn(), Color::Black);
        assert!(pos.start_fen().starts_with("bqnbrkrn/"));
    }

    #[test]
    fn test_book_key_and_piece_count() {
        let pos = GamePosition::new(Variant::Standard, None).unwrap();
        assert_eq!(
            pos.book_key(),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -"
        );
        assert_eq!(pos.piece_count(), 32);
        assert_eq!(pos.legal_uci().len(), 20);
        assert!(!pos.is_game_over());
    }

    #[test]
    fn test_fen_follows_pushed_moves() {
        let mut pos = GamePosition::new(Variant::Standard, None).unwrap();
        pos.push_uci("e2e4").unwrap();
        assert_eq!(
            pos.fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
        assert_eq!(
            pos.start_fen(),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
        );
    }

    #[test]
    fn test_variant_keys() {
        assert_eq!(Variant::from_key("standard"), Some(Variant::Standard));
        assert_eq!(Variant::from_key("fromPosition"), Some(Variant::Standard));
        assert_eq!(Variant::from_key("chess960"), Some(Variant::Chess960));
        assert_eq!(Variant::from_key("atomic"), None);
    }
}
