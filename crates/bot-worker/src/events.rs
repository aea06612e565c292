//! Lichess NDJSON feeds and the typed events the bot reacts to.
//!
//! Two feeds exist: the account event stream (challenges, game starts) and
//! one stream per game (full snapshot, state deltas, chat). Wire structs
//! mirror the JSON; everything downstream sees [`IncomingEvent`] and
//! [`GameEvent`].

use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::challenge::{ChallengeProposal, TimeControl};
use crate::error::BotError;

/// Remaining time per side, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Clock {
    pub white_ms: u64,
    pub black_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    pub variant: String,
    /// `None` for the standard starting position
    pub initial_fen: Option<String>,
    pub white_id: Option<String>,
    pub black_id: Option<String>,
    pub moves: Vec<String>,
    pub clock: Clock,
    /// `None` when the game has no clock
    pub increment_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameDelta {
    /// Every move since the start, not just the new ones
    pub moves: Vec<String>,
    pub clock: Clock,
    pub white_draw_offer: bool,
    pub black_draw_offer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    Checkmate,
    Resignation,
    Draw,
    TimeForfeit,
    Stalemate,
    Aborted,
    Other(String),
}

impl TerminalReason {
    /// Map a Lichess game status; `None` while the game is still running.
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "created" | "started" => None,
            "mate" => Some(Self::Checkmate),
            "resign" => Some(Self::Resignation),
            "draw" => Some(Self::Draw),
            "outoftime" | "timeout" => Some(Self::TimeForfeit),
            "stalemate" => Some(Self::Stalemate),
            "aborted" | "noStart" => Some(Self::Aborted),
            other => Some(Self::Other(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    FullState(GameSnapshot),
    StateDelta(GameDelta),
    ChatLine {
        username: String,
        text: String,
        room: String,
    },
    DrawOffer,
    Status(TerminalReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingEvent {
    Challenge(ChallengeProposal),
    /// A challenge we could not read; only its id survived
    MalformedChallenge(String),
    GameStart(String),
    GameFinish(String),
    Other,
}

// Game stream wire format

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum GameLine {
    GameFull(GameFull),
    GameState(GameStateLine),
    ChatLine(ChatLineWire),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameFull {
    variant: VariantWire,
    #[serde(default)]
    clock: Option<ClockWire>,
    white: PlayerWire,
    black: PlayerWire,
    #[serde(default)]
    initial_fen: Option<String>,
    state: GameStateLine,
}

#[derive(Debug, Deserialize)]
struct VariantWire {
    key: String,
}

#[derive(Debug, Deserialize)]
struct ClockWire {
    #[serde(default)]
    increment: u64,
}

#[derive(Debug, Deserialize)]
struct PlayerWire {
    /// Absent for the Lichess AI
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GameStateLine {
    #[serde(default)]
    moves: String,
    #[serde(default)]
    wtime: u64,
    #[serde(default)]
    btime: u64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    wdraw: bool,
    #[serde(default)]
    bdraw: bool,
}

#[derive(Debug, Deserialize)]
struct ChatLineWire {
    username: String,
    text: String,
    room: String,
}

impl GameStateLine {
    fn move_list(&self) -> Vec<String> {
        self.moves.split_whitespace().map(str::to_string).collect()
    }

    fn clock(&self) -> Clock {
        Clock {
            white_ms: self.wtime,
            black_ms: self.btime,
        }
    }

    fn terminal(&self) -> Option<TerminalReason> {
        self.status.as_deref().and_then(TerminalReason::from_status)
    }
}

/// Decode one line of a game stream. A line whose status says the game is
/// over yields only the terminal event; its board state is of no further use.
pub fn parse_game_line(line: &str) -> Result<Vec<GameEvent>, BotError> {
    let events = match serde_json::from_str::<GameLine>(line)? {
        GameLine::GameFull(full) => {
            let initial_fen = full
                .initial_fen
                .filter(|fen| !fen.is_empty() && fen != "startpos");
            // A finished game is reported before its state so no move is
            // ever considered for it
            if let Some(reason) = full.state.terminal() {
                return Ok(vec![GameEvent::Status(reason)]);
            }
            vec![GameEvent::FullState(GameSnapshot {
                variant: full.variant.key,
                initial_fen,
                white_id: full.white.id,
                black_id: full.black.id,
                moves: full.state.move_list(),
                clock: full.state.clock(),
                increment_ms: full.clock.map(|c| c.increment),
            })]
        }
        GameLine::GameState(state) => {
            if let Some(reason) = state.terminal() {
                return Ok(vec![GameEvent::Status(reason)]);
            }
            vec![GameEvent::StateDelta(GameDelta {
                moves: state.move_list(),
                clock: state.clock(),
                white_draw_offer: state.wdraw,
                black_draw_offer: state.bdraw,
            })]
        }
        GameLine::ChatLine(chat) => vec![GameEvent::ChatLine {
            username: chat.username,
            text: chat.text,
            room: chat.room,
        }],
        GameLine::Other => Vec::new(),
    };
    Ok(events)
}

/// Turn a game's line stream into events. Unreadable lines are skipped; a
/// transport error ends the stream so the caller can reconnect.
pub fn game_events<S>(lines: S) -> BoxStream<'static, GameEvent>
where
    S: Stream<Item = Result<String, BotError>> + Send + 'static,
{
    lines
        .take_while(|line| {
            if let Err(e) = line {
                warn!(error = %e, "Game stream interrupted");
            }
            future::ready(line.is_ok())
        })
        .flat_map(|line| {
            let events = match line {
                Ok(line) => parse_game_line(&line).unwrap_or_else(|e| {
                    warn!(error = %e, line = %line, "Skipping unreadable game line");
                    Vec::new()
                }),
                Err(_) => Vec::new(),
            };
            stream::iter(events)
        })
        .boxed()
}

// Account event stream wire format

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeWire {
    id: String,
    challenger: ChallengerWire,
    variant: VariantWire,
    #[serde(default)]
    rated: bool,
    #[serde(default)]
    time_control: Option<TimeControlWire>,
}

#[derive(Debug, Deserialize)]
struct ChallengerWire {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TimeControlWire {
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    increment: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameRef {
    #[serde(default)]
    game_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

impl GameRef {
    fn into_id(self) -> Option<String> {
        self.game_id.or(self.id)
    }
}

impl From<ChallengeWire> for ChallengeProposal {
    fn from(wire: ChallengeWire) -> Self {
        let time_control = wire.time_control.and_then(|tc| {
            Some(TimeControl {
                limit: tc.limit?,
                increment: tc.increment.unwrap_or(0),
            })
        });
        Self {
            id: wire.id,
            variant: wire.variant.key,
            rated: wire.rated,
            time_control,
            challenger: wire.challenger.id,
        }
    }
}

/// Decode one line of the account event stream.
pub fn parse_incoming(line: &str) -> Result<IncomingEvent, BotError> {
    let mut value: Value = serde_json::from_str(line)?;
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default().to_string();

    let event = match kind.as_str() {
        "challenge" => {
            let raw = value.get_mut("challenge").map(Value::take).unwrap_or(Value::Null);
            match serde_json::from_value::<ChallengeWire>(raw.clone()) {
                Ok(wire) => IncomingEvent::Challenge(wire.into()),
                Err(e) => match raw.get("id").and_then(Value::as_str) {
                    Some(id) => IncomingEvent::MalformedChallenge(id.to_string()),
                    None => return Err(e.into()),
                },
            }
        }
        "gameStart" | "gameFinish" => {
            let raw = value.get_mut("game").map(Value::take).unwrap_or(Value::Null);
            let id = serde_json::from_value::<GameRef>(raw)?
                .into_id()
                .ok_or_else(|| BotError::Lichess(format!("{kind} event without a game id")))?;
            if kind == "gameStart" {
                IncomingEvent::GameStart(id)
            } else {
                IncomingEvent::GameFinish(id)
            }
        }
        _ => IncomingEvent::Other,
    };
    Ok(event)
}
