//! Worker error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lichess error: {0}")]
    Lichess(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Stockfish error: {0}")]
    Stockfish(String),

    #[error("Engine pool is closed")]
    PoolClosed,

    #[error("Tablebase error: {0}")]
    Tablebase(String),

    #[error("Book error: {0}")]
    Book(String),

    #[error("Position error: {0}")]
    Position(#[from] chess_core::ChessError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
