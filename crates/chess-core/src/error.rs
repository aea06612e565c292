use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChessError {
    #[error("Invalid FEN {fen}: {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Unparseable move: {0}")]
    BadMove(String),

    #[error("Illegal move {uci} at ply {ply}")]
    IllegalMove { uci: String, ply: usize },

    #[error("Book error: {0}")]
    Book(String),
}
