//! Opening book storage format.
//!
//! A book is a bincode-encoded map from a normalized FEN (board, side,
//! castling, en passant) to the weighted moves known for that position.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::ChessError;

/// A weighted book move in UCI notation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMove {
    pub uci: String,
    pub weight: u32,
}

/// Normalized FEN -> candidate moves, in file order.
pub type OpeningBook = HashMap<String, Vec<BookMove>>;

/// Load a book from a binary file.
pub fn load_book<P: AsRef<Path>>(path: P) -> Result<OpeningBook, ChessError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| ChessError::Book(format!("{}: {e}", path.display())))?;
    bincode::deserialize_from(BufReader::new(file))
        .map_err(|e| ChessError::Book(format!("{}: {e}", path.display())))
}

/// Write a book to a binary file.
pub fn save_book<P: AsRef<Path>>(path: P, book: &OpeningBook) -> Result<(), ChessError> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|e| ChessError::Book(format!("{}: {e}", path.display())))?;
    bincode::serialize_into(BufWriter::new(file), book)
        .map_err(|e| ChessError::Book(format!("{}: {e}", path.display())))
}

/// Strips move counters from FEN, keeping only position + side + castling + ep.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// Moves stored for a position, empty when the position is not in the book.
pub fn lookup<'a>(book: &'a OpeningBook, fen: &str) -> &'a [BookMove] {
    book.get(&normalize_fen(fen))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
