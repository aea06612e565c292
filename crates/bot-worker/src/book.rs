//! Opening book sources for the move pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chess_core::book::{self, BookMove, OpeningBook};
use chess_core::GamePosition;
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::BotError;

#[async_trait]
pub trait BookSource: Send + Sync {
    /// Label used in logs
    fn name(&self) -> &str;

    /// Every move the source knows for the position, in stored order.
    async fn lookup(&self, position: &GamePosition) -> Result<Vec<BookMove>, BotError>;
}

/// A bincode book file, read on first use.
///
/// A failed read is reported for that lookup only; the next lookup tries the
/// file again.
pub struct BookFile {
    name: String,
    path: PathBuf,
    book: OnceCell<Arc<OpeningBook>>,
}

impl BookFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            path,
            book: OnceCell::new(),
        }
    }

    async fn load(&self) -> Result<&Arc<OpeningBook>, BotError> {
        self.book
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let loaded = tokio::task::spawn_blocking(move || book::load_book(path))
                    .await
                    .map_err(|e| BotError::Book(format!("Book loader panicked: {e}")))?
                    .map_err(|e| BotError::Book(e.to_string()))?;
                let total_moves: usize = loaded.values().map(Vec::len).sum();
                info!(
                    book = %self.name,
                    positions = loaded.len(),
                    moves = total_moves,
                    "Loaded opening book"
                );
                Ok::<_, BotError>(Arc::new(loaded))
            })
            .await
    }
}

#[async_trait]
impl BookSource for BookFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, position: &GamePosition) -> Result<Vec<BookMove>, BotError> {
        let loaded = self.load().await?;
        Ok(book::lookup(loaded, &position.fen()).to_vec())
    }
}

/// A book held in memory, mostly for tests and generated books.
pub struct MemoryBook {
    name: String,
    book: OpeningBook,
}

impl MemoryBook {
    pub fn new(name: &str, book: OpeningBook) -> Self {
        Self {
            name: name.to_string(),
            book,
        }
    }

    /// Single-position book keyed by the position's FEN.
    pub fn for_position(name: &str, position: &GamePosition, moves: Vec<BookMove>) -> Self {
        let mut book = OpeningBook::new();
        book.insert(position.book_key(), moves);
        Self::new(name, book)
    }
}

#[async_trait]
impl BookSource for MemoryBook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, position: &GamePosition) -> Result<Vec<BookMove>, BotError> {
        Ok(book::lookup(&self.book, &position.fen()).to_vec())
    }
}
