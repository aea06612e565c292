//! Chess state shared by the bot: game positions rebuilt from the move feed
//! and the on-disk opening book format.

pub mod book;
pub mod error;
pub mod position;

pub use error::ChessError;
pub use position::{GamePosition, SyncOutcome, Variant};
