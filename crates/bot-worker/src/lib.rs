//! Lichess bot worker: accepts challenges, plays games through a
//! tablebase, book and engine pipeline on a shared engine pool.

pub mod actions;
pub mod book;
pub mod challenge;
pub mod chat;
pub mod clients;
pub mod clock;
pub mod config;
pub mod draw;
pub mod error;
pub mod events;
pub mod listener;
pub mod oracle;
pub mod pipeline;
pub mod pool;
pub mod session;
pub mod stockfish;
pub mod tablebase;
pub mod testing;

pub use error::BotError;
