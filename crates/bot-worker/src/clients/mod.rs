pub mod lichess;

pub use lichess::LichessClient;
