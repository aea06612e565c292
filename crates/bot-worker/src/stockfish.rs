//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::time::Duration;

use async_trait::async_trait;
use chess_core::{GamePosition, Variant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::error::BotError;
use crate::oracle::{OracleFactory, Score, SearchOracle};

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    chess960: bool,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str, threads: u32, hash_mb: u32) -> Result<Self, BotError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BotError::Stockfish(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| BotError::Stockfish("Stockfish stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| BotError::Stockfish("Stockfish stdout unavailable".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
            chess960: false,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine.send(&format!("setoption name Threads value {threads}")).await?;
        engine.send(&format!("setoption name Hash value {hash_mb}")).await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), BotError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| BotError::Stockfish(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| BotError::Stockfish(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Read one line; a closed pipe means the process is gone.
    async fn read_line(&mut self, line: &mut String) -> Result<(), BotError> {
        line.clear();
        let n = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| BotError::Stockfish(format!("Failed to read from Stockfish: {e}")))?;
        if n == 0 {
            return Err(BotError::Stockfish("Stockfish closed its output".into()));
        }
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), BotError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Load a game position, switching castling notation when needed
    async fn set_position(&mut self, position: &GamePosition) -> Result<(), BotError> {
        let chess960 = position.variant() == Variant::Chess960;
        if chess960 != self.chess960 {
            self.send(&format!("setoption name UCI_Chess960 value {chess960}"))
                .await?;
            self.chess960 = chess960;
        }

        let mut cmd = format!("position fen {}", position.start_fen());
        if !position.moves().is_empty() {
            cmd.push_str(" moves ");
            cmd.push_str(&position.moves().join(" "));
        }
        self.send(&cmd).await
    }

    /// Run a timed search, returning the last reported score and the best move
    async fn go(&mut self, budget: Duration) -> Result<(Option<Score>, Option<String>), BotError> {
        let movetime = budget.as_millis().max(1);
        self.send(&format!("go movetime {movetime}")).await?;

        let mut score = None;
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" score ") {
                if let Some(cp) = parse_cp(trimmed) {
                    score = Some(Score::Centipawns(cp));
                }
                if let Some(mate) = parse_mate(trimmed) {
                    score = Some(Score::Mate(mate));
                }
            } else if trimmed.starts_with("bestmove") {
                debug!(line = trimmed, "SF >");
                return Ok((score, parse_bestmove(trimmed)));
            }
        }
    }
}

#[async_trait]
impl SearchOracle for StockfishEngine {
    async fn search(
        &mut self,
        position: &GamePosition,
        budget: Duration,
    ) -> Result<Option<String>, BotError> {
        self.set_position(position).await?;
        let (_, best_move) = self.go(budget).await?;
        Ok(best_move)
    }

    async fn analyze(&mut self, position: &GamePosition, budget: Duration) -> Result<Score, BotError> {
        self.set_position(position).await?;
        let (score, _) = self.go(budget).await?;
        score.ok_or_else(|| BotError::Stockfish("Search finished without a score".into()))
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }

    /// Send quit command and wait for process to exit
    async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Spawns Stockfish processes for the engine pool
#[derive(Debug, Clone)]
pub struct StockfishFactory {
    pub path: String,
    pub threads: u32,
    pub hash_mb: u32,
}

#[async_trait]
impl OracleFactory for StockfishFactory {
    async fn spawn(&self) -> Result<Box<dyn SearchOracle>, BotError> {
        let engine = StockfishEngine::new(&self.path, self.threads, self.hash_mb).await?;
        Ok(Box::new(engine))
    }
}

/// Value following a keyword in an info line
fn parse_after<T: std::str::FromStr>(line: &str, keyword: &str) -> Option<T> {
    let mut parts = line.split_whitespace();
    while let Some(part) = parts.next() {
        if part == keyword {
            return parts.next()?.parse().ok();
        }
    }
    None
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    parse_after(line, "cp")
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    parse_after(line, "mate")
}

/// Parse the move of a `bestmove` line; `(none)` means no legal move
fn parse_bestmove(line: &str) -> Option<String> {
    line.split_whitespace()
        .nth(1)
        .filter(|mv| *mv != "(none)")
        .map(str::to_string)
}
