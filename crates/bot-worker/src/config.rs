//! Bot configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::challenge::ChallengePolicy;
use crate::clock::TimePolicy;
use crate::draw::DrawPolicy;
use crate::error::BotError;
use crate::session::TurnRetry;

#[derive(Clone, Debug)]
pub struct BotConfig {
    /// Bot account API token
    pub lichess_token: String,

    pub lichess_url: String,

    /// Bot account id, lowercase
    pub username: String,

    /// Named by the `!owner` chat command
    pub owner: Option<String>,

    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// Engines kept running, i.e. concurrent searches
    pub engine_pool_size: usize,

    /// Stockfish `Threads` option per engine
    pub engine_threads: u32,

    /// Stockfish `Hash` option per engine, in MB
    pub engine_hash_mb: u32,

    /// Opening books in priority order
    pub book_paths: Vec<PathBuf>,

    /// `None` disables the tablebase stage
    pub tablebase_url: Option<String>,

    pub tablebase_max_pieces: usize,

    pub keepalive_interval: Duration,

    pub challenge: ChallengePolicy,
    pub time: TimePolicy,
    pub draw: DrawPolicy,
    pub retry: TurnRetry,
}

impl BotConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, BotError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `load` passes the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let lichess_token = var("LICHESS_TOKEN")
            .ok_or_else(|| BotError::Config("LICHESS_TOKEN not set".into()))?;
        let username = var("BOT_USERNAME")
            .ok_or_else(|| BotError::Config("BOT_USERNAME not set".into()))?
            .to_lowercase();

        let lichess_url = var("LICHESS_URL").unwrap_or_else(|| "https://lichess.org".to_string());
        let owner = var("BOT_OWNER");
        let stockfish_path = var("STOCKFISH_PATH").unwrap_or_else(|| "/usr/local/bin/stockfish".to_string());

        let engine_pool_size = parse_or(&var, "ENGINE_POOL_SIZE", num_cpus::get())?;
        if engine_pool_size == 0 {
            return Err(BotError::Config("ENGINE_POOL_SIZE must be at least 1".into()));
        }
        let engine_threads = parse_or(&var, "ENGINE_THREADS", 1)?;
        let engine_hash_mb = parse_or(&var, "ENGINE_HASH_MB", 64)?;

        let book_paths = var("BOOK_PATHS")
            .map(|paths| {
                paths
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        // Set but empty disables the tablebase
        let tablebase_url = match lookup("TABLEBASE_URL") {
            Some(url) if url.trim().is_empty() => None,
            Some(url) => Some(url.trim().to_string()),
            None => Some("https://tablebase.lichess.ovh".to_string()),
        };
        let tablebase_max_pieces = parse_or(&var, "TABLEBASE_MAX_PIECES", 5)?;

        let keepalive_interval = Duration::from_secs(parse_or(&var, "KEEPALIVE_SECS", 60)?);

        let default_challenge = ChallengePolicy::default();
        let challenge = ChallengePolicy {
            allowed_variants: default_challenge.allowed_variants,
            allow_rated: parse_or(&var, "CHALLENGE_ALLOW_RATED", default_challenge.allow_rated)?,
            min_limit_secs: parse_or(&var, "CHALLENGE_MIN_LIMIT_SECS", default_challenge.min_limit_secs)?,
            max_limit_secs: parse_or(&var, "CHALLENGE_MAX_LIMIT_SECS", default_challenge.max_limit_secs)?,
            max_increment_secs: parse_or(
                &var,
                "CHALLENGE_MAX_INCREMENT_SECS",
                default_challenge.max_increment_secs,
            )?,
        };
        if challenge.min_limit_secs > challenge.max_limit_secs {
            return Err(BotError::Config(
                "CHALLENGE_MIN_LIMIT_SECS is above CHALLENGE_MAX_LIMIT_SECS".into(),
            ));
        }

        let default_time = TimePolicy::default();
        let time = TimePolicy {
            floor_secs: parse_or(&var, "MOVE_TIME_FLOOR_SECS", default_time.floor_secs)?,
            ceiling_secs: parse_or(&var, "MOVE_TIME_CEILING_SECS", default_time.ceiling_secs)?,
            safety_buffer_ms: parse_or(&var, "MOVE_TIME_BUFFER_MS", default_time.safety_buffer_ms)?,
            ..default_time
        };
        time.validate().map_err(BotError::Config)?;

        let default_draw = DrawPolicy::default();
        let draw = DrawPolicy {
            min_full_moves: parse_or(&var, "DRAW_MIN_FULL_MOVES", default_draw.min_full_moves)?,
            accept_threshold_cp: parse_or(&var, "DRAW_ACCEPT_CP", default_draw.accept_threshold_cp)?,
            offer_every: parse_or(&var, "DRAW_OFFER_EVERY", default_draw.offer_every)?,
            offer_threshold_cp: parse_or(&var, "DRAW_OFFER_CP", default_draw.offer_threshold_cp)?,
            ..default_draw
        };

        let default_retry = TurnRetry::default();
        let retry = TurnRetry {
            max_attempts: parse_or(&var, "MAX_TURN_ATTEMPTS", default_retry.max_attempts)?,
            ..default_retry
        };
        if retry.max_attempts == 0 {
            return Err(BotError::Config("MAX_TURN_ATTEMPTS must be at least 1".into()));
        }

        Ok(Self {
            lichess_token,
            lichess_url,
            username,
            owner,
            stockfish_path,
            engine_pool_size,
            engine_threads,
            engine_hash_mb,
            book_paths,
            tablebase_url,
            tablebase_max_pieces,
            keepalive_interval,
            challenge,
            time,
            draw,
            retry,
        })
    }
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T, BotError>
where
    T: FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| BotError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
