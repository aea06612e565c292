//! Lichess bot
//!
//! Accepts challenges and plays every accepted game concurrently on a fixed
//! pool of Stockfish processes.

use std::sync::Arc;

use bot_worker::book::{BookFile, BookSource};
use bot_worker::chat::ChatRouter;
use bot_worker::clients::LichessClient;
use bot_worker::config::BotConfig;
use bot_worker::draw::DrawNegotiator;
use bot_worker::listener;
use bot_worker::pipeline::MovePipeline;
use bot_worker::pool::EnginePool;
use bot_worker::session::SessionContext;
use bot_worker::stockfish::StockfishFactory;
use bot_worker::tablebase::{HttpTablebase, TablebaseProbe};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Arc::new(BotConfig::load()?);
    info!(
        username = %config.username,
        lichess_url = %config.lichess_url,
        stockfish_path = %config.stockfish_path,
        engines = config.engine_pool_size,
        books = config.book_paths.len(),
        tablebase = ?config.tablebase_url,
        "Bot config loaded"
    );

    let client = LichessClient::new(&config.lichess_url, &config.lichess_token)?;
    let account = client.account().await?;
    let account_id = account.get("id").and_then(|v| v.as_str()).unwrap_or_default();
    if !account_id.eq_ignore_ascii_case(&config.username) {
        warn!(account_id, username = %config.username, "Token belongs to a different account");
    }

    let factory = StockfishFactory {
        path: config.stockfish_path.clone(),
        threads: config.engine_threads,
        hash_mb: config.engine_hash_mb,
    };
    info!(size = config.engine_pool_size, "Starting engine pool");
    let pool = EnginePool::start(Arc::new(factory), config.engine_pool_size).await?;

    let tablebase = match &config.tablebase_url {
        Some(url) => Some(Arc::new(HttpTablebase::new(url)?) as Arc<dyn TablebaseProbe>),
        None => None,
    };
    let books: Vec<Arc<dyn BookSource>> = config
        .book_paths
        .iter()
        .map(|path| Arc::new(BookFile::new(path)) as Arc<dyn BookSource>)
        .collect();

    let ctx = Arc::new(SessionContext {
        own_id: config.username.clone(),
        time_policy: config.time.clone(),
        retry: config.retry,
        pool: pool.clone(),
        pipeline: MovePipeline::new(tablebase, books, config.tablebase_max_pieces),
        draws: DrawNegotiator::new(config.draw.clone()),
        chat: ChatRouter::new(&config.username, config.owner.as_deref()),
        actions: Arc::new(client.clone()),
    });

    tokio::spawn(listener::keep_alive(client.clone(), config.keepalive_interval));

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminate = async move {
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    info!("Starting event loop");
    tokio::select! {
        _ = listener::run_event_loop(client, config.challenge.clone(), ctx) => {}
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    pool.shutdown().await;
    info!("Engine pool stopped");
    Ok(())
}
