/// Move pipeline stage ordering with fake lookups and engines.
use std::sync::Arc;
use std::time::Duration;

use bot_worker::book::{BookSource, MemoryBook};
use bot_worker::pipeline::{MoveSource, MovePipeline};
use bot_worker::pool::EnginePool;
use bot_worker::tablebase::{TablebaseMove, TablebaseProbe};
use bot_worker::testing::{BrokenBook, FakeOracleFactory, StaticTablebase};
use chess_core::book::BookMove;
use chess_core::{GamePosition, Variant};

/// King and rook against king, white to move.
const KRK: &str = "8/8/8/4k3/8/8/8/R3K3 w - - 0 60";

fn book_move(uci: &str, weight: u32) -> BookMove {
    BookMove {
        uci: uci.into(),
        weight,
    }
}

fn tb_move(uci: &str, wdl: i32, dtz: i32) -> TablebaseMove {
    TablebaseMove {
        uci: uci.into(),
        wdl,
        dtz: Some(dtz),
    }
}

async fn pool() -> (FakeOracleFactory, EnginePool) {
    let factory = FakeOracleFactory::new();
    let pool = EnginePool::start(Arc::new(factory.clone()), 1).await.unwrap();
    (factory, pool)
}

#[tokio::test]
async fn test_tablebase_wins_over_book_and_engine() {
    let (factory, pool) = pool().await;
    let position = GamePosition::new(Variant::Standard, Some(KRK)).unwrap();

    let tablebase = Arc::new(StaticTablebase::new(vec![
        tb_move("e1d1", 0, 0),
        tb_move("a1a5", 2, 40),
        tb_move("a1a4", 2, 12),
    ]));
    let book: Arc<dyn BookSource> = Arc::new(MemoryBook::for_position(
        "main",
        &position,
        vec![book_move("e1f1", 100)],
    ));
    let pipeline = MovePipeline::new(Some(tablebase.clone()), vec![book], 5);

    let candidate = pipeline.decide(&position, &pool, Duration::from_millis(50)).await.unwrap();
    assert_eq!(candidate.source, MoveSource::Tablebase);
    assert_eq!(candidate.uci, "a1a4");
    assert_eq!(tablebase.probes(), 1);
    assert!(factory.searches().is_empty());
}

#[tokio::test]
async fn test_book_used_when_tablebase_not_eligible() {
    let (factory, pool) = pool().await;
    let start = GamePosition::new(Variant::Standard, None).unwrap();

    let tablebase = Arc::new(StaticTablebase::new(vec![tb_move("e2e4", 2, 1)]));
    let books: Vec<Arc<dyn BookSource>> = vec![
        Arc::new(BrokenBook),
        Arc::new(MemoryBook::for_position("first", &start, vec![book_move("e2e4", 5), book_move("d2d4", 9)])),
        Arc::new(MemoryBook::for_position("second", &start, vec![book_move("c2c4", 9), book_move("z9z9", 50)])),
    ];
    let pipeline = MovePipeline::new(Some(tablebase.clone() as Arc<dyn TablebaseProbe>), books, 5);

    let candidate = pipeline.decide(&start, &pool, Duration::from_millis(50)).await.unwrap();
    assert_eq!(candidate.source, MoveSource::Book);
    assert_eq!(candidate.uci, "d2d4");
    assert_eq!(candidate.score, 9);
    assert_eq!(tablebase.probes(), 0);
    assert!(factory.searches().is_empty());
}

#[tokio::test]
async fn test_engine_used_when_lookups_are_empty_or_failing() {
    let (factory, pool) = pool().await;
    factory.script_moves([Some("e1e2")]);
    let position = GamePosition::new(Variant::Standard, Some(KRK)).unwrap();

    let pipeline = MovePipeline::new(
        Some(Arc::new(StaticTablebase::failing())),
        vec![Arc::new(BrokenBook) as Arc<dyn BookSource>],
        5,
    );
    let budget = Duration::from_millis(250);
    let candidate = pipeline.decide(&position, &pool, budget).await.unwrap();

    assert_eq!(candidate.source, MoveSource::Engine);
    assert_eq!(candidate.uci, "e1e2");
    let searches = factory.searches();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].budget, budget);
}

#[tokio::test]
async fn test_illegal_lookup_moves_fall_through() {
    let (factory, pool) = pool().await;
    factory.script_moves([Some("a1a8")]);
    let position = GamePosition::new(Variant::Standard, Some(KRK)).unwrap();

    let tablebase = Arc::new(StaticTablebase::new(vec![tb_move("a1h8", 2, 1)]));
    let pipeline = MovePipeline::new(Some(tablebase), Vec::new(), 5);

    let candidate = pipeline.decide(&position, &pool, Duration::from_millis(50)).await.unwrap();
    assert_eq!(candidate.source, MoveSource::Engine);
    assert_eq!(candidate.uci, "a1a8");
}

#[tokio::test]
async fn test_no_candidate_when_engine_has_no_move() {
    let (factory, pool) = pool().await;
    factory.script_moves([None::<&str>, Some("e2e5")]);
    let start = GamePosition::new(Variant::Standard, None).unwrap();
    let pipeline = MovePipeline::new(None, Vec::new(), 5);

    assert!(pipeline.decide(&start, &pool, Duration::from_millis(10)).await.is_none());
    // Illegal engine output is rejected too
    assert!(pipeline.decide(&start, &pool, Duration::from_millis(10)).await.is_none());
    assert_eq!(pool.status().await.unwrap().outstanding, 0);
}
