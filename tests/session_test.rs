/// Game session scenarios against fake engines and a recording server.
mod common;

use std::time::Duration;

use bot_worker::clock::TimePolicy;
use bot_worker::events::{parse_game_line, GameDelta, GameEvent, TerminalReason};
use bot_worker::oracle::Score;
use bot_worker::session::SessionState;
use bot_worker::testing::Action;
use common::{clock, delta, snapshot, Harness, GAME};
use futures::stream;
use shakmaty::Color;

const MOVE_20: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 20";
const MOVE_35: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 35";
const MOVE_40: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 40";

#[tokio::test]
async fn test_black_waits_for_white_then_searches_once() {
    let h = Harness::new().await;
    h.factory.script_moves([Some("e7e5")]);
    let mut session = h.session();

    session.handle_event(snapshot(false, None, &[])).await;
    assert_eq!(session.color(), Some(Color::Black));
    assert_eq!(session.state(), SessionState::AwaitingOpponent);
    assert!(h.factory.searches().is_empty());

    session.handle_event(delta(&["e2e4"], clock(59_000, 60_000))).await;
    let searches = h.factory.searches();
    assert_eq!(searches.len(), 1);
    let expected = TimePolicy::default().allocate(60_000, 0.0, 1);
    assert_eq!(searches[0].budget, Duration::from_secs_f64(expected));

    assert_eq!(h.actions.moves(), vec!["e7e5"]);
    assert_eq!(session.position().unwrap().moves(), ["e2e4", "e7e5"]);
    assert_eq!(session.state(), SessionState::AwaitingOpponent);

    // The server echoes our move; nothing else happens
    session.handle_event(delta(&["e2e4", "e7e5"], clock(59_000, 58_000))).await;
    assert_eq!(h.factory.searches().len(), 1);
    assert_eq!(session.clock(), clock(59_000, 58_000));
}

#[tokio::test]
async fn test_replayed_snapshot_yields_same_position() {
    let h = Harness::new().await;
    let mut session = h.session();

    let event = snapshot(false, None, &["e2e4", "e7e5"]);
    session.handle_event(event.clone()).await;
    let first = session.position().cloned().unwrap();
    session.handle_event(event).await;

    assert_eq!(session.position().unwrap(), &first);
    assert!(h.factory.searches().is_empty());
}

#[tokio::test]
async fn test_deltas_apply_only_new_moves() {
    let h = Harness::new().await;
    h.factory.script_moves([Some("e7e5"), Some("b8c6")]);
    let mut session = h.session();

    session.handle_event(snapshot(false, None, &[])).await;
    session.handle_event(delta(&["e2e4"], clock(60_000, 60_000))).await;
    // Repeated state from before our reply reached the server
    session.handle_event(delta(&["e2e4"], clock(60_000, 60_000))).await;
    session.handle_event(delta(&["e2e4", "e7e5"], clock(60_000, 60_000))).await;
    session.handle_event(delta(&["e2e4", "e7e5"], clock(60_000, 60_000))).await;
    session.handle_event(delta(&["e2e4", "e7e5", "g1f3"], clock(60_000, 60_000))).await;

    assert_eq!(h.factory.searches().len(), 2);
    assert_eq!(h.actions.moves(), vec!["e7e5", "b8c6"]);
    assert_eq!(
        session.position().unwrap().moves(),
        ["e2e4", "e7e5", "g1f3", "b8c6"]
    );
}

#[tokio::test]
async fn test_failed_send_is_not_replayed_until_resync() {
    let h = Harness::new().await;
    h.actions.fail_moves(true);
    h.factory.script_moves([Some("e7e5"), Some("c7c5")]);
    let mut session = h.session();

    session.handle_event(snapshot(false, None, &[])).await;
    session.handle_event(delta(&["e2e4"], clock(60_000, 60_000))).await;
    assert_eq!(h.actions.moves(), vec!["e7e5"]);
    assert_eq!(session.position().unwrap().applied(), 2);

    // A chat line is not a reason to move again
    session
        .handle_event(GameEvent::ChatLine {
            username: "someone".into(),
            text: "hello".into(),
            room: "player".into(),
        })
        .await;
    assert_eq!(h.actions.moves(), vec!["e7e5"]);

    // A fresh snapshot brings the server's view back; the turn is ours again
    h.actions.fail_moves(false);
    session.handle_event(snapshot(false, None, &["e2e4"])).await;
    assert_eq!(h.actions.moves(), vec!["e7e5", "c7c5"]);
    assert_eq!(session.position().unwrap().moves(), ["e2e4", "c7c5"]);
}

#[tokio::test]
async fn test_turn_abandoned_after_bounded_attempts() {
    let h = Harness::new().await;
    h.factory.script_moves([None::<&str>, None, None]);
    let mut session = h.session();

    session.handle_event(snapshot(true, None, &[])).await;
    assert_eq!(h.factory.searches().len(), 3);
    assert!(h.actions.moves().is_empty());
    assert_eq!(session.state(), SessionState::Active);

    // The next event retries the turn
    session
        .handle_event(GameEvent::ChatLine {
            username: "someone".into(),
            text: "move?".into(),
            room: "spectator".into(),
        })
        .await;
    assert_eq!(h.factory.searches().len(), 4);
    assert_eq!(h.actions.moves().len(), 1);
}

#[tokio::test]
async fn test_draw_offer_before_move_gate_is_declined() {
    let h = Harness::new().await;
    h.factory.set_score(Some(Score::Centipawns(900)));
    let mut session = h.session();

    session.handle_event(snapshot(false, Some(MOVE_20), &[])).await;
    session.handle_event(GameEvent::DrawOffer).await;

    assert_eq!(h.factory.analyses(), 0);
    assert_eq!(h.actions.actions(), vec![Action::DeclineDraw(GAME.into())]);
    assert_eq!(session.state(), SessionState::AwaitingOpponent);
}

#[tokio::test]
async fn test_draw_offer_at_threshold_is_accepted() {
    let h = Harness::new().await;
    // White to move sees -30, which is +30 for us as black
    h.factory.set_score(Some(Score::Centipawns(-30)));
    let mut session = h.session();

    session.handle_event(snapshot(false, Some(MOVE_35), &[])).await;
    session
        .handle_event(GameEvent::StateDelta(GameDelta {
            moves: vec![],
            clock: clock(50_000, 50_000),
            white_draw_offer: true,
            black_draw_offer: false,
        }))
        .await;

    assert_eq!(h.factory.analyses(), 1);
    assert_eq!(h.actions.actions(), vec![Action::AcceptDraw(GAME.into())]);
    assert_eq!(session.state(), SessionState::Terminated);
}

#[tokio::test]
async fn test_draw_flag_answered_once_per_ply() {
    let h = Harness::new().await;
    h.factory.set_score(Some(Score::Centipawns(-400)));
    let mut session = h.session();
    let offer = GameEvent::StateDelta(GameDelta {
        moves: vec![],
        clock: clock(50_000, 50_000),
        white_draw_offer: true,
        black_draw_offer: false,
    });

    session.handle_event(snapshot(false, Some(MOVE_35), &[])).await;
    session.handle_event(offer.clone()).await;
    session.handle_event(offer).await;

    assert_eq!(h.actions.actions(), vec![Action::DeclineDraw(GAME.into())]);
}

#[tokio::test]
async fn test_chat_commands_answered_in_their_room() {
    let h = Harness::new().await;
    let mut session = h.session();
    session.handle_event(snapshot(false, None, &[])).await;

    session
        .handle_event(GameEvent::ChatLine {
            username: "someone".into(),
            text: " !NAME ".into(),
            room: "spectator".into(),
        })
        .await;
    session
        .handle_event(GameEvent::ChatLine {
            username: "indibot".into(),
            text: "!name".into(),
            room: "player".into(),
        })
        .await;

    assert_eq!(
        h.actions.actions(),
        vec![Action::Chat {
            game_id: GAME.into(),
            room: "spectator".into(),
            text: "My name is indibot.".into(),
        }]
    );
    assert_eq!(session.position().unwrap().applied(), 0);
}

#[tokio::test]
async fn test_terminal_status_stops_the_session() {
    let h = Harness::new().await;
    let mut session = h.session();

    let events = stream::iter(vec![
        snapshot(false, None, &[]),
        GameEvent::Status(TerminalReason::Resignation),
        delta(&["e2e4"], clock(60_000, 60_000)),
    ]);
    let state = session.consume(events).await;

    assert_eq!(state, SessionState::Terminated);
    assert!(h.factory.searches().is_empty());
    assert!(h.actions.actions().is_empty());
    assert_eq!(h.pool.status().await.unwrap().outstanding, 0);
}

#[tokio::test]
async fn test_session_leaves_games_it_cannot_play() {
    let h = Harness::new().await;

    let mut spectator = h.session();
    let mut event = snapshot(true, None, &[]);
    if let GameEvent::FullState(snap) = &mut event {
        snap.white_id = Some("alice".into());
    }
    spectator.handle_event(event).await;
    assert_eq!(spectator.state(), SessionState::Terminated);

    let mut atomic = h.session();
    let mut event = snapshot(true, None, &[]);
    if let GameEvent::FullState(snap) = &mut event {
        snap.variant = "atomic".into();
    }
    atomic.handle_event(event).await;
    assert_eq!(atomic.state(), SessionState::Terminated);
    assert!(h.factory.searches().is_empty());
}

#[tokio::test]
async fn test_no_move_when_state_line_reports_the_result() {
    let h = Harness::new().await;
    let mut session = h.session();
    session.handle_event(snapshot(false, None, &[])).await;

    // Opponent moved and then resigned; both arrive on one line
    let line = r#"{"type":"gameState","moves":"e2e4","wtime":59000,"btime":60000,"winc":0,"binc":0,"status":"resign"}"#;
    let events = parse_game_line(line).unwrap();
    let state = session.consume(stream::iter(events)).await;

    assert_eq!(state, SessionState::Terminated);
    assert!(h.factory.searches().is_empty());
    assert!(h.actions.moves().is_empty());
}

#[tokio::test]
async fn test_no_move_when_snapshot_shows_a_finished_game() {
    let h = Harness::new().await;
    let mut session = h.session();

    let line = r#"{"type":"gameFull","id":"game0001","variant":{"key":"standard"},
        "clock":{"initial":60000,"increment":0},
        "white":{"id":"indibot"},"black":{"id":"someone"},"initialFen":"startpos",
        "state":{"type":"gameState","moves":"","wtime":60000,"btime":60000,"status":"aborted"}}"#;
    let events = parse_game_line(line).unwrap();
    let state = session.consume(stream::iter(events)).await;

    assert_eq!(state, SessionState::Terminated);
    assert!(h.factory.searches().is_empty());
    assert!(h.actions.actions().is_empty());
}

#[tokio::test]
async fn test_draw_offered_on_schedule_when_losing() {
    let h = Harness::new().await;
    h.factory.set_score(Some(Score::Centipawns(-400)));
    let mut session = h.session();

    session.handle_event(snapshot(true, Some(MOVE_40), &[])).await;

    let actions = h.actions.actions();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0], Action::OfferDraw(GAME.into()));
    assert!(matches!(&actions[1], Action::Move { .. }));
    assert_eq!(h.factory.analyses(), 1);
}

#[tokio::test]
async fn test_draw_offer_considered_once_per_full_move() {
    let h = Harness::new().await;
    h.factory.set_score(Some(Score::Centipawns(-400)));
    h.factory.script_moves([None::<&str>, None, None]);
    let mut session = h.session();

    session.handle_event(snapshot(true, Some(MOVE_40), &[])).await;
    assert!(h.actions.moves().is_empty());

    // Same full move, turn retried on the next event
    session
        .handle_event(GameEvent::ChatLine {
            username: "someone".into(),
            text: "hello".into(),
            room: "player".into(),
        })
        .await;

    let offers = h
        .actions
        .actions()
        .into_iter()
        .filter(|a| matches!(a, Action::OfferDraw(_)))
        .count();
    assert_eq!(offers, 1);
    assert_eq!(h.factory.analyses(), 1);
    assert_eq!(h.actions.moves().len(), 1);
}

#[tokio::test]
async fn test_no_draw_offer_off_schedule_or_when_level() {
    let h = Harness::new().await;
    h.factory.set_score(Some(Score::Centipawns(-400)));
    let mut off_schedule = h.session();
    off_schedule.handle_event(snapshot(true, Some(MOVE_35), &[])).await;
    assert_eq!(h.factory.analyses(), 0);

    h.factory.set_score(Some(Score::Centipawns(-100)));
    let mut level = h.session();
    level.handle_event(snapshot(true, Some(MOVE_40), &[])).await;
    assert_eq!(h.factory.analyses(), 1);
    assert!(!h.actions.actions().iter().any(|a| matches!(a, Action::OfferDraw(_))));
    assert_eq!(h.actions.moves().len(), 2);
}
