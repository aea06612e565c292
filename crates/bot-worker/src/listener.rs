//! Long-running loops: the account event stream, one task per game and the
//! keep-alive.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::actions::ChallengeActions;
use crate::challenge::{ChallengeDecision, ChallengePolicy, DeclineReason, TimeControl};
use crate::clients::LichessClient;
use crate::events::{game_events, parse_incoming, IncomingEvent};
use crate::session::{GameSession, SessionContext, SessionState};

const EVENT_STREAM_RETRY: Duration = Duration::from_secs(5);
const GAME_STREAM_RETRY: Duration = Duration::from_secs(2);
const MAX_GAME_STREAM_RECONNECTS: u32 = 5;

/// Time controls of accepted challenges, keyed by challenge id. Lichess
/// reuses the challenge id as the game id.
#[derive(Clone, Default)]
pub struct TimeControls {
    inner: Arc<Mutex<HashMap<String, TimeControl>>>,
}

impl TimeControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, challenge_id: &str, time_control: TimeControl) {
        self.inner.lock().await.insert(challenge_id.to_string(), time_control);
    }

    /// Remove and return the entry; each game reads it once.
    pub async fn take(&self, id: &str) -> Option<TimeControl> {
        self.inner.lock().await.remove(id)
    }
}

/// Games with a running task, so a repeated `gameStart` does not start a
/// second session.
#[derive(Clone, Default)]
pub struct ActiveGames {
    inner: Arc<StdMutex<HashSet<String>>>,
}

impl ActiveGames {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `None` when the game already has a task. The game stays claimed until
    /// the returned guard drops, however its task ends.
    pub fn claim(&self, game_id: &str) -> Option<GameClaim> {
        if !self.lock().insert(game_id.to_string()) {
            return None;
        }
        Some(GameClaim {
            games: self.clone(),
            game_id: game_id.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Marks a game as running for as long as it lives.
pub struct GameClaim {
    games: ActiveGames,
    game_id: String,
}

impl Drop for GameClaim {
    fn drop(&mut self) {
        self.games.lock().remove(&self.game_id);
    }
}

/// React to one account event. Returns the id of a game to start playing.
pub async fn handle_incoming(
    event: IncomingEvent,
    policy: &ChallengePolicy,
    own_id: &str,
    actions: &dyn ChallengeActions,
    time_controls: &TimeControls,
) -> Option<String> {
    match event {
        IncomingEvent::Challenge(proposal) => {
            let decision = policy.evaluate(&proposal, own_id);
            info!(
                challenge_id = %proposal.id,
                challenger = %proposal.challenger,
                variant = %proposal.variant,
                rated = proposal.rated,
                time_control = ?proposal.time_control,
                decision = ?decision,
                "Challenge"
            );
            match decision {
                ChallengeDecision::Accept => {
                    if let Some(tc) = proposal.time_control {
                        time_controls.insert(&proposal.id, tc).await;
                    }
                    if let Err(e) = actions.accept_challenge(&proposal.id).await {
                        warn!(challenge_id = %proposal.id, error = %e, "Failed to accept challenge");
                        time_controls.take(&proposal.id).await;
                    }
                }
                ChallengeDecision::Decline(reason) => {
                    if let Err(e) = actions.decline_challenge(&proposal.id, reason).await {
                        warn!(challenge_id = %proposal.id, error = %e, "Failed to decline challenge");
                    }
                }
                ChallengeDecision::Ignore => {}
            }
            None
        }
        IncomingEvent::MalformedChallenge(id) => {
            warn!(challenge_id = %id, "Unreadable challenge, declining");
            if let Err(e) = actions.decline_challenge(&id, DeclineReason::Generic).await {
                warn!(challenge_id = %id, error = %e, "Failed to decline challenge");
            }
            None
        }
        IncomingEvent::GameStart(game_id) => Some(game_id),
        IncomingEvent::GameFinish(game_id) => {
            debug!(game_id = %game_id, "Game finished");
            None
        }
        IncomingEvent::Other => None,
    }
}

/// Follow the account event stream forever, reconnecting when it drops.
pub async fn run_event_loop(client: LichessClient, policy: ChallengePolicy, ctx: Arc<SessionContext>) {
    let time_controls = TimeControls::new();
    let active = ActiveGames::new();

    loop {
        match client.stream_events().await {
            Ok(mut lines) => {
                info!("Listening for challenges");
                while let Some(line) = lines.next().await {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(error = %e, "Event stream interrupted");
                            break;
                        }
                    };
                    let event = match parse_incoming(&line) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(error = %e, line = %line, "Skipping unreadable event");
                            continue;
                        }
                    };
                    let Some(game_id) =
                        handle_incoming(event, &policy, &ctx.own_id, &client, &time_controls).await
                    else {
                        continue;
                    };
                    let Some(claim) = active.claim(&game_id) else {
                        debug!(game_id = %game_id, "Game already running");
                        continue;
                    };
                    let time_control = time_controls.take(&game_id).await;
                    let client = client.clone();
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        let _claim = claim;
                        run_game(&client, ctx, &game_id, time_control).await;
                    });
                }
                warn!("Event stream ended");
            }
            Err(e) => error!(error = %e, "Failed to open event stream"),
        }
        tokio::time::sleep(EVENT_STREAM_RETRY).await;
    }
}

/// Play one game, reopening its stream a bounded number of times if it ends
/// before the game does.
pub async fn run_game(
    client: &LichessClient,
    ctx: Arc<SessionContext>,
    game_id: &str,
    time_control: Option<TimeControl>,
) -> SessionState {
    info!(game_id, time_control = ?time_control, "Starting game");
    let mut session = GameSession::new(game_id, ctx).with_time_control(time_control);

    for attempt in 0..=MAX_GAME_STREAM_RECONNECTS {
        if attempt > 0 {
            tokio::time::sleep(GAME_STREAM_RETRY).await;
            info!(game_id, attempt, "Reconnecting game stream");
        }
        match client.stream_game(game_id).await {
            Ok(lines) => {
                if session.consume(game_events(lines)).await == SessionState::Terminated {
                    break;
                }
                warn!(game_id, "Game stream ended before the game");
            }
            Err(e) => warn!(game_id, error = %e, "Failed to open game stream"),
        }
    }

    let state = session.state();
    info!(game_id, state = ?state, "Leaving game");
    state
}

/// Poll the account endpoint so idle connections are not dropped.
pub async fn keep_alive(client: LichessClient, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match client.account().await {
            Ok(_) => debug!("Keep-alive ok"),
            Err(e) => warn!(error = %e, "Keep-alive failed"),
        }
    }
}
