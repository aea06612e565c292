//! Outbound calls to the game server, as seen by sessions and the listener.

use async_trait::async_trait;

use crate::challenge::DeclineReason;
use crate::error::BotError;

#[async_trait]
pub trait GameActions: Send + Sync {
    async fn make_move(&self, game_id: &str, uci: &str) -> Result<(), BotError>;

    async fn accept_draw(&self, game_id: &str) -> Result<(), BotError>;

    async fn decline_draw(&self, game_id: &str) -> Result<(), BotError>;

    async fn offer_draw(&self, game_id: &str) -> Result<(), BotError>;

    async fn post_chat(&self, game_id: &str, room: &str, text: &str) -> Result<(), BotError>;
}

#[async_trait]
pub trait ChallengeActions: Send + Sync {
    async fn accept_challenge(&self, challenge_id: &str) -> Result<(), BotError>;

    async fn decline_challenge(
        &self,
        challenge_id: &str,
        reason: DeclineReason,
    ) -> Result<(), BotError>;
}
