use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde_json::Value;

use crate::actions::{ChallengeActions, GameActions};
use crate::challenge::DeclineReason;
use crate::error::BotError;

/// Lichess Bot API client. Clones share one connection pool.
#[derive(Clone)]
pub struct LichessClient {
    client: Client,
    base_url: String,
}

impl LichessClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, BotError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| BotError::Config("LICHESS_TOKEN is not a valid header value".into()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        // No overall timeout: the event streams stay open for hours
        let client = Client::builder()
            .user_agent("indibot/0.1")
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the bot account; used as a keep-alive and to confirm the token.
    pub async fn account(&self) -> Result<Value, BotError> {
        let resp = self
            .client
            .get(format!("{}/api/account", self.base_url))
            .send()
            .await?;
        let resp = check_status(resp, "account").await?;
        Ok(resp.json().await?)
    }

    /// Open the account event stream.
    pub async fn stream_events(&self) -> Result<BoxStream<'static, Result<String, BotError>>, BotError> {
        let resp = self
            .client
            .get(format!("{}/api/stream/event", self.base_url))
            .send()
            .await?;
        let resp = check_status(resp, "event stream").await?;
        Ok(ndjson_lines(resp))
    }

    /// Open one game's state stream.
    pub async fn stream_game(&self, game_id: &str) -> Result<BoxStream<'static, Result<String, BotError>>, BotError> {
        let resp = self
            .client
            .get(format!("{}/api/bot/game/stream/{game_id}", self.base_url))
            .send()
            .await?;
        let resp = check_status(resp, "game stream").await?;
        Ok(ndjson_lines(resp))
    }

    async fn post(&self, path: &str, form: &[(&str, &str)]) -> Result<(), BotError> {
        let mut request = self.client.post(format!("{}{path}", self.base_url));
        if !form.is_empty() {
            request = request.form(form);
        }
        let resp = request.send().await?;
        check_status(resp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl GameActions for LichessClient {
    async fn make_move(&self, game_id: &str, uci: &str) -> Result<(), BotError> {
        self.post(&format!("/api/bot/game/{game_id}/move/{uci}"), &[]).await
    }

    async fn accept_draw(&self, game_id: &str) -> Result<(), BotError> {
        self.post(&format!("/api/bot/game/{game_id}/draw/yes"), &[]).await
    }

    async fn decline_draw(&self, game_id: &str) -> Result<(), BotError> {
        self.post(&format!("/api/bot/game/{game_id}/draw/no"), &[]).await
    }

    async fn offer_draw(&self, game_id: &str) -> Result<(), BotError> {
        // Lichess treats "yes" as an offer when none is pending
        self.post(&format!("/api/bot/game/{game_id}/draw/yes"), &[]).await
    }

    async fn post_chat(&self, game_id: &str, room: &str, text: &str) -> Result<(), BotError> {
        self.post(
            &format!("/api/bot/game/{game_id}/chat"),
            &[("room", room), ("text", text)],
        )
        .await
    }
}

#[async_trait]
impl ChallengeActions for LichessClient {
    async fn accept_challenge(&self, challenge_id: &str) -> Result<(), BotError> {
        self.post(&format!("/api/challenge/{challenge_id}/accept"), &[]).await
    }

    async fn decline_challenge(&self, challenge_id: &str, reason: DeclineReason) -> Result<(), BotError> {
        self.post(
            &format!("/api/challenge/{challenge_id}/decline"),
            &[("reason", reason.as_key())],
        )
        .await
    }
}

async fn check_status(resp: Response, what: &str) -> Result<Response, BotError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BotError::Lichess(format!("{what}: HTTP {status} {}", body.trim())))
}

/// Split a streaming body into non-empty lines. Lichess sends bare newlines
/// as keep-alives; those are dropped here.
fn ndjson_lines(resp: Response) -> BoxStream<'static, Result<String, BotError>> {
    let chunks = resp.bytes_stream().boxed();
    stream::unfold((chunks, Vec::<u8>::new(), false), |(mut chunks, mut buffer, mut done)| async move {
        loop {
            if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let rest = buffer.split_off(pos + 1);
                let line = std::mem::replace(&mut buffer, rest);
                let text = String::from_utf8_lossy(&line).trim().to_string();
                if text.is_empty() {
                    continue;
                }
                return Some((Ok(text), (chunks, buffer, done)));
            }
            if done {
                let text = String::from_utf8_lossy(&buffer).trim().to_string();
                buffer.clear();
                if text.is_empty() {
                    return None;
                }
                return Some((Ok(text), (chunks, buffer, done)));
            }
            match chunks.next().await {
                Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    done = true;
                    buffer.clear();
                    return Some((Err(BotError::Http(e)), (chunks, buffer, done)));
                }
                None => done = true,
            }
        }
    })
    .boxed()
}
