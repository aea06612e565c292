//! Endgame tablebase probing over HTTP.

use async_trait::async_trait;
use chess_core::GamePosition;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::BotError;

/// A root move with its outcome for the side to move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablebaseMove {
    pub uci: String,
    /// 2 win, 1 cursed win, 0 draw, -1 blessed loss, -2 loss
    pub wdl: i32,
    /// Plies to the next zeroing move, positive when winning
    pub dtz: Option<i32>,
}

#[async_trait]
pub trait TablebaseProbe: Send + Sync {
    async fn probe(&self, position: &GamePosition) -> Result<Vec<TablebaseMove>, BotError>;
}

/// Client for a Lichess-compatible tablebase server.
pub struct HttpTablebase {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ProbeResponse {
    #[serde(default)]
    moves: Vec<ProbeMove>,
}

#[derive(Debug, Deserialize)]
struct ProbeMove {
    uci: String,
    category: String,
    #[serde(default)]
    dtz: Option<i32>,
}

impl HttpTablebase {
    pub fn new(base_url: &str) -> Result<Self, BotError> {
        let client = Client::builder()
            .user_agent("indibot/0.1")
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TablebaseProbe for HttpTablebase {
    async fn probe(&self, position: &GamePosition) -> Result<Vec<TablebaseMove>, BotError> {
        let fen = position.fen();
        let resp = self
            .client
            .get(format!("{}/standard", self.base_url))
            .query(&[("fen", fen.as_str())])
            .send()
            .await
            .map_err(|e| BotError::Tablebase(format!("Request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(BotError::Tablebase(format!("HTTP {}", resp.status())));
        }

        let body: ProbeResponse = resp
            .json()
            .await
            .map_err(|e| BotError::Tablebase(format!("JSON parse error: {e}")))?;

        let moves: Vec<TablebaseMove> = body.moves.into_iter().filter_map(root_move).collect();
        debug!(fen = %fen, count = moves.len(), "Tablebase probed");
        Ok(moves)
    }
}

/// The server reports each move from the opponent's side after it is
/// played; flip both the class and the distance.
fn root_move(mv: ProbeMove) -> Option<TablebaseMove> {
    let wdl = match mv.category.as_str() {
        "loss" => 2,
        "blessed-loss" => 1,
        "draw" => 0,
        "cursed-win" => -1,
        "win" => -2,
        _ => return None,
    };
    Some(TablebaseMove {
        uci: mv.uci,
        wdl,
        dtz: mv.dtz.map(|d| -d),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_mapping() {
        let json = r#"{
            "category": "win",
            "dtz": 3,
            "moves": [
                {"uci": "h7h8q", "san": "h8=Q", "category": "loss", "dtz": -2},
                {"uci": "e1d1", "san": "Kd1", "category": "draw", "dtz": 0},
                {"uci": "e1f1", "san": "Kf1", "category": "cursed-win", "dtz": 101},
                {"uci": "e1e2", "san": "Ke2", "category": "unknown", "dtz": null}
            ]
        }"#;
        let body: ProbeResponse = serde_json::from_str(json).unwrap();
        let moves: Vec<TablebaseMove> = body.moves.into_iter().filter_map(root_move).collect();
        assert_eq!(moves.len(), 3);
        assert_eq!(moves[0], TablebaseMove { uci: "h7h8q".into(), wdl: 2, dtz: Some(2) });
        assert_eq!(moves[1].wdl, 0);
        assert_eq!(moves[2], TablebaseMove { uci: "e1f1".into(), wdl: -1, dtz: Some(-101) });
    }
}
