//! Chat command replies

/// Canned replies to `!command` messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRouter {
    own_id: String,
    prefix: char,
    responses: Vec<(String, String)>,
}

impl ChatRouter {
    /// Router with the standard vocabulary: about, name, motor, owner.
    pub fn new(own_id: &str, owner: Option<&str>) -> Self {
        let owner = owner.unwrap_or(own_id);
        Self::with_responses(
            own_id,
            vec![
                (
                    "about".to_string(),
                    "This is a chess bot powered by Stockfish and Rust.".to_string(),
                ),
                ("name".to_string(), format!("My name is {own_id}.")),
                ("motor".to_string(), "I use the Stockfish chess engine.".to_string()),
                ("owner".to_string(), format!("My owner is @{owner}.")),
            ],
        )
    }

    pub fn with_responses(own_id: &str, responses: Vec<(String, String)>) -> Self {
        Self {
            own_id: own_id.to_string(),
            prefix: '!',
            responses: responses
                .into_iter()
                .map(|(command, reply)| (command.to_lowercase(), reply))
                .collect(),
        }
    }

    /// Reply for a chat line, if it is a known command from someone else.
    pub fn route(&self, sender: &str, text: &str) -> Option<&str> {
        if sender.eq_ignore_ascii_case(&self.own_id) {
            return None;
        }
        let command = text.trim().strip_prefix(self.prefix)?.trim().to_lowercase();
        self.responses
            .iter()
            .find(|(name, _)| *name == command)
            .map(|(_, reply)| reply.as_str())
    }
}
