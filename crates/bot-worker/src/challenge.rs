//! Challenge acceptance policy

use serde::{Deserialize, Serialize};

/// Clock settings of a proposed game, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    pub limit: u32,
    pub increment: u32,
}

/// An incoming challenge, reduced to the fields the policy looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeProposal {
    pub id: String,
    pub variant: String,
    pub rated: bool,
    /// `None` for unlimited or correspondence games
    pub time_control: Option<TimeControl>,
    pub challenger: String,
}

/// Why a challenge was turned down, as understood by Lichess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    Generic,
    Variant,
    Casual,
    TimeControl,
}

impl DeclineReason {
    pub fn as_key(self) -> &'static str {
        match self {
            DeclineReason::Generic => "generic",
            DeclineReason::Variant => "variant",
            DeclineReason::Casual => "casual",
            DeclineReason::TimeControl => "timeControl",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeDecision {
    Accept,
    Decline(DeclineReason),
    /// Our own outgoing challenge echoed back; no response is sent
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengePolicy {
    pub allowed_variants: Vec<String>,
    pub allow_rated: bool,
    pub min_limit_secs: u32,
    pub max_limit_secs: u32,
    /// Zero rejects every challenge with an increment
    pub max_increment_secs: u32,
}

impl Default for ChallengePolicy {
    fn default() -> Self {
        Self {
            allowed_variants: vec!["standard".to_string(), "chess960".to_string()],
            allow_rated: false,
            min_limit_secs: 30,
            max_limit_secs: 300,
            max_increment_secs: 0,
        }
    }
}

impl ChallengePolicy {
    pub fn evaluate(&self, proposal: &ChallengeProposal, own_id: &str) -> ChallengeDecision {
        if proposal.challenger.eq_ignore_ascii_case(own_id) {
            return ChallengeDecision::Ignore;
        }

        if !self.allowed_variants.iter().any(|v| v == &proposal.variant) {
            return ChallengeDecision::Decline(DeclineReason::Variant);
        }

        if proposal.rated && !self.allow_rated {
            return ChallengeDecision::Decline(DeclineReason::Casual);
        }

        let Some(tc) = proposal.time_control else {
            return ChallengeDecision::Decline(DeclineReason::TimeControl);
        };
        if tc.limit < self.min_limit_secs
            || tc.limit > self.max_limit_secs
            || tc.increment > self.max_increment_secs
        {
            return ChallengeDecision::Decline(DeclineReason::TimeControl);
        }

        ChallengeDecision::Accept
    }
}
