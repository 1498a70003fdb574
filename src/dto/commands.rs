use serde::Deserialize;
use validator::ValidationErrors;

use crate::{dto::validation::validate_contestant_name, error::ServiceError, state::audio::AudioId};

#[derive(Debug, Deserialize, PartialEq, Eq)]
/// Messages accepted from contestants and presenters of a match.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the lobby.
    Register { name: String },
    /// Put a clue on screen.
    DisplayQuestion { category: String, value: i32 },
    /// Contestant pressed the buzzer.
    Buzz { contestant: String },
    /// Free-text answer, evaluated by the judge.
    SubmitAnswer { contestant: String, answer: String },
    /// Presenter override: score the current answer directly.
    Answer {
        correct: bool,
        #[serde(default)]
        contestant: Option<String>,
    },
    /// Take the current clue off screen.
    Dismiss,
    /// Bet on the current wager clue.
    Wager { contestant: String, bet: i32 },
    /// Presenter finished playing a narration item.
    AudioComplete { audio_id: AudioId },
    /// Contestant chat line.
    Chat { contestant: String, message: String },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse one JSON message, validating fields that carry user input.
    pub fn from_json_str(raw: &str) -> Result<Self, ServiceError> {
        let message: Self = serde_json::from_str(raw)
            .map_err(|err| ServiceError::InvalidInput(format!("malformed message: {err}")))?;
        if let Self::Register { name } = &message
            && let Err(err) = validate_contestant_name(name)
        {
            let mut errors = ValidationErrors::new();
            errors.add("name", err);
            return Err(errors.into());
        }
        Ok(message)
    }
}
