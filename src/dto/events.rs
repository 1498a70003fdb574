use indexmap::IndexMap;
use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::state::{
    audio::{AudioId, AudioKind},
    game::{ActiveQuestion, Contestant},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried to every presenter of a room.
pub struct ServerEvent {
    /// Topic name, e.g. `question-display`.
    pub topic: String,
    /// Join code of the match the event belongs to.
    pub room: String,
    /// JSON-encoded payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<T>(topic: &str, room: &str, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            topic: topic.to_string(),
            room: room.to_string(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Decode the payload back into a JSON value.
    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.data)
    }
}

#[derive(Debug, Clone, Serialize)]
/// Public view of a contestant.
pub struct ContestantSummary {
    pub name: String,
    pub score: i32,
}

impl From<&Contestant> for ContestantSummary {
    fn from(contestant: &Contestant) -> Self {
        Self {
            name: contestant.name.clone(),
            score: contestant.score,
        }
    }
}

#[derive(Debug, Serialize)]
/// Broadcast when a clue goes on screen (or a wager clue is revealed after the bet).
pub struct QuestionDisplayEvent {
    pub category: String,
    pub value: i32,
    pub clue: String,
    pub is_wager: bool,
}

impl From<&ActiveQuestion> for QuestionDisplayEvent {
    fn from(question: &ActiveQuestion) -> Self {
        Self {
            category: question.category.clone(),
            value: question.value,
            clue: question.clue.clone(),
            is_wager: question.is_wager,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
/// Broadcast when the current clue leaves the screen.
pub struct QuestionDismissEvent {
    pub category: Option<String>,
    pub value: Option<i32>,
    /// Revealed answer, if the dismissal reveals it.
    pub answer: Option<String>,
}

#[derive(Debug, Serialize)]
/// Broadcast whenever the buzzer opens or closes.
pub struct BuzzerStatusEvent {
    pub active: bool,
    /// Contestants locked out of the current clue.
    pub incorrect_players: Vec<String>,
}

#[derive(Debug, Serialize)]
/// Broadcast when a contestant wins the buzz race.
pub struct PlayerBuzzedEvent {
    pub contestant: String,
}

#[derive(Debug, Serialize)]
/// Broadcast when an answer has been scored.
pub struct AnswerResultEvent {
    pub contestant: String,
    pub correct: bool,
    /// Points applied, positive or negative.
    pub delta: i32,
    pub score: i32,
    pub answer: String,
}

#[derive(Debug, Serialize)]
/// Broadcast when a contestant must pick the next clue.
pub struct SelectNextQuestionEvent {
    pub contestant: String,
}

#[derive(Debug, Serialize)]
/// Broadcast once the board is exhausted.
pub struct GameCompletedEvent {
    pub winner: Option<ContestantSummary>,
    pub scores: IndexMap<String, i32>,
}

#[derive(Debug, Serialize)]
/// Broadcast when a contestant's answer countdown starts.
pub struct AnswerTimerStartEvent {
    pub player: String,
    pub seconds: u64,
}

#[derive(Debug, Serialize)]
/// Broadcast when the answer countdown stops early.
pub struct AnswerTimerStopEvent {
    pub player: String,
}

#[derive(Debug, Serialize)]
/// Broadcast after every score change.
pub struct ContestantScoresEvent {
    pub scores: IndexMap<String, i32>,
}

#[derive(Debug, Serialize)]
/// Host or contestant chat line.
pub struct ChatMessageEvent {
    pub username: String,
    pub message: String,
    pub is_host: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
/// Broadcast whenever the roster changes.
pub struct PlayerListEvent {
    pub contestants: Vec<ContestantSummary>,
}

#[derive(Debug, Serialize)]
/// Broadcast while the lobby fills up.
pub struct GameReadyEvent {
    pub ready: bool,
    pub missing: usize,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
/// Broadcast when a wager clue is picked; the clue stays hidden until the bet.
pub struct WagerDisplayEvent {
    pub category: String,
    pub value: i32,
    pub contestant: Option<String>,
}

#[derive(Debug, Serialize)]
/// Broadcast when a bet has been accepted.
pub struct WagerAcceptedEvent {
    pub contestant: String,
    pub bet: i32,
}

#[derive(Debug, Serialize)]
/// Asks the presenter to speak a narration item and report its completion.
pub struct PlayAudioEvent {
    pub audio_id: AudioId,
    pub text: String,
    pub kind: AudioKind,
}

#[derive(Debug, Serialize)]
/// Broadcast when a request was rejected.
pub struct MatchErrorEvent {
    pub message: String,
}
