use thiserror::Error;
use validator::ValidationErrors;

use crate::state::buzzer::InvalidTransition;

/// Errors surfaced to callers of the match entry points.
///
/// Only caller mistakes end up here; collaborator failures and state
/// inconsistencies are logged and absorbed where they happen.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The match has not started yet.
    #[error("waiting for {missing} more contestant(s)")]
    WaitingForPlayers {
        /// Contestants still missing before the match can start.
        missing: usize,
    },
    /// The buzzer is not armed for this contestant.
    #[error("buzzer is not armed")]
    BuzzerNotArmed,
    /// The wager is outside the accepted range.
    #[error("wager {bet} outside accepted range {min}..={max}")]
    InvalidWager {
        /// Rejected bet.
        bet: i32,
        /// Smallest accepted bet.
        min: i32,
        /// Largest accepted bet.
        max: i32,
    },
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

/// Failure reported by the narration collaborator.
#[derive(Debug, Error)]
pub enum NarrationError {
    /// The narration backend rejected or failed the request.
    #[error("narration backend failed: {0}")]
    Backend(String),
}

/// Failure reported by the answer judge collaborator.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The judge did not answer before the deadline.
    #[error("answer judge timed out")]
    Timeout,
}
