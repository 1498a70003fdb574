use thiserror::Error;

/// Narration the buzzer is waiting on before it can be armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationCue {
    /// The clue of a freshly displayed question is being read.
    Question,
    /// The "incorrect" announcement after a wrong answer is being read.
    IncorrectAnswer,
}

/// Phases of the buzzer for the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuzzerPhase {
    /// No question in play.
    Idle,
    /// A question is on screen and the buzzer opens once the narration ends.
    AwaitingNarration(NarrationCue),
    /// Contestants may buzz; the question timer is running.
    Armed,
    /// A contestant holds the buzzer; the answer timer is running.
    Answering {
        /// Contestant allowed to answer.
        contestant: String,
    },
    /// A wager question waits for the selecting contestant's bet.
    AwaitingWager,
}

/// Events that move the buzzer between phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuzzerEvent {
    /// A regular question was displayed.
    QuestionShown,
    /// A wager question was displayed.
    WagerShown,
    /// The bet was accepted and the bettor answers directly.
    WagerAccepted {
        /// Contestant who placed the bet.
        contestant: String,
    },
    /// Narration finished; open the buzzer.
    Arm,
    /// A contestant buzzed in.
    Buzz {
        /// Contestant who buzzed.
        contestant: String,
    },
    /// The contestant holding the buzzer answered correctly.
    AnsweredCorrectly,
    /// The contestant holding the buzzer answered incorrectly.
    AnsweredIncorrectly,
    /// Nobody buzzed before the question timer fired.
    TimedOut,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid buzzer transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the buzzer was in when the invalid event was received.
    pub from: BuzzerPhase,
    /// The event that cannot be applied from this phase.
    pub event: BuzzerEvent,
}

/// Buzzer state machine; only the transitions listed in `compute_transition` are legal.
#[derive(Debug, Clone)]
pub struct BuzzerMachine {
    phase: BuzzerPhase,
    version: usize,
}

impl Default for BuzzerMachine {
    fn default() -> Self {
        Self {
            phase: BuzzerPhase::Idle,
            version: 0,
        }
    }
}

impl BuzzerMachine {
    /// Create a machine in the idle phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> &BuzzerPhase {
        &self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Contestant currently holding the buzzer.
    pub fn answering(&self) -> Option<&str> {
        match &self.phase {
            BuzzerPhase::Answering { contestant } => Some(contestant),
            _ => None,
        }
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: BuzzerEvent) -> Result<&BuzzerPhase, InvalidTransition> {
        self.phase = self.compute_transition(event)?;
        self.version += 1;
        Ok(&self.phase)
    }

    /// Drop back to idle from any phase (question dismissed).
    pub fn reset(&mut self) {
        if self.phase != BuzzerPhase::Idle {
            self.phase = BuzzerPhase::Idle;
            self.version += 1;
        }
    }

    fn compute_transition(&self, event: BuzzerEvent) -> Result<BuzzerPhase, InvalidTransition> {
        let next = match (&self.phase, event) {
            (_, BuzzerEvent::QuestionShown) => {
                BuzzerPhase::AwaitingNarration(NarrationCue::Question)
            }
            (_, BuzzerEvent::WagerShown) => BuzzerPhase::AwaitingWager,
            (BuzzerPhase::AwaitingWager, BuzzerEvent::WagerAccepted { contestant }) => {
                BuzzerPhase::Answering { contestant }
            }
            (BuzzerPhase::AwaitingNarration(_), BuzzerEvent::Arm) => BuzzerPhase::Armed,
            (BuzzerPhase::Armed, BuzzerEvent::Buzz { contestant }) => {
                BuzzerPhase::Answering { contestant }
            }
            (BuzzerPhase::Armed, BuzzerEvent::TimedOut) => BuzzerPhase::Idle,
            (BuzzerPhase::Answering { .. }, BuzzerEvent::AnsweredCorrectly) => BuzzerPhase::Idle,
            (BuzzerPhase::Answering { .. }, BuzzerEvent::AnsweredIncorrectly) => {
                BuzzerPhase::AwaitingNarration(NarrationCue::IncorrectAnswer)
            }
            (from, event) => {
                return Err(InvalidTransition {
                    from: from.clone(),
                    event,
                });
            }
        };

        Ok(next)
    }
}
