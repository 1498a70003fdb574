use std::{collections::HashSet, time::SystemTime};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::state::{
    buzzer::{BuzzerMachine, BuzzerPhase},
    timer::{ArmedTimer, TimerKind},
};

/// Runtime representation of the board loaded for a match.
#[derive(Debug, Clone, Default)]
pub struct Board {
    /// Categories in board order.
    pub categories: Vec<Category>,
}

/// One column of the board.
#[derive(Debug, Clone)]
pub struct Category {
    /// Display name of the category.
    pub name: String,
    /// Questions in ascending board order.
    pub questions: Vec<Question>,
}

/// A single clue on the board.
#[derive(Debug, Clone)]
pub struct Question {
    /// Clue read to the contestants.
    pub clue: String,
    /// Expected answer.
    pub answer: String,
    /// Points awarded or deducted; overwritten by the bet for wager questions.
    pub value: i32,
    /// Whether the clue has already been played.
    pub used: bool,
    /// Whether the selecting contestant bets on this clue before it is revealed.
    pub is_wager: bool,
}

/// Position of a question inside the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionRef {
    /// Index of the category in board order.
    pub category: usize,
    /// Index of the question inside its category.
    pub question: usize,
}

impl Board {
    /// Locate a question by category name and value.
    ///
    /// Category names are matched exactly first, then case-insensitively, then
    /// by substring in either direction. Inside each tier the first category in
    /// board order holding a question with `value` wins.
    pub fn find(&self, category: &str, value: i32) -> Option<QuestionRef> {
        let wanted = category.to_lowercase();

        self.find_in_tier(value, |name| name == category)
            .or_else(|| self.find_in_tier(value, |name| name.to_lowercase() == wanted))
            .or_else(|| {
                self.find_in_tier(value, |name| {
                    let name = name.to_lowercase();
                    name.contains(&wanted) || wanted.contains(&name)
                })
            })
    }

    fn find_in_tier(&self, value: i32, matches: impl Fn(&str) -> bool) -> Option<QuestionRef> {
        self.categories
            .iter()
            .enumerate()
            .filter(|(_, cat)| matches(&cat.name))
            .find_map(|(category, cat)| {
                cat.questions
                    .iter()
                    .position(|q| q.value == value)
                    .map(|question| QuestionRef { category, question })
            })
    }

    /// Borrow the question at `at`.
    pub fn question(&self, at: QuestionRef) -> Option<&Question> {
        self.categories.get(at.category)?.questions.get(at.question)
    }

    /// Mutably borrow the question at `at`.
    pub fn question_mut(&mut self, at: QuestionRef) -> Option<&mut Question> {
        self.categories
            .get_mut(at.category)?
            .questions
            .get_mut(at.question)
    }

    /// Name of the category at `at`.
    pub fn category_name(&self, at: QuestionRef) -> Option<&str> {
        self.categories.get(at.category).map(|c| c.name.as_str())
    }

    /// True once every question on the board has been played.
    pub fn all_used(&self) -> bool {
        self.categories
            .iter()
            .flat_map(|c| c.questions.iter())
            .all(|q| q.used)
    }

    /// `(category, value)` pairs of every unplayed question, in board order.
    pub fn unused_clues(&self) -> Vec<(String, i32)> {
        self.categories
            .iter()
            .flat_map(|c| {
                c.questions
                    .iter()
                    .filter(|q| !q.used)
                    .map(move |q| (c.name.clone(), q.value))
            })
            .collect()
    }
}

/// Contestant registered in a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contestant {
    /// Unique display name.
    pub name: String,
    /// Cumulative score.
    pub score: i32,
}

/// Lifecycle of a match inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// Waiting for contestants.
    Lobby,
    /// Questions are being played.
    Active,
    /// The board is exhausted and the winner announced.
    Completed,
}

/// Question currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveQuestion {
    /// Monotonic display counter, used to match narration back to its question.
    pub serial: u64,
    /// Board position of the question.
    pub at: QuestionRef,
    /// Category name as stored on the board.
    pub category: String,
    /// Current value (the bet, once a wager is accepted).
    pub value: i32,
    /// Clue text.
    pub clue: String,
    /// Expected answer.
    pub answer: String,
    /// Whether this is a wager question.
    pub is_wager: bool,
    /// Contestant who placed the accepted bet.
    pub wagered_by: Option<String>,
}

/// Winner computation performed when the board runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Highest-scoring contestant, first registered on ties.
    pub winner: Option<Contestant>,
    /// Final scores in registration order.
    pub scores: IndexMap<String, i32>,
}

/// What a dismissal changed, so callers can broadcast after releasing the lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dismissal {
    /// The question that was on screen, if any.
    pub question: Option<ActiveQuestion>,
    /// Whether the buzzer was armed before dismissal.
    pub was_armed: bool,
    /// Set when this dismissal exhausted the board.
    pub completion: Option<Completion>,
}

/// Aggregate per-match state guarded by the match context lock.
#[derive(Debug)]
pub struct MatchState {
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Board loaded at match creation.
    pub board: Board,
    /// Contestants keyed by name, in registration order.
    pub contestants: IndexMap<String, Contestant>,
    /// Question on screen.
    pub current: Option<ActiveQuestion>,
    /// Buzzer state machine.
    pub buzzer: BuzzerMachine,
    /// Contestant who buzzed last and still holds answering rights.
    pub last_buzzer: Option<String>,
    /// Contestants who already answered the current question incorrectly.
    pub incorrect: HashSet<String>,
    /// Re-arm the buzzer once the incorrect-answer narration finishes.
    pub expecting_reactivation: bool,
    /// Serial of the question whose answer is being judged.
    pub judging: Option<u64>,
    /// Contestant holding board control.
    pub controller: Option<String>,
    /// Question or answer timeout; at most one exists at a time.
    pub timer: Option<ArmedTimer>,
    /// Last question serial handed out.
    pub question_serial: u64,
    /// Wall-clock creation time.
    pub created_at: SystemTime,
    /// Wall-clock completion time.
    pub completed_at: Option<SystemTime>,
}

impl MatchState {
    /// Build a lobby state around a freshly loaded board.
    pub fn new(board: Board) -> Self {
        Self {
            status: MatchStatus::Lobby,
            board,
            contestants: IndexMap::new(),
            current: None,
            buzzer: BuzzerMachine::new(),
            last_buzzer: None,
            incorrect: HashSet::new(),
            expecting_reactivation: false,
            judging: None,
            controller: None,
            timer: None,
            question_serial: 0,
            created_at: SystemTime::now(),
            completed_at: None,
        }
    }

    /// Current buzzer phase.
    pub fn phase(&self) -> &BuzzerPhase {
        self.buzzer.phase()
    }

    /// Whether contestants may buzz right now.
    pub fn buzzer_armed(&self) -> bool {
        matches!(self.buzzer.phase(), BuzzerPhase::Armed)
    }

    /// Install a new timer, cancelling whichever timer occupied the slot.
    pub fn arm_timer(&mut self, timer: ArmedTimer) {
        if let Some(previous) = self.timer.replace(timer) {
            debug!(kind = ?previous.kind(), "replacing armed timer");
            previous.cancel();
        }
    }

    /// Cancel the armed timer, if any. Safe to call repeatedly.
    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    /// Cancel the armed timer only when it is of the given kind.
    pub fn cancel_timer_if(&mut self, predicate: impl Fn(&TimerKind) -> bool) {
        if self.timer.as_ref().is_some_and(|t| predicate(t.kind())) {
            self.cancel_timer();
        }
    }

    /// Claim the armed timer when it is still the one identified by `id`.
    ///
    /// Returns `None` when the timer was cancelled or replaced after it woke up.
    pub fn claim_timer(&mut self, id: uuid::Uuid) -> Option<TimerKind> {
        if self.timer.as_ref().is_some_and(|t| t.id() == id) {
            self.timer.take().map(ArmedTimer::into_kind)
        } else {
            None
        }
    }

    /// True when every registered contestant answered the current question incorrectly.
    pub fn everyone_missed(&self) -> bool {
        !self.contestants.is_empty()
            && self
                .contestants
                .keys()
                .all(|name| self.incorrect.contains(name))
    }

    /// Highest-scoring contestant; the first one in registration order wins ties.
    pub fn leading_contestant(&self) -> Option<&Contestant> {
        self.contestants.values().fold(None, |best, candidate| match best {
            Some(current) if current.score >= candidate.score => Some(current),
            _ => Some(candidate),
        })
    }

    /// Snapshot of every score in registration order.
    pub fn scores(&self) -> IndexMap<String, i32> {
        self.contestants
            .values()
            .map(|c| (c.name.clone(), c.score))
            .collect()
    }

    /// Contestants still missing before the match may start.
    pub fn missing_contestants(&self, required: usize) -> usize {
        required.saturating_sub(self.contestants.len())
    }

    /// Clear the current question and every per-question buzzer field.
    ///
    /// Always resets, even without an active question; only a real dismissal
    /// reports the question and may complete the match.
    pub fn dismiss(&mut self) -> Dismissal {
        let was_armed = self.buzzer_armed();
        self.buzzer.reset();
        self.cancel_timer();
        self.last_buzzer = None;
        self.incorrect.clear();
        self.expecting_reactivation = false;
        self.judging = None;

        let question = self.current.take();
        let completion = match question {
            Some(_) => self.complete_if_exhausted(),
            None => None,
        };

        Dismissal {
            question,
            was_armed,
            completion,
        }
    }

    fn complete_if_exhausted(&mut self) -> Option<Completion> {
        if self.status != MatchStatus::Active || !self.board.all_used() {
            return None;
        }

        self.status = MatchStatus::Completed;
        self.completed_at = Some(SystemTime::now());
        let winner = self.leading_contestant().cloned();
        info!(winner = ?winner.as_ref().map(|w| &w.name), "board exhausted; match completed");

        Some(Completion {
            winner,
            scores: self.scores(),
        })
    }
}
