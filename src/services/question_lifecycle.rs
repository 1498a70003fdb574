//! Question selection, display, dismissal, scoring and wagers.
//!
//! Every entry point mutates the match inside one critical section and only
//! broadcasts once the lock is released.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::{
    error::ServiceError,
    services::{
        audio_sequencer,
        buzzer_arbiter::{self, IncorrectOutcome},
        match_events,
    },
    state::{
        SharedMatch,
        audio::AudioKind,
        buzzer::{BuzzerEvent, BuzzerPhase},
        game::{ActiveQuestion, Completion, Contestant, Dismissal, MatchState, MatchStatus, Question},
    },
};

/// Result of scoring an answer, computed under the lock and published afterwards.
#[derive(Debug)]
pub struct Scored {
    /// Contestant after the score change.
    pub contestant: Contestant,
    /// Whether the answer was accepted.
    pub correct: bool,
    /// Points applied.
    pub delta: i32,
    /// Expected answer of the question.
    pub answer: String,
    /// Every score after the change.
    pub scores: IndexMap<String, i32>,
    follow_up: FollowUp,
}

#[derive(Debug)]
enum FollowUp {
    Correct {
        dismissal: Dismissal,
        select_next: Option<String>,
    },
    Incorrect(IncorrectOutcome),
}

impl Scored {
    /// Whether the question is still on screen after scoring.
    pub fn question_still_active(&self) -> bool {
        matches!(
            self.follow_up,
            FollowUp::Incorrect(
                IncorrectOutcome::AwaitingNarration
                    | IncorrectOutcome::StillArmed(_)
                    | IncorrectOutcome::LockedOut
            )
        )
    }
}

/// What `answer_question` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// No question was on screen; nothing changed.
    NoQuestion,
    /// The answer was accepted.
    Correct,
    /// The answer was rejected.
    Incorrect {
        /// Whether the question is still on screen.
        question_active: bool,
    },
}

/// Locate a question by category and value, see [`crate::state::game::Board::find`].
pub fn find_question(ctx: &SharedMatch, category: &str, value: i32) -> Option<(String, Question)> {
    ctx.read_state(|state| {
        let at = state.board.find(category, value)?;
        Some((
            state.board.category_name(at)?.to_string(),
            state.board.question(at)?.clone(),
        ))
    })
}

/// Mark a question as played. Returns `false` when it does not exist.
pub fn mark_used(ctx: &SharedMatch, category: &str, value: i32) -> bool {
    ctx.with_state(|state| {
        let Some(at) = state.board.find(category, value) else {
            warn!(category, value, "cannot mark unknown question as used");
            return false;
        };
        match state.board.question_mut(at) {
            Some(question) => {
                question.used = true;
                true
            }
            None => false,
        }
    })
}

/// True once every question has been played.
pub fn all_questions_used(ctx: &SharedMatch) -> bool {
    ctx.read_state(|state| state.board.all_used())
}

/// `(category, value)` of every unplayed question.
pub fn unused_clues(ctx: &SharedMatch) -> Vec<(String, i32)> {
    ctx.read_state(|state| state.board.unused_clues())
}

/// Put a question on screen.
///
/// Wager questions are announced without their clue and wait for a bet;
/// other questions are narrated and the buzzer opens once the narration ends.
pub fn display_question(
    ctx: &SharedMatch,
    category: &str,
    value: i32,
) -> Result<ActiveQuestion, ServiceError> {
    let required = ctx.config().required_contestants;
    let outcome = ctx.with_state(|state| {
        ensure_active(state, required)?;
        if state.current.is_some() {
            return Err(ServiceError::InvalidState(
                "another question is on screen".into(),
            ));
        }
        let at = state.board.find(category, value).ok_or_else(|| {
            ServiceError::NotFound(format!("question '{category}' for {value}"))
        })?;
        let category = state
            .board
            .category_name(at)
            .unwrap_or(category)
            .to_string();
        let Some(question) = state.board.question_mut(at) else {
            return Err(ServiceError::NotFound(format!("question '{category}' for {value}")));
        };
        if question.used {
            return Err(ServiceError::InvalidState(format!(
                "'{category}' for {value} was already played"
            )));
        }
        question.used = true;
        let question = question.clone();

        let was_armed = buzzer_arbiter::handle_question_display(state);
        state.question_serial += 1;
        let active = ActiveQuestion {
            serial: state.question_serial,
            at,
            category,
            value: question.value,
            clue: question.clue,
            answer: question.answer,
            is_wager: question.is_wager,
            wagered_by: None,
        };
        let event = if active.is_wager {
            BuzzerEvent::WagerShown
        } else {
            BuzzerEvent::QuestionShown
        };
        state.buzzer.apply(event)?;
        state.current = Some(active.clone());
        Ok((active, was_armed, state.controller.clone()))
    });

    let (active, was_armed, controller) = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(category, value, error = %err, "question display rejected");
            match_events::broadcast_match_error(ctx, err.to_string());
            return Err(err);
        }
    };

    info!(
        category = %active.category,
        value = active.value,
        serial = active.serial,
        wager = active.is_wager,
        "question displayed"
    );
    if was_armed {
        match_events::broadcast_buzzer_status(ctx, false, Vec::new());
    }

    if active.is_wager {
        match_events::broadcast_wager_display(ctx, &active, controller.as_deref());
        let text = match &controller {
            Some(name) => format!("It's a wager! {name}, how much will you bet?"),
            None => "It's a wager! How much will you bet?".to_string(),
        };
        match_events::broadcast_host_chat(ctx, &text);
    } else {
        match_events::broadcast_question_display(ctx, &active);
        audio_sequencer::enqueue_question(
            ctx,
            format!("{} for {}. {}", active.category, active.value, active.clue),
            active.serial,
        );
    }

    Ok(active)
}

/// Take the current question off screen. A second call is a logged no-op.
pub fn dismiss_question(ctx: &SharedMatch) -> bool {
    let dismissal = ctx.with_state(MatchState::dismiss);
    let dismissed = dismissal.question.is_some();
    if !dismissed {
        debug!("dismiss requested without an active question");
    }
    publish_dismissal(ctx, &dismissal);
    dismissed
}

/// Score the current question for `contestant`, defaulting to whoever holds the buzzer.
///
/// Correct answers take the question off screen and give the contestant board
/// control. Incorrect answers lock the contestant out and either wait for the
/// "incorrect" narration to re-arm the buzzer or reveal the answer when nobody
/// is left.
pub fn answer_question(
    ctx: &SharedMatch,
    correct: bool,
    contestant: Option<&str>,
) -> Result<AnswerOutcome, ServiceError> {
    match ctx.with_state(|state| answer_locked(state, correct, contestant))? {
        Some(scored) => Ok(publish_answer(ctx, scored)),
        None => {
            warn!("answer scored without an active question; ignoring");
            Ok(AnswerOutcome::NoQuestion)
        }
    }
}

/// Scoring core shared by every caller that already holds the state lock.
pub(crate) fn answer_locked(
    state: &mut MatchState,
    correct: bool,
    contestant: Option<&str>,
) -> Result<Option<Scored>, ServiceError> {
    let Some(question) = state.current.clone() else {
        return Ok(None);
    };
    let name = contestant
        .map(str::to_string)
        .or_else(|| state.last_buzzer.clone())
        .or_else(|| state.buzzer.answering().map(str::to_string))
        .ok_or_else(|| ServiceError::InvalidState("nobody is answering".into()))?;
    if let Some(holder) = state.buzzer.answering()
        && holder != name
    {
        return Err(ServiceError::InvalidState(format!(
            "{holder} holds the buzzer; {name} cannot be scored now"
        )));
    }

    let delta = if correct {
        question.value
    } else {
        -question.value
    };
    let entry = state
        .contestants
        .get_mut(&name)
        .ok_or_else(|| ServiceError::NotFound(format!("contestant '{name}'")))?;
    entry.score += delta;
    let contestant = entry.clone();

    let follow_up = if correct {
        buzzer_arbiter::correct_answer_locked(state, &name);
        let dismissal = state.dismiss();
        let select_next =
            (!question.is_wager && dismissal.completion.is_none()).then(|| name.clone());
        FollowUp::Correct {
            dismissal,
            select_next,
        }
    } else {
        FollowUp::Incorrect(buzzer_arbiter::incorrect_answer_locked(state, &name))
    };

    Ok(Some(Scored {
        contestant,
        correct,
        delta,
        answer: question.answer,
        scores: state.scores(),
        follow_up,
    }))
}

/// Broadcast what [`answer_locked`] changed.
pub(crate) fn publish_answer(ctx: &SharedMatch, scored: Scored) -> AnswerOutcome {
    info!(
        contestant = %scored.contestant.name,
        correct = scored.correct,
        delta = scored.delta,
        score = scored.contestant.score,
        "answer scored"
    );
    match_events::broadcast_answer_result(
        ctx,
        &scored.contestant,
        scored.correct,
        scored.delta,
        &scored.answer,
    );
    match_events::broadcast_scores(ctx, scored.scores);

    match scored.follow_up {
        FollowUp::Correct {
            dismissal,
            select_next,
        } => {
            publish_dismissal(ctx, &dismissal);
            if let Some(name) = select_next {
                match_events::broadcast_select_next_question(ctx, &name);
            }
            AnswerOutcome::Correct
        }
        FollowUp::Incorrect(outcome) => {
            let question_active = !matches!(outcome, IncorrectOutcome::Revealed(_));
            buzzer_arbiter::publish_incorrect(ctx, outcome);
            AnswerOutcome::Incorrect { question_active }
        }
    }
}

/// Accept a bet on the current wager question and let the bettor answer.
pub fn handle_wager_bet(ctx: &SharedMatch, contestant: &str, bet: i32) -> Result<(), ServiceError> {
    let min = ctx.config().min_wager;
    let accepted = ctx.with_state(|state| {
        if !matches!(state.phase(), BuzzerPhase::AwaitingWager) {
            return Err(ServiceError::InvalidState("no wager pending".into()));
        }
        if let Some(controller) = &state.controller
            && controller != contestant
        {
            return Err(ServiceError::InvalidState(format!(
                "only {controller} may bet on this question"
            )));
        }
        let score = state
            .contestants
            .get(contestant)
            .map(|c| c.score)
            .ok_or_else(|| ServiceError::NotFound(format!("contestant '{contestant}'")))?;
        let max = ctx.config().max_wager(score);
        if bet < min || bet > max {
            return Err(ServiceError::InvalidWager { bet, min, max });
        }

        state.buzzer.apply(BuzzerEvent::WagerAccepted {
            contestant: contestant.to_string(),
        })?;
        let Some(question) = state.current.as_mut() else {
            return Err(ServiceError::InvalidState("no question on screen".into()));
        };
        question.value = bet;
        question.wagered_by = Some(contestant.to_string());
        let question = question.clone();
        if let Some(on_board) = state.board.question_mut(question.at) {
            on_board.value = bet;
        }
        state.last_buzzer = Some(contestant.to_string());
        buzzer_arbiter::start_answer_timer(ctx, state, contestant);
        Ok(question)
    });

    let question = match accepted {
        Ok(question) => question,
        Err(err) => {
            warn!(contestant, bet, error = %err, "wager rejected");
            return Err(err);
        }
    };

    info!(contestant, bet, "wager accepted");
    match_events::broadcast_wager_accepted(ctx, contestant, bet);
    match_events::broadcast_question_display(ctx, &question);
    match_events::broadcast_answer_timer_start(ctx, contestant, ctx.config().answer_timeout);
    audio_sequencer::synthesize_and_play(ctx, question.clue.clone(), AudioKind::Generic);
    Ok(())
}

/// Broadcast a dismissal and finish the match when it exhausted the board.
pub(crate) fn publish_dismissal(ctx: &SharedMatch, dismissal: &Dismissal) {
    if dismissal.was_armed {
        match_events::broadcast_buzzer_status(ctx, false, Vec::new());
    }
    let Some(question) = &dismissal.question else {
        return;
    };
    info!(category = %question.category, value = question.value, "question dismissed");
    match_events::broadcast_question_dismiss(ctx, Some(question), Some(&question.answer));
    if let Some(completion) = &dismissal.completion {
        finish_match(ctx, completion);
    }
}

fn finish_match(ctx: &SharedMatch, completion: &Completion) {
    match_events::broadcast_game_completed(ctx, completion);
    let message = match &completion.winner {
        Some(winner) => format!(
            "That's the end of the board! {} wins with {} points!",
            winner.name, winner.score
        ),
        None => "That's the end of the board!".to_string(),
    };
    match_events::broadcast_host_chat(ctx, &message);
    ctx.shutdown();
}

fn ensure_active(state: &MatchState, required: usize) -> Result<(), ServiceError> {
    match state.status {
        MatchStatus::Active => Ok(()),
        MatchStatus::Lobby => Err(ServiceError::WaitingForPlayers {
            missing: state.missing_contestants(required),
        }),
        MatchStatus::Completed => Err(ServiceError::InvalidState("match is over".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::match_events::{
            EVENT_BUZZER_STATUS, EVENT_GAME_COMPLETED, EVENT_MATCH_ERROR, EVENT_QUESTION_DISMISS,
            EVENT_QUESTION_DISPLAY, EVENT_SELECT_NEXT_QUESTION, EVENT_WAGER_DISPLAY,
        },
        test_support::{TestMatch, active_match},
    };

    #[tokio::test(start_paused = true)]
    async fn display_is_rejected_while_waiting_for_players() {
        let t = TestMatch::builder().contestants(&["Ada"]).build();

        let err = display_question(&t.ctx, "History", 200).unwrap_err();
        assert!(matches!(err, ServiceError::WaitingForPlayers { missing: 2 }));
        assert_eq!(t.topics(), vec![EVENT_MATCH_ERROR]);
        assert!(!t.ctx.read_state(|s| s.board.categories[0].questions[0].used));
    }

    #[tokio::test(start_paused = true)]
    async fn display_marks_question_used_and_queues_narration() {
        let t = active_match();

        let active = display_question(&t.ctx, "history", 200).unwrap();
        assert_eq!(active.category, "History");
        assert_eq!(active.serial, 1);
        assert!(t.ctx.read_state(|s| s.board.categories[0].questions[0].used));
        assert!(audio_sequencer::is_busy(&t.ctx));
        assert!(t.topics().contains(&EVENT_QUESTION_DISPLAY.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn second_dismiss_is_a_quiet_no_op() {
        let t = active_match();
        display_question(&t.ctx, "History", 200).unwrap();
        t.drain_events();

        assert!(dismiss_question(&t.ctx));
        let first = t.events();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].topic, EVENT_QUESTION_DISMISS);
        assert_eq!(first[0].payload().unwrap()["answer"], "Washington");

        assert!(!dismiss_question(&t.ctx));
        assert!(t.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn correct_answer_gives_control_and_dismisses() {
        let t = active_match();
        display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();
        buzzer_arbiter::handle_player_buzz(&t.ctx, "Bob").unwrap();
        t.drain_events();

        let outcome = answer_question(&t.ctx, true, None).unwrap();
        assert_eq!(outcome, AnswerOutcome::Correct);
        t.ctx.read_state(|s| {
            assert_eq!(s.contestants["Bob"].score, 200);
            assert_eq!(s.controller.as_deref(), Some("Bob"));
            assert!(s.current.is_none());
            assert!(s.timer.is_none());
        });
        let topics = t.topics();
        assert!(topics.contains(&EVENT_SELECT_NEXT_QUESTION.to_string()));
        assert!(topics.contains(&EVENT_QUESTION_DISMISS.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn answer_without_question_is_ignored() {
        let t = active_match();
        assert_eq!(
            answer_question(&t.ctx, true, Some("Ada")).unwrap(),
            AnswerOutcome::NoQuestion
        );
        assert_eq!(t.ctx.read_state(|s| s.contestants["Ada"].score), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scoring_someone_else_while_the_buzzer_is_held_is_rejected() {
        let t = active_match();
        display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();
        buzzer_arbiter::handle_player_buzz(&t.ctx, "Bob").unwrap();
        t.drain_events();

        let err = answer_question(&t.ctx, false, Some("Cy")).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        t.ctx.read_state(|s| {
            assert_eq!(s.buzzer.answering(), Some("Bob"));
            assert_eq!(s.last_buzzer.as_deref(), Some("Bob"));
            assert!(s.timer.is_some());
            assert!(s.incorrect.is_empty());
            assert_eq!(s.contestants["Cy"].score, 0);
        });
        assert!(t.topics().is_empty());

        answer_question(&t.ctx, true, Some("Bob")).unwrap();
        assert_eq!(t.ctx.read_state(|s| s.contestants["Bob"].score), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn override_during_incorrect_narration_keeps_buzzer_closed() {
        let t = active_match();
        display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();
        buzzer_arbiter::handle_player_buzz(&t.ctx, "Bob").unwrap();
        answer_question(&t.ctx, false, None).unwrap();
        buzzer_arbiter::narrate_incorrect(&t.ctx, "Sorry Bob, that's incorrect.", true);
        t.drain_events();

        assert_eq!(
            answer_question(&t.ctx, false, Some("Cy")).unwrap(),
            AnswerOutcome::Incorrect {
                question_active: true
            }
        );
        assert!(!t.topics().contains(&EVENT_BUZZER_STATUS.to_string()));
        t.ctx.read_state(|s| {
            assert!(!s.buzzer_armed());
            assert!(s.incorrect.contains("Cy"));
            assert!(s.expecting_reactivation);
        });

        t.play_all_narration().await;
        assert!(t.ctx.read_state(|s| s.buzzer_armed()));
        assert!(buzzer_arbiter::handle_player_buzz(&t.ctx, "Cy").is_err());
        buzzer_arbiter::handle_player_buzz(&t.ctx, "Ada").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn wager_bet_bounds_are_enforced_without_side_effects() {
        let t = active_match();
        t.ctx.with_state(|s| s.controller = Some("Ada".into()));
        display_question(&t.ctx, "Science", 400).unwrap();
        assert!(t.topics().contains(&EVENT_WAGER_DISPLAY.to_string()));

        for bet in [4, 1001] {
            let err = handle_wager_bet(&t.ctx, "Ada", bet).unwrap_err();
            assert!(matches!(err, ServiceError::InvalidWager { min: 5, max: 1000, .. }));
        }
        t.ctx.read_state(|s| {
            assert_eq!(s.current.as_ref().map(|q| q.value), Some(400));
            assert!(s.timer.is_none());
            assert_eq!(s.phase(), &BuzzerPhase::AwaitingWager);
        });

        handle_wager_bet(&t.ctx, "Ada", 1000).unwrap();
        t.ctx.read_state(|s| {
            assert_eq!(s.current.as_ref().map(|q| q.value), Some(1000));
            assert_eq!(s.buzzer.answering(), Some("Ada"));
            assert!(s.timer.is_some());
        });
    }

    #[tokio::test(start_paused = true)]
    async fn wager_ceiling_follows_a_high_score() {
        let t = active_match();
        t.ctx.with_state(|s| {
            s.controller = Some("Ada".into());
            if let Some(ada) = s.contestants.get_mut("Ada") {
                ada.score = 2500;
            }
        });
        display_question(&t.ctx, "Science", 400).unwrap();
        assert!(handle_wager_bet(&t.ctx, "Ada", 2501).is_err());
        assert!(handle_wager_bet(&t.ctx, "Ada", 2500).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn correct_wager_dismisses_without_select_next() {
        let t = active_match();
        t.ctx.with_state(|s| s.controller = Some("Ada".into()));
        display_question(&t.ctx, "Science", 400).unwrap();
        handle_wager_bet(&t.ctx, "Ada", 500).unwrap();
        t.drain_events();

        answer_question(&t.ctx, true, None).unwrap();
        assert_eq!(t.ctx.read_state(|s| s.contestants["Ada"].score), 500);
        let topics = t.topics();
        assert!(topics.contains(&EVENT_QUESTION_DISMISS.to_string()));
        assert!(!topics.contains(&EVENT_SELECT_NEXT_QUESTION.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_the_board_completes_once() {
        let t = active_match();
        t.ctx.with_state(|s| {
            for category in &mut s.board.categories {
                for question in &mut category.questions {
                    question.used = true;
                }
            }
            s.board.categories[0].questions[0].used = false;
            if let Some(cy) = s.contestants.get_mut("Cy") {
                cy.score = 900;
            }
        });

        display_question(&t.ctx, "History", 200).unwrap();
        t.drain_events();
        assert!(dismiss_question(&t.ctx));
        assert!(!dismiss_question(&t.ctx));

        let completed: Vec<_> = t
            .events()
            .into_iter()
            .filter(|e| e.topic == EVENT_GAME_COMPLETED)
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].payload().unwrap()["winner"]["name"], "Cy");
        assert_eq!(t.ctx.read_state(|s| s.status), MatchStatus::Completed);
        assert!(t.ctx.is_shut_down());
    }

    #[tokio::test(start_paused = true)]
    async fn find_and_mark_used_share_lookup_rules() {
        let t = active_match();
        let (category, question) = find_question(&t.ctx, "hist", 400).unwrap();
        assert_eq!(category, "History");
        assert_eq!(question.value, 400);

        assert!(mark_used(&t.ctx, "HISTORY", 400));
        assert!(!mark_used(&t.ctx, "Geography", 400));
        assert!(!unused_clues(&t.ctx).contains(&("History".to_string(), 400)));
        assert!(!all_questions_used(&t.ctx));
    }
}
