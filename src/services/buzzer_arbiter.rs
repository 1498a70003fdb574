//! Buzzer arbitration: who may buzz, when the buzzer opens, and what happens
//! when the question or answer timer runs out.
//!
//! A match owns a single timer slot. Arming a timer replaces whatever was in
//! the slot, and a timer that wakes up only acts if it still owns the slot, so
//! a buzz racing the question timeout resolves to exactly one outcome.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::{
        audio_sequencer,
        match_events,
        question_lifecycle::{answer_locked, publish_answer, publish_dismissal},
    },
    state::{
        SharedMatch,
        audio::{AudioItem, AudioKind},
        buzzer::{BuzzerEvent, BuzzerPhase, NarrationCue},
        game::{Dismissal, MatchState},
        timer::{ArmedTimer, TimerKind},
    },
};

/// Why the answer is being revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealReason {
    /// Nobody buzzed before the question timer fired.
    TimeUp,
    /// Every contestant answered incorrectly.
    NobodyGotIt,
    /// The bettor missed a wager question.
    WagerMissed,
}

/// A dismissal that reveals the answer and hands board control back.
#[derive(Debug)]
pub struct Reveal {
    dismissal: Dismissal,
    controller: Option<String>,
    reason: RevealReason,
}

/// What happened to the buzzer after an incorrect answer.
#[derive(Debug)]
pub enum IncorrectOutcome {
    /// The buzzer re-opens once the "incorrect" narration finishes.
    AwaitingNarration,
    /// The contestant was locked out while the buzzer stayed open.
    StillArmed(Vec<String>),
    /// The contestant was locked out while the buzzer is closed; nothing to announce.
    LockedOut,
    /// Nobody is left to answer; the question was dismissed.
    Revealed(Reveal),
}

/// Disarm the buzzer and forget the previous question's buzz history before a
/// new question goes on screen. Runs inside the caller's critical section.
///
/// Returns whether the buzzer was armed.
pub fn handle_question_display(state: &mut MatchState) -> bool {
    let was_armed = state.buzzer_armed();
    state.cancel_timer();
    state.buzzer.reset();
    state.last_buzzer = None;
    state.incorrect.clear();
    state.expecting_reactivation = false;
    state.judging = None;
    was_armed
}

/// A contestant pressed the buzzer.
///
/// Accepted only while the buzzer is armed and the contestant has not already
/// missed this question. The winner gets the answer timer; everyone else is
/// rejected until the buzzer re-opens.
pub fn handle_player_buzz(ctx: &SharedMatch, contestant: &str) -> Result<(), ServiceError> {
    let accepted = ctx.with_state(|state| {
        if !state.contestants.contains_key(contestant) {
            return Err(ServiceError::NotFound(format!("contestant '{contestant}'")));
        }
        if state.incorrect.contains(contestant) {
            return Err(ServiceError::InvalidState(format!(
                "{contestant} already answered this question"
            )));
        }
        state
            .buzzer
            .apply(BuzzerEvent::Buzz {
                contestant: contestant.to_string(),
            })
            .map_err(|_| ServiceError::BuzzerNotArmed)?;

        state.last_buzzer = Some(contestant.to_string());
        state.cancel_timer_if(|kind| matches!(kind, TimerKind::Question));
        start_answer_timer(ctx, state, contestant);
        Ok(incorrect_players(state))
    });

    let incorrect = match accepted {
        Ok(incorrect) => incorrect,
        Err(err) => {
            debug!(contestant, error = %err, "buzz rejected");
            return Err(err);
        }
    };

    info!(contestant, "contestant buzzed in");
    match_events::broadcast_buzzer_status(ctx, false, incorrect);
    match_events::broadcast_player_buzzed(ctx, contestant);
    match_events::broadcast_answer_timer_start(ctx, contestant, ctx.config().answer_timeout);
    Ok(())
}

/// React to a narration item that finished playing.
///
/// The end of a clue narration opens the buzzer for that clue; the end of an
/// "incorrect" narration re-opens it for the remaining contestants.
pub fn handle_audio_completed(ctx: &SharedMatch, item: &AudioItem) {
    enum Next {
        Nothing,
        Armed(Vec<String>),
        Reveal(Reveal),
    }

    let next = ctx.with_state(|state| match item.kind {
        AudioKind::IncorrectAnswer => {
            if !state.expecting_reactivation {
                return Next::Nothing;
            }
            state.expecting_reactivation = false;
            if state.current.is_none() {
                return Next::Nothing;
            }
            if state.everyone_missed() {
                let controller = state.controller.clone();
                return Next::Reveal(Reveal {
                    dismissal: state.dismiss(),
                    controller,
                    reason: RevealReason::NobodyGotIt,
                });
            }
            if state.buzzer.apply(BuzzerEvent::Arm).is_err() {
                return Next::Nothing;
            }
            start_question_timer(ctx, state);
            Next::Armed(incorrect_players(state))
        }
        AudioKind::Question => {
            let Some(serial) = state.current.as_ref().map(|q| q.serial) else {
                return Next::Nothing;
            };
            if item.question_serial != Some(serial) {
                debug!(stale = ?item.question_serial, serial, "narration belongs to an older question");
                return Next::Nothing;
            }
            if state.last_buzzer.is_some()
                || state.phase() != &BuzzerPhase::AwaitingNarration(NarrationCue::Question)
            {
                return Next::Nothing;
            }
            state.incorrect.clear();
            if state.buzzer.apply(BuzzerEvent::Arm).is_err() {
                return Next::Nothing;
            }
            start_question_timer(ctx, state);
            Next::Armed(Vec::new())
        }
        AudioKind::Generic => Next::Nothing,
    });

    match next {
        Next::Nothing => {}
        Next::Armed(incorrect) => {
            info!(locked_out = incorrect.len(), "buzzer armed");
            match_events::broadcast_buzzer_status(ctx, true, incorrect);
        }
        Next::Reveal(reveal) => publish_reveal(ctx, reveal),
    }
}

/// Record a correct answer: the contestant takes board control.
pub(crate) fn correct_answer_locked(state: &mut MatchState, contestant: &str) {
    state.cancel_timer();
    if state.buzzer.answering().is_some() {
        let _ = state.buzzer.apply(BuzzerEvent::AnsweredCorrectly);
    }
    state.last_buzzer = None;
    state.controller = Some(contestant.to_string());
}

/// Record an incorrect answer and decide whether anyone is left to answer.
pub(crate) fn incorrect_answer_locked(state: &mut MatchState, contestant: &str) -> IncorrectOutcome {
    state.incorrect.insert(contestant.to_string());

    let was_answering = state.buzzer.answering().is_some();
    if was_answering {
        state.cancel_timer_if(|kind| matches!(kind, TimerKind::Answer { .. }));
        state.last_buzzer = None;
        let _ = state.buzzer.apply(BuzzerEvent::AnsweredIncorrectly);
    }

    let is_wager = state.current.as_ref().is_some_and(|q| q.is_wager);
    if is_wager || state.everyone_missed() {
        let controller = state.controller.clone();
        return IncorrectOutcome::Revealed(Reveal {
            dismissal: state.dismiss(),
            controller,
            reason: if is_wager {
                RevealReason::WagerMissed
            } else {
                RevealReason::NobodyGotIt
            },
        });
    }

    if was_answering {
        state.expecting_reactivation = true;
        IncorrectOutcome::AwaitingNarration
    } else if state.buzzer_armed() {
        IncorrectOutcome::StillArmed(incorrect_players(state))
    } else {
        IncorrectOutcome::LockedOut
    }
}

/// Broadcast what [`incorrect_answer_locked`] changed.
pub(crate) fn publish_incorrect(ctx: &SharedMatch, outcome: IncorrectOutcome) {
    match outcome {
        IncorrectOutcome::AwaitingNarration | IncorrectOutcome::LockedOut => {}
        IncorrectOutcome::StillArmed(incorrect) => {
            match_events::broadcast_buzzer_status(ctx, true, incorrect);
        }
        IncorrectOutcome::Revealed(reveal) => publish_reveal(ctx, reveal),
    }
}

/// Speak an "incorrect" line; it re-opens the buzzer only if the question is still up.
pub fn narrate_incorrect(ctx: &SharedMatch, text: impl Into<String>, question_active: bool) {
    let kind = if question_active {
        AudioKind::IncorrectAnswer
    } else {
        AudioKind::Generic
    };
    audio_sequencer::synthesize_and_play(ctx, text, kind);
}

/// Start the question timer for an armed buzzer.
pub(crate) fn start_question_timer(ctx: &SharedMatch, state: &mut MatchState) {
    spawn_timer(ctx, state, TimerKind::Question, ctx.config().question_timeout);
}

/// Start the answer timer for the contestant holding the buzzer.
pub(crate) fn start_answer_timer(ctx: &SharedMatch, state: &mut MatchState, contestant: &str) {
    let kind = TimerKind::Answer {
        contestant: contestant.to_string(),
    };
    spawn_timer(ctx, state, kind, ctx.config().answer_timeout);
}

fn spawn_timer(ctx: &SharedMatch, state: &mut MatchState, kind: TimerKind, after: Duration) {
    let id = Uuid::new_v4();
    let task_ctx = Arc::clone(ctx);
    let task_kind = kind.clone();
    let deadline = tokio::time::Instant::now() + after;
    let handle = tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        match task_kind {
            TimerKind::Question => handle_timeout_expired(&task_ctx, id),
            TimerKind::Answer { contestant } => {
                handle_answer_timeout_expired(&task_ctx, id, &contestant)
            }
        }
    });
    debug!(?kind, after_ms = after.as_millis() as u64, "timer armed");
    state.arm_timer(ArmedTimer::new(id, kind, handle));
}

/// Question timer fired: nobody buzzed, so reveal the answer and hand control over.
pub(crate) fn handle_timeout_expired(ctx: &SharedMatch, timer_id: Uuid) {
    let reveal = ctx.with_state(|state| {
        state.claim_timer(timer_id)?;
        if state.last_buzzer.is_some() {
            return None;
        }
        state.buzzer.apply(BuzzerEvent::TimedOut).ok()?;

        let controller = state
            .controller
            .clone()
            .or_else(|| state.leading_contestant().map(|c| c.name.clone()));
        state.controller = controller.clone();
        Some(Reveal {
            dismissal: state.dismiss(),
            controller,
            reason: RevealReason::TimeUp,
        })
    });

    match reveal {
        Some(reveal) => {
            info!("question timed out without a buzz");
            publish_reveal(ctx, reveal);
        }
        None => debug!("question timer superseded"),
    }
}

/// Answer timer fired: the contestant holding the buzzer is ruled incorrect.
pub(crate) fn handle_answer_timeout_expired(ctx: &SharedMatch, timer_id: Uuid, contestant: &str) {
    let scored = ctx.with_state(|state| {
        state.claim_timer(timer_id)?;
        if state.buzzer.answering() != Some(contestant) {
            return None;
        }
        match answer_locked(state, false, Some(contestant)) {
            Ok(scored) => scored,
            Err(err) => {
                warn!(contestant, error = %err, "could not score expired answer");
                None
            }
        }
    });

    let Some(scored) = scored else {
        debug!(contestant, "answer timer superseded");
        return;
    };

    info!(contestant, "answer time expired");
    narrate_incorrect(
        ctx,
        format!("Time's up, {contestant}!"),
        scored.question_still_active(),
    );
    publish_answer(ctx, scored);
}

/// Make the timer slot agree with the buzzer phase. Safe to call at any time.
pub fn reconcile_timers(ctx: &SharedMatch) {
    ctx.with_state(|state| match state.phase().clone() {
        BuzzerPhase::Armed => {
            if !state
                .timer
                .as_ref()
                .is_some_and(|t| t.kind() == &TimerKind::Question)
            {
                warn!("armed buzzer had no question timer; starting one");
                start_question_timer(ctx, state);
            }
        }
        BuzzerPhase::Answering { .. } => {}
        _ => state.cancel_timer_if(|kind| matches!(kind, TimerKind::Question)),
    });
}

/// Reset leftover buzzer state once no question is on screen.
pub fn ensure_disarmed(ctx: &SharedMatch) {
    let dismissal = ctx.with_state(|state| {
        if state.current.is_some()
            || (state.phase() == &BuzzerPhase::Idle && state.timer.is_none())
        {
            return None;
        }
        Some(state.dismiss())
    });
    if let Some(dismissal) = dismissal {
        warn!("buzzer state outlived its question; resetting");
        publish_dismissal(ctx, &dismissal);
    }
}

/// Broadcast a reveal: dismissal, answer, and who picks next.
pub(crate) fn publish_reveal(ctx: &SharedMatch, reveal: Reveal) {
    publish_dismissal(ctx, &reveal.dismissal);
    if reveal.dismissal.completion.is_some() {
        return;
    }

    if let Some(question) = &reveal.dismissal.question {
        let text = match reveal.reason {
            RevealReason::TimeUp => format!("Time's up! The correct answer was {}.", question.answer),
            RevealReason::NobodyGotIt => {
                format!("Nobody got it! The correct answer was {}.", question.answer)
            }
            RevealReason::WagerMissed => format!("The correct answer was {}.", question.answer),
        };
        match_events::broadcast_host_chat(ctx, &text);
        audio_sequencer::synthesize_and_play(ctx, text, AudioKind::Generic);
    }

    if let Some(controller) = &reveal.controller {
        match_events::broadcast_select_next_question(ctx, controller);
    }
}

fn incorrect_players(state: &MatchState) -> Vec<String> {
    state
        .contestants
        .keys()
        .filter(|name| state.incorrect.contains(*name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{
            match_events::{
                EVENT_ANSWER_TIMER_START, EVENT_BUZZER_STATUS, EVENT_PLAYER_BUZZED,
                EVENT_QUESTION_DISMISS, EVENT_SELECT_NEXT_QUESTION,
            },
            question_lifecycle,
        },
        state::game::MatchStatus,
        test_support::{active_match, settle},
    };

    #[tokio::test(start_paused = true)]
    async fn clue_narration_arms_buzzer_and_starts_question_timer() {
        let t = active_match();
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();
        t.drain_events();

        t.arm_buzzer();
        t.ctx.read_state(|s| {
            assert!(s.buzzer_armed());
            assert_eq!(s.timer.as_ref().map(|t| t.kind()), Some(&TimerKind::Question));
        });
        let events = t.events();
        assert_eq!(events[0].topic, EVENT_BUZZER_STATUS);
        assert_eq!(events[0].payload().unwrap()["active"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_clue_narration_does_not_arm() {
        let t = active_match();
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();

        let stale = AudioItem::new("old clue", AudioKind::Question, Some(0));
        handle_audio_completed(&t.ctx, &stale);
        assert!(!t.ctx.read_state(|s| s.buzzer_armed()));
    }

    #[tokio::test(start_paused = true)]
    async fn first_buzz_wins_and_later_buzzes_are_rejected() {
        let t = active_match();
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();
        t.drain_events();

        handle_player_buzz(&t.ctx, "Bob").unwrap();
        assert!(matches!(
            handle_player_buzz(&t.ctx, "Ada"),
            Err(ServiceError::BuzzerNotArmed)
        ));

        t.ctx.read_state(|s| {
            assert_eq!(s.last_buzzer.as_deref(), Some("Bob"));
            assert_eq!(
                s.timer.as_ref().map(|t| t.kind().clone()),
                Some(TimerKind::Answer {
                    contestant: "Bob".into()
                })
            );
        });
        assert_eq!(
            t.topics(),
            vec![
                EVENT_BUZZER_STATUS,
                EVENT_PLAYER_BUZZED,
                EVENT_ANSWER_TIMER_START
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn buzz_rejected_before_arming_and_for_unknown_contestants() {
        let t = active_match();
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();
        assert!(matches!(
            handle_player_buzz(&t.ctx, "Ada"),
            Err(ServiceError::BuzzerNotArmed)
        ));
        t.arm_buzzer();
        assert!(matches!(
            handle_player_buzz(&t.ctx, "Zed"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn question_timeout_reveals_and_gives_control_to_leader() {
        let t = active_match();
        t.ctx.with_state(|s| {
            if let Some(bob) = s.contestants.get_mut("Bob") {
                bob.score = 600;
            }
        });
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();
        t.drain_events();

        tokio::time::advance(t.ctx.config().question_timeout).await;
        settle().await;

        t.ctx.read_state(|s| {
            assert!(s.current.is_none());
            assert!(!s.buzzer_armed());
            assert!(s.timer.is_none());
            assert_eq!(s.controller.as_deref(), Some("Bob"));
        });
        let events = t.events();
        let dismiss = events
            .iter()
            .find(|e| e.topic == EVENT_QUESTION_DISMISS)
            .unwrap();
        assert_eq!(dismiss.payload().unwrap()["answer"], "Washington");
        let next = events
            .iter()
            .find(|e| e.topic == EVENT_SELECT_NEXT_QUESTION)
            .unwrap();
        assert_eq!(next.payload().unwrap()["contestant"], "Bob");
        assert!(matches!(
            handle_player_buzz(&t.ctx, "Ada"),
            Err(ServiceError::BuzzerNotArmed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn question_timeout_keeps_the_current_controller() {
        let t = active_match();
        t.ctx.with_state(|s| {
            s.controller = Some("Cy".into());
            if let Some(bob) = s.contestants.get_mut("Bob") {
                bob.score = 600;
            }
        });
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();
        t.drain_events();

        tokio::time::advance(t.ctx.config().question_timeout).await;
        settle().await;

        assert_eq!(t.ctx.read_state(|s| s.controller.clone()).as_deref(), Some("Cy"));
        let next = t
            .events()
            .into_iter()
            .find(|e| e.topic == EVENT_SELECT_NEXT_QUESTION)
            .unwrap();
        assert_eq!(next.payload().unwrap()["contestant"], "Cy");
    }

    #[tokio::test(start_paused = true)]
    async fn buzz_at_the_deadline_resolves_to_exactly_one_outcome() {
        let t = active_match();
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();

        tokio::time::advance(t.ctx.config().question_timeout).await;
        let buzz = handle_player_buzz(&t.ctx, "Ada");
        settle().await;

        t.ctx.read_state(|s| match &buzz {
            Ok(()) => {
                assert!(s.current.is_some());
                assert_eq!(s.buzzer.answering(), Some("Ada"));
            }
            Err(_) => {
                assert!(s.current.is_none());
                assert_eq!(s.buzzer.answering(), None);
            }
        });
        let dismissals = t
            .events()
            .into_iter()
            .filter(|e| e.topic == EVENT_QUESTION_DISMISS)
            .count();
        assert_eq!(dismissals, usize::from(buzz.is_err()));
    }

    #[tokio::test(start_paused = true)]
    async fn answer_timeout_deducts_and_reopens_after_narration() {
        let t = active_match();
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();
        handle_player_buzz(&t.ctx, "Ada").unwrap();

        tokio::time::advance(t.ctx.config().answer_timeout).await;
        settle().await;

        t.ctx.read_state(|s| {
            assert_eq!(s.contestants["Ada"].score, -200);
            assert!(s.incorrect.contains("Ada"));
            assert!(s.expecting_reactivation);
            assert!(s.timer.is_none());
        });

        t.play_all_narration().await;
        t.ctx.read_state(|s| {
            assert!(s.buzzer_armed());
            assert!(!s.expecting_reactivation);
        });
        assert!(matches!(
            handle_player_buzz(&t.ctx, "Ada"),
            Err(ServiceError::InvalidState(_))
        ));
        handle_player_buzz(&t.ctx, "Cy").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_timer_is_ever_armed() {
        let t = active_match();
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();
        t.ctx.with_state(|s| {
            start_question_timer(&t.ctx, s);
            start_question_timer(&t.ctx, s);
        });
        handle_player_buzz(&t.ctx, "Ada").unwrap();

        // Only the answer timer may fire; the replaced question timers are gone.
        tokio::time::advance(t.ctx.config().question_timeout).await;
        settle().await;
        t.ctx.read_state(|s| {
            assert!(s.current.is_some());
            assert_eq!(s.buzzer.answering(), Some("Ada"));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn question_display_resets_buzz_history() {
        let t = active_match();
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();
        handle_player_buzz(&t.ctx, "Bob").unwrap();

        let was_armed = t.ctx.with_state(|s| {
            s.incorrect.insert("Cy".into());
            handle_question_display(s)
        });
        assert!(!was_armed);
        t.ctx.read_state(|s| {
            assert_eq!(s.phase(), &BuzzerPhase::Idle);
            assert!(s.last_buzzer.is_none());
            assert!(s.incorrect.is_empty());
            assert!(s.timer.is_none());
        });
    }

    #[tokio::test(start_paused = true)]
    async fn ensure_disarmed_clears_orphaned_buzzer_state() {
        let t = active_match();
        question_lifecycle::display_question(&t.ctx, "History", 200).unwrap();
        t.arm_buzzer();
        t.ctx.with_state(|s| s.current = None);

        ensure_disarmed(&t.ctx);
        t.ctx.read_state(|s| {
            assert_eq!(s.phase(), &BuzzerPhase::Idle);
            assert!(s.timer.is_none());
            assert_eq!(s.status, MatchStatus::Active);
        });
    }
}
