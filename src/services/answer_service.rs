//! Free-text answers: stop the clock, ask the judge, score the verdict.

use tracing::{info, warn};

use crate::{
    error::ServiceError,
    services::{
        answer_judge::{JudgeRequest, Verdict, evaluate_with_deadline},
        audio_sequencer, buzzer_arbiter, match_events,
        question_lifecycle::{answer_locked, publish_answer},
    },
    state::{SharedMatch, audio::AudioKind, timer::TimerKind},
};

/// Evaluate an answer from the contestant holding the buzzer.
///
/// The answer timer is stopped before the judge is consulted, so a slow judge
/// never turns into a timeout. The verdict is only applied if the question
/// and the contestant's turn are still the same once the judge returns.
pub async fn submit_answer(
    ctx: &SharedMatch,
    contestant: &str,
    answer: &str,
) -> Result<Verdict, ServiceError> {
    let (serial, request) = ctx.with_state(|state| {
        let question = state
            .current
            .as_ref()
            .ok_or_else(|| ServiceError::InvalidState("no question on screen".into()))?;
        if state.buzzer.answering() != Some(contestant) {
            return Err(ServiceError::InvalidState(format!(
                "{contestant} does not hold the buzzer"
            )));
        }
        if state.judging.is_some() {
            return Err(ServiceError::InvalidState(
                "an answer is already being judged".into(),
            ));
        }
        let serial = question.serial;
        let request = JudgeRequest {
            category: question.category.clone(),
            clue: question.clue.clone(),
            expected: question.answer.clone(),
            candidate: answer.to_string(),
        };
        state.judging = Some(serial);
        state.cancel_timer_if(|kind| matches!(kind, TimerKind::Answer { .. }));
        Ok((serial, request))
    })?;

    match_events::broadcast_answer_timer_stop(ctx, contestant);
    match_events::broadcast_chat(ctx, contestant, answer, false);

    let verdict =
        evaluate_with_deadline(ctx.judge().as_ref(), request, ctx.config().judge_timeout).await;

    let scored = ctx.with_state(|state| {
        if state.judging == Some(serial) {
            state.judging = None;
        }
        let same_turn = state.current.as_ref().is_some_and(|q| q.serial == serial)
            && state.buzzer.answering() == Some(contestant);
        if !same_turn {
            return Ok(None);
        }
        answer_locked(state, verdict.is_correct, Some(contestant))
    })?;

    let Some(scored) = scored else {
        warn!(contestant, "verdict arrived after the question moved on; discarding");
        return Ok(verdict);
    };

    info!(
        contestant,
        correct = verdict.is_correct,
        unresolved = verdict.unresolved,
        "answer judged"
    );

    if verdict.is_correct {
        match_events::broadcast_host_chat(ctx, &format!("That's correct, {contestant}!"));
        publish_answer(ctx, scored);

        let narration_ctx = ctx.clone();
        let name = contestant.to_string();
        ctx.spawn_detached("correct answer narration", async move {
            audio_sequencer::speak(&narration_ctx, format!("Correct, {name}!"), AudioKind::Generic)
                .await;
            audio_sequencer::speak(
                &narration_ctx,
                format!("{name}, you have control of the board."),
                AudioKind::Generic,
            )
            .await;
        });
    } else {
        let line = format!("Sorry {contestant}, that's incorrect.");
        match_events::broadcast_host_chat(ctx, &line);
        buzzer_arbiter::narrate_incorrect(ctx, line, scored.question_still_active());
        publish_answer(ctx, scored);
    }

    Ok(verdict)
}
