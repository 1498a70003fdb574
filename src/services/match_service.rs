//! Match lifecycle: creation, lobby, start, client commands and cleanup.

use std::{sync::Arc, time::SystemTime};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{
    dto::{
        commands::ClientMessage,
        validation::{validate_contestant_name, validate_not_blank},
    },
    error::ServiceError,
    services::{
        answer_judge::{AnswerJudge, LenientJudge},
        answer_service, audio_sequencer,
        buzzer_arbiter::{self, handle_player_buzz},
        flow_orchestrator::FlowOrchestrator,
        match_events,
        narration::{ClientNarrator, Narrator},
        question_lifecycle::{self, answer_locked, publish_answer},
    },
    state::{
        Broadcaster, MatchContext, SharedMatch, SharedState,
        audio::AudioKind,
        game::{Board, Contestant, MatchStatus},
    },
};

/// Create a match narrated through its room and judged locally, then start its tasks.
pub fn create_match(app: &SharedState, board: Board) -> SharedMatch {
    let code = app.allocate_code();
    let hub: Arc<dyn Broadcaster> = app.hub();
    let narrator = Arc::new(ClientNarrator::new(code.clone(), Arc::clone(&hub)));
    build_match(app, code, board, narrator, Arc::new(LenientJudge))
}

/// Create a match with explicit narration and judging collaborators.
pub fn create_match_with(
    app: &SharedState,
    board: Board,
    narrator: Arc<dyn Narrator>,
    judge: Arc<dyn AnswerJudge>,
) -> SharedMatch {
    let code = app.allocate_code();
    build_match(app, code, board, narrator, judge)
}

fn build_match(
    app: &SharedState,
    code: String,
    board: Board,
    narrator: Arc<dyn Narrator>,
    judge: Arc<dyn AnswerJudge>,
) -> SharedMatch {
    let hub: Arc<dyn Broadcaster> = app.hub();
    let ctx = MatchContext::new(code, board, app.config(), hub, narrator, judge);
    app.insert(Arc::clone(&ctx));
    launch(&ctx);
    info!(id = %ctx.id(), code = %ctx.code(), "match created");
    ctx
}

/// Spawn the narration consumer and the flow orchestrator of `ctx`.
pub fn launch(ctx: &SharedMatch) {
    ctx.spawn_background("audio sequencer", audio_sequencer::run(Arc::clone(ctx)));
    ctx.spawn_background(
        "flow orchestrator",
        FlowOrchestrator::new(Arc::clone(ctx)).run(),
    );
}

/// Add a contestant to the lobby.
pub fn register_contestant(ctx: &SharedMatch, name: &str) -> Result<Contestant, ServiceError> {
    let name = name.trim();
    if let Err(err) = validate_contestant_name(name) {
        let mut errors = ValidationErrors::new();
        errors.add("name", err);
        return Err(errors.into());
    }

    let required = ctx.config().required_contestants;
    let registered = ctx.with_state(|state| {
        if state.status != MatchStatus::Lobby {
            return Err(ServiceError::InvalidState(
                "registration is closed once the match started".into(),
            ));
        }
        if state
            .contestants
            .keys()
            .any(|existing| existing.eq_ignore_ascii_case(name))
        {
            return Err(ServiceError::InvalidInput(format!(
                "name '{name}' is already taken"
            )));
        }
        let contestant = Contestant {
            name: name.to_string(),
            score: 0,
        };
        state
            .contestants
            .insert(contestant.name.clone(), contestant.clone());
        Ok((
            contestant,
            state.contestants.values().cloned().collect::<Vec<_>>(),
            state.missing_contestants(required),
        ))
    });

    let (contestant, roster, missing) = registered?;
    info!(contestant = %contestant.name, missing, "contestant registered");
    match_events::broadcast_player_list(ctx, roster.iter());
    match_events::broadcast_game_ready(ctx, missing);
    Ok(contestant)
}

/// Leave the lobby once enough contestants joined. Returns `false` when nothing changed.
pub fn begin_match(ctx: &SharedMatch) -> bool {
    let required = ctx.config().required_contestants;
    let controller = ctx.with_state(|state| {
        if state.status != MatchStatus::Lobby || state.missing_contestants(required) > 0 {
            return None;
        }
        let first = state.contestants.keys().next()?.clone();
        state.status = MatchStatus::Active;
        state.controller = Some(first.clone());
        Some(first)
    });
    let Some(controller) = controller else {
        return false;
    };

    info!(code = %ctx.code(), %controller, "match started");
    let welcome = "Welcome to the game! Let's get started.";
    match_events::broadcast_host_chat(ctx, welcome);
    audio_sequencer::synthesize_and_play(ctx, welcome, AudioKind::Generic);
    match_events::broadcast_select_next_question(ctx, &controller);
    audio_sequencer::synthesize_and_play(
        ctx,
        format!("{controller}, you have control of the board. Please select a question."),
        AudioKind::Generic,
    );
    true
}

/// Unregister and stop a match.
pub async fn stop_match(app: &SharedState, id: Uuid) -> Result<(), ServiceError> {
    let ctx = app
        .remove(id)
        .ok_or_else(|| ServiceError::NotFound(format!("match `{id}` not found")))?;
    ctx.stop().await;
    info!(%id, code = %ctx.code(), "match stopped");
    Ok(())
}

/// Stop matches left in the lobby or finished for longer than their retention.
pub async fn sweep_stale_matches(app: &SharedState) -> usize {
    let config = app.config();
    let now = SystemTime::now();
    let stale: Vec<_> = app
        .matches()
        .into_iter()
        .filter(|ctx| {
            ctx.read_state(|state| {
                let age_since = |at: SystemTime| now.duration_since(at).unwrap_or_default();
                match state.status {
                    MatchStatus::Lobby => age_since(state.created_at) > config.lobby_retention,
                    MatchStatus::Completed => state
                        .completed_at
                        .is_some_and(|at| age_since(at) > config.completed_retention),
                    MatchStatus::Active => false,
                }
            })
        })
        .map(|ctx| ctx.id())
        .collect();

    let mut removed = 0;
    for id in stale {
        if stop_match(app, id).await.is_ok() {
            removed += 1;
        }
    }
    if removed > 0 {
        info!(removed, "swept stale matches");
    }
    removed
}

/// Periodically sweep stale matches.
pub async fn run_sweeper(app: SharedState) {
    let mut ticker = interval(app.config().sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        sweep_stale_matches(&app).await;
    }
}

/// Dispatch one client command against `ctx`.
pub async fn handle_client_message(
    ctx: &SharedMatch,
    message: ClientMessage,
) -> Result<(), ServiceError> {
    debug!(?message, "client message");
    match message {
        ClientMessage::Register { name } => register_contestant(ctx, &name).map(|_| ()),
        ClientMessage::DisplayQuestion { category, value } => {
            question_lifecycle::display_question(ctx, &category, value).map(|_| ())
        }
        ClientMessage::Buzz { contestant } => handle_player_buzz(ctx, &contestant),
        ClientMessage::SubmitAnswer { contestant, answer } => {
            answer_service::submit_answer(ctx, &contestant, &answer)
                .await
                .map(|_| ())
        }
        ClientMessage::Answer {
            correct,
            contestant,
        } => {
            override_answer(ctx, correct, contestant.as_deref());
            Ok(())
        }
        ClientMessage::Dismiss => {
            question_lifecycle::dismiss_question(ctx);
            Ok(())
        }
        ClientMessage::Wager { contestant, bet } => {
            question_lifecycle::handle_wager_bet(ctx, &contestant, bet)
        }
        ClientMessage::AudioComplete { audio_id } => {
            audio_sequencer::report_completion(ctx, audio_id);
            Ok(())
        }
        ClientMessage::Chat {
            contestant,
            message,
        } => send_chat(ctx, &contestant, &message),
        ClientMessage::Unknown => Err(ServiceError::InvalidInput(
            "unsupported message type".into(),
        )),
    }
}

fn override_answer(ctx: &SharedMatch, correct: bool, contestant: Option<&str>) {
    let scored = match ctx.with_state(|state| answer_locked(state, correct, contestant)) {
        Ok(Some(scored)) => scored,
        Ok(None) => {
            warn!("answer override without an active question; ignoring");
            return;
        }
        Err(err) => {
            warn!(error = %err, "answer override rejected");
            match_events::broadcast_match_error(ctx, err.to_string());
            return;
        }
    };

    let name = scored.contestant.name.clone();
    if correct {
        audio_sequencer::synthesize_and_play(ctx, format!("Correct, {name}!"), AudioKind::Generic);
    } else {
        buzzer_arbiter::narrate_incorrect(
            ctx,
            format!("Sorry {name}, that's incorrect."),
            scored.question_still_active(),
        );
    }
    publish_answer(ctx, scored);
}

fn send_chat(ctx: &SharedMatch, contestant: &str, message: &str) -> Result<(), ServiceError> {
    if !ctx.read_state(|state| state.contestants.contains_key(contestant)) {
        return Err(ServiceError::NotFound(format!("contestant '{contestant}'")));
    }
    if let Err(err) = validate_not_blank(message) {
        let mut errors = ValidationErrors::new();
        errors.add("message", err);
        return Err(errors.into());
    }
    match_events::broadcast_chat(ctx, contestant, message.trim(), false);
    Ok(())
}
