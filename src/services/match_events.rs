use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        events::{
            AnswerResultEvent, AnswerTimerStartEvent, AnswerTimerStopEvent, BuzzerStatusEvent,
            ChatMessageEvent, ContestantScoresEvent, ContestantSummary, GameCompletedEvent,
            GameReadyEvent, MatchErrorEvent, PlayerBuzzedEvent, PlayerListEvent,
            QuestionDismissEvent, QuestionDisplayEvent, SelectNextQuestionEvent, ServerEvent,
            WagerAcceptedEvent, WagerDisplayEvent,
        },
        format_system_time,
    },
    state::{
        MatchContext,
        game::{ActiveQuestion, Completion, Contestant},
    },
};

pub const EVENT_QUESTION_DISPLAY: &str = "question-display";
pub const EVENT_QUESTION_DISMISS: &str = "question-dismiss";
pub const EVENT_BUZZER_STATUS: &str = "buzzer-status";
pub const EVENT_PLAYER_BUZZED: &str = "player-buzzed";
pub const EVENT_ANSWER_RESULT: &str = "answer-result";
pub const EVENT_SELECT_NEXT_QUESTION: &str = "select-next-question";
pub const EVENT_GAME_COMPLETED: &str = "game-completed";
pub const EVENT_ANSWER_TIMER_START: &str = "answer-timer-start";
pub const EVENT_ANSWER_TIMER_STOP: &str = "answer-timer-stop";
pub const EVENT_CONTESTANT_SCORES: &str = "contestant-scores";
pub const EVENT_CHAT_MESSAGE: &str = "chat-message";
pub const EVENT_PLAYER_LIST: &str = "player-list";
pub const EVENT_GAME_READY: &str = "game-ready";
pub const EVENT_WAGER_DISPLAY: &str = "wager-display";
pub const EVENT_WAGER_ACCEPTED: &str = "wager-accepted";
pub const EVENT_MATCH_ERROR: &str = "match-error";

/// Display name used for host chat lines.
pub const HOST_NAME: &str = "Host";

/// Broadcast the clue now on screen.
pub fn broadcast_question_display(ctx: &MatchContext, question: &ActiveQuestion) {
    send_room_event(ctx, EVENT_QUESTION_DISPLAY, &QuestionDisplayEvent::from(question));
}

/// Broadcast that the clue left the screen, revealing `answer` when given.
pub fn broadcast_question_dismiss(
    ctx: &MatchContext,
    question: Option<&ActiveQuestion>,
    answer: Option<&str>,
) {
    let payload = QuestionDismissEvent {
        category: question.map(|q| q.category.clone()),
        value: question.map(|q| q.value),
        answer: answer.map(str::to_string),
    };
    send_room_event(ctx, EVENT_QUESTION_DISMISS, &payload);
}

/// Broadcast whether the buzzer is open.
pub fn broadcast_buzzer_status(ctx: &MatchContext, active: bool, incorrect_players: Vec<String>) {
    let payload = BuzzerStatusEvent {
        active,
        incorrect_players,
    };
    send_room_event(ctx, EVENT_BUZZER_STATUS, &payload);
}

/// Broadcast which contestant won the buzz race.
pub fn broadcast_player_buzzed(ctx: &MatchContext, contestant: &str) {
    let payload = PlayerBuzzedEvent {
        contestant: contestant.to_string(),
    };
    send_room_event(ctx, EVENT_PLAYER_BUZZED, &payload);
}

/// Broadcast a scored answer.
pub fn broadcast_answer_result(
    ctx: &MatchContext,
    contestant: &Contestant,
    correct: bool,
    delta: i32,
    answer: &str,
) {
    let payload = AnswerResultEvent {
        contestant: contestant.name.clone(),
        correct,
        delta,
        score: contestant.score,
        answer: answer.to_string(),
    };
    send_room_event(ctx, EVENT_ANSWER_RESULT, &payload);
}

/// Broadcast who picks the next clue.
pub fn broadcast_select_next_question(ctx: &MatchContext, contestant: &str) {
    let payload = SelectNextQuestionEvent {
        contestant: contestant.to_string(),
    };
    send_room_event(ctx, EVENT_SELECT_NEXT_QUESTION, &payload);
}

/// Broadcast the final result.
pub fn broadcast_game_completed(ctx: &MatchContext, completion: &Completion) {
    let payload = GameCompletedEvent {
        winner: completion.winner.as_ref().map(ContestantSummary::from),
        scores: completion.scores.clone(),
    };
    send_room_event(ctx, EVENT_GAME_COMPLETED, &payload);
}

/// Broadcast the start of an answer countdown.
pub fn broadcast_answer_timer_start(ctx: &MatchContext, player: &str, duration: Duration) {
    let payload = AnswerTimerStartEvent {
        player: player.to_string(),
        seconds: duration.as_secs(),
    };
    send_room_event(ctx, EVENT_ANSWER_TIMER_START, &payload);
}

/// Broadcast that an answer countdown stopped early.
pub fn broadcast_answer_timer_stop(ctx: &MatchContext, player: &str) {
    let payload = AnswerTimerStopEvent {
        player: player.to_string(),
    };
    send_room_event(ctx, EVENT_ANSWER_TIMER_STOP, &payload);
}

/// Broadcast every score.
pub fn broadcast_scores(ctx: &MatchContext, scores: IndexMap<String, i32>) {
    send_room_event(ctx, EVENT_CONTESTANT_SCORES, &ContestantScoresEvent { scores });
}

/// Broadcast a chat line spoken by the host.
pub fn broadcast_host_chat(ctx: &MatchContext, message: &str) {
    broadcast_chat(ctx, HOST_NAME, message, true);
}

/// Broadcast a chat line.
pub fn broadcast_chat(ctx: &MatchContext, username: &str, message: &str, is_host: bool) {
    let payload = ChatMessageEvent {
        username: username.to_string(),
        message: message.to_string(),
        is_host,
        timestamp: format_system_time(SystemTime::now()),
    };
    send_room_event(ctx, EVENT_CHAT_MESSAGE, &payload);
}

/// Broadcast the roster.
pub fn broadcast_player_list<'a>(
    ctx: &MatchContext,
    contestants: impl IntoIterator<Item = &'a Contestant>,
) {
    let payload = PlayerListEvent {
        contestants: contestants.into_iter().map(ContestantSummary::from).collect(),
    };
    send_room_event(ctx, EVENT_PLAYER_LIST, &payload);
}

/// Broadcast lobby readiness.
pub fn broadcast_game_ready(ctx: &MatchContext, missing: usize) {
    let payload = GameReadyEvent {
        ready: missing == 0,
        missing,
    };
    send_room_event(ctx, EVENT_GAME_READY, &payload);
}

/// Broadcast a wager clue awaiting its bet.
pub fn broadcast_wager_display(
    ctx: &MatchContext,
    question: &ActiveQuestion,
    contestant: Option<&str>,
) {
    let payload = WagerDisplayEvent {
        category: question.category.clone(),
        value: question.value,
        contestant: contestant.map(str::to_string),
    };
    send_room_event(ctx, EVENT_WAGER_DISPLAY, &payload);
}

/// Broadcast an accepted bet.
pub fn broadcast_wager_accepted(ctx: &MatchContext, contestant: &str, bet: i32) {
    let payload = WagerAcceptedEvent {
        contestant: contestant.to_string(),
        bet,
    };
    send_room_event(ctx, EVENT_WAGER_ACCEPTED, &payload);
}

/// Broadcast a rejected request.
pub fn broadcast_match_error(ctx: &MatchContext, message: impl Into<String>) {
    let payload = MatchErrorEvent {
        message: message.into(),
    };
    send_room_event(ctx, EVENT_MATCH_ERROR, &payload);
}

fn send_room_event(ctx: &MatchContext, topic: &str, payload: &impl Serialize) {
    match ServerEvent::json(topic, ctx.code(), payload) {
        Ok(event) => ctx.broadcaster().broadcast(event),
        Err(err) => warn!(topic, error = %err, "failed to serialize match event payload"),
    }
}
