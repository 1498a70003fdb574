//! Ordered narration playback.
//!
//! Items play strictly one at a time in FIFO order. Completion of an item is
//! processed at most once and forwarded to the buzzer arbiter, which is how
//! the end of a clue narration opens the buzzer.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    services::buzzer_arbiter,
    state::{
        MatchContext, SharedMatch,
        audio::{AudioId, AudioItem, AudioKind},
        context::wait_for_shutdown,
    },
};

/// Queue an item; a pending item with the same text and kind is reused.
pub fn enqueue(ctx: &MatchContext, item: AudioItem) -> AudioId {
    let text_len = item.text.len();
    let kind = item.kind;
    let (id, queued) = ctx.with_audio(|queue| queue.push(item));
    if queued {
        debug!(%id, ?kind, text_len, "narration queued");
    } else {
        debug!(%id, ?kind, "duplicate narration skipped");
    }
    id
}

/// Queue `text` for narration and return the id of the item that will speak it.
pub fn synthesize_and_play(ctx: &MatchContext, text: impl Into<String>, kind: AudioKind) -> AudioId {
    enqueue(ctx, AudioItem::new(text, kind, None))
}

/// Queue the narration of a clue, tagged with its question serial.
pub(crate) fn enqueue_question(ctx: &MatchContext, text: String, serial: u64) -> AudioId {
    enqueue(ctx, AudioItem::new(text, AudioKind::Question, Some(serial)))
}

/// Queue `text` and wait until it has been played (or skipped).
pub async fn speak(ctx: &MatchContext, text: impl Into<String>, kind: AudioKind) {
    let id = synthesize_and_play(ctx, text, kind);
    let done = ctx.with_audio(|queue| queue.subscribe(id));
    if done.await.is_err() {
        debug!(%id, "narration dropped before playing");
    }
}

/// True while narration is queued or playing.
pub fn is_busy(ctx: &MatchContext) -> bool {
    ctx.with_audio(|queue| queue.is_busy())
}

/// Completion reported by the presenter. Unknown ids are logged and ignored.
pub fn report_completion(ctx: &MatchContext, id: AudioId) -> bool {
    let known = ctx.narrator().report_completion(id);
    if !known {
        warn!(%id, "completion reported for unknown audio item");
    }
    known
}

/// Consumer loop: poll the queue and play items until the match shuts down.
pub async fn run(ctx: SharedMatch) {
    let mut shutdown = ctx.shutdown_signal();
    let mut ticker = interval(ctx.config().audio_poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(code = %ctx.code(), "audio sequencer started");

    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        loop {
            let played = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(code = %ctx.code(), "audio sequencer stopped");
                    return;
                }
                played = play_next(&ctx) => played,
            };
            if !played {
                break;
            }
        }
    }

    info!(code = %ctx.code(), "audio sequencer stopped");
}

/// Play the next queued item, if any. Returns `false` when the queue was empty.
pub(crate) async fn play_next(ctx: &SharedMatch) -> bool {
    let Some(item) = ctx.with_audio(|queue| queue.start_next()) else {
        return false;
    };

    let narrator = ctx.narrator();
    debug!(id = %item.id, kind = ?item.kind, "playing narration");
    match narrator.narrate(&item).await {
        Ok(()) => {
            let timeout = ctx.config().narration_timeout;
            if !narrator.await_completion(item.id, timeout).await {
                warn!(
                    id = %item.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "narration did not report completion; moving on"
                );
            }
        }
        Err(err) => warn!(id = %item.id, error = %err, "narration failed; skipping item"),
    }

    finish_item(ctx, &item);
    true
}

/// Mark `item` finished and run its completion effects once.
pub(crate) fn finish_item(ctx: &SharedMatch, item: &AudioItem) {
    if !ctx.with_audio(|queue| queue.complete(item.id)) {
        debug!(id = %item.id, "duplicate completion ignored");
        return;
    }
    buzzer_arbiter::handle_audio_completed(ctx, item);
}
