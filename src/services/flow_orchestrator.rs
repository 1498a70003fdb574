//! Periodic supervisor of a match.
//!
//! Starts the match once the lobby is full, keeps timers consistent with the
//! buzzer across ticks, and picks a clue for a controller who stalls too long.

use rand::seq::IndexedRandom;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    services::{
        audio_sequencer, buzzer_arbiter, match_events, match_service, question_lifecycle,
    },
    state::{SharedMatch, audio::AudioKind, context::wait_for_shutdown, game::MatchStatus},
};

const HURRY_UP_PHRASES: &[&str] = &[
    "Let's keep things moving!",
    "Time's ticking, let me pick one for you.",
    "No answer? I'll choose this time.",
    "Let's not keep the audience waiting!",
];

#[derive(Debug)]
struct Observation {
    status: MatchStatus,
    contestants: usize,
    serial: Option<u64>,
    armed: bool,
    controller: Option<String>,
}

/// Supervisor state; owned by its loop task.
pub struct FlowOrchestrator {
    ctx: SharedMatch,
    seen_serial: Option<u64>,
    seen_armed: bool,
    idle_since: Option<Instant>,
}

impl FlowOrchestrator {
    /// Supervisor for `ctx`.
    pub fn new(ctx: SharedMatch) -> Self {
        Self {
            ctx,
            seen_serial: None,
            seen_armed: false,
            idle_since: None,
        }
    }

    /// Tick at the configured interval until the match shuts down.
    pub async fn run(mut self) {
        let mut shutdown = self.ctx.shutdown_signal();
        let mut ticker = interval(self.ctx.config().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(code = %self.ctx.code(), "flow orchestrator started");

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => self.tick(),
            }
        }

        info!(code = %self.ctx.code(), "flow orchestrator stopped");
    }

    /// One supervision pass.
    pub fn tick(&mut self) {
        let observed = self.ctx.read_state(|state| Observation {
            status: state.status,
            contestants: state.contestants.len(),
            serial: state.current.as_ref().map(|q| q.serial),
            armed: state.buzzer_armed(),
            controller: state.controller.clone(),
        });

        match observed.status {
            MatchStatus::Lobby => {
                if observed.contestants >= self.ctx.config().required_contestants {
                    match_service::begin_match(&self.ctx);
                }
                return;
            }
            MatchStatus::Completed => return,
            MatchStatus::Active => {}
        }

        match observed.serial {
            Some(serial) => {
                if self.seen_serial != Some(serial) {
                    debug!(serial, "new question observed");
                    self.seen_serial = Some(serial);
                    self.idle_since = None;
                }
                if observed.armed != self.seen_armed {
                    debug!(armed = observed.armed, "buzzer edge observed");
                    self.seen_armed = observed.armed;
                    buzzer_arbiter::reconcile_timers(&self.ctx);
                }
            }
            None => {
                if self.seen_serial.take().is_some() {
                    debug!("question left the screen");
                    self.seen_armed = false;
                    buzzer_arbiter::ensure_disarmed(&self.ctx);
                }
                self.check_idle_pick(observed.controller.as_deref());
            }
        }
    }

    fn check_idle_pick(&mut self, controller: Option<&str>) {
        let Some(controller) = controller else {
            self.idle_since = None;
            return;
        };
        if audio_sequencer::is_busy(&self.ctx) {
            self.idle_since = None;
            return;
        }

        let now = Instant::now();
        let since = *self.idle_since.get_or_insert(now);
        if now.duration_since(since) < self.ctx.config().idle_pick_timeout {
            return;
        }
        self.idle_since = None;

        let clues = question_lifecycle::unused_clues(&self.ctx);
        let mut rng = rand::rng();
        let Some((category, value)) = clues.choose(&mut rng).cloned() else {
            return;
        };
        let phrase = HURRY_UP_PHRASES
            .choose(&mut rng)
            .copied()
            .unwrap_or("Let's keep things moving!");

        info!(controller, %category, value, "controller idle; picking a clue");
        match_events::broadcast_host_chat(&self.ctx, phrase);
        audio_sequencer::synthesize_and_play(&self.ctx, phrase, AudioKind::Generic);
        if let Err(err) = question_lifecycle::display_question(&self.ctx, &category, value) {
            warn!(error = %err, "automatic pick failed");
        }
    }
}
