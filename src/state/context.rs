use std::{future::Future, sync::Arc};

use parking_lot::Mutex;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::MatchConfig,
    services::{answer_judge::AnswerJudge, narration::Narrator},
    state::{
        audio::AudioQueue,
        broadcast::Broadcaster,
        game::{Board, MatchState},
    },
};

/// Shared handle on one running match.
pub type SharedMatch = Arc<MatchContext>;

/// Everything one match owns: its state, its collaborators and its tasks.
///
/// The state lock is synchronous and never held across an await point, so every
/// entry point mutates the match in a single uninterrupted critical section.
pub struct MatchContext {
    id: Uuid,
    code: String,
    config: Arc<MatchConfig>,
    state: Mutex<MatchState>,
    audio: Mutex<AudioQueue>,
    broadcaster: Arc<dyn Broadcaster>,
    narrator: Arc<dyn Narrator>,
    judge: Arc<dyn AnswerJudge>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MatchContext {
    /// Construct a lobby match around `board`.
    pub fn new(
        code: String,
        board: Board,
        config: Arc<MatchConfig>,
        broadcaster: Arc<dyn Broadcaster>,
        narrator: Arc<dyn Narrator>,
        judge: Arc<dyn AnswerJudge>,
    ) -> SharedMatch {
        let (shutdown, _rx) = watch::channel(false);
        let recent_capacity = config.recent_audio_capacity;
        Arc::new(Self {
            id: Uuid::new_v4(),
            code,
            config,
            state: Mutex::new(MatchState::new(board)),
            audio: Mutex::new(AudioQueue::new(recent_capacity)),
            broadcaster,
            narrator,
            judge,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Unique match identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Join code, also used as the broadcast room.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Durations and thresholds of this match.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Event fan-out for this match.
    pub fn broadcaster(&self) -> &dyn Broadcaster {
        self.broadcaster.as_ref()
    }

    /// Narration collaborator.
    pub fn narrator(&self) -> Arc<dyn Narrator> {
        Arc::clone(&self.narrator)
    }

    /// Answer evaluation collaborator.
    pub fn judge(&self) -> Arc<dyn AnswerJudge> {
        Arc::clone(&self.judge)
    }

    /// Execute `f` with exclusive access to the match state.
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut MatchState) -> R,
    {
        let mut guard = self.state.lock();
        f(&mut guard)
    }

    /// Execute `f` with read access to the match state.
    pub fn read_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&MatchState) -> R,
    {
        let guard = self.state.lock();
        f(&guard)
    }

    /// Execute `f` with exclusive access to the narration queue.
    pub fn with_audio<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut AudioQueue) -> R,
    {
        let mut guard = self.audio.lock();
        f(&mut guard)
    }

    /// Whether the match has been asked to stop.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Receiver resolving once the match stops.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Signal every task of the match to stop, cancel the pending timer and drop queued narration.
    ///
    /// Safe to call from inside a match task; the tasks exit on their own.
    pub fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        info!(code = %self.code, "shutting down match");
        self.with_state(|state| state.cancel_timer());
        self.with_audio(|queue| queue.clear());
    }

    /// Signal shutdown then abort and reap every tracked task.
    ///
    /// Must not be awaited from one of the match's own tasks.
    pub async fn stop(&self) {
        self.shutdown();
        let handles: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            if let Err(err) = handle.await
                && !err.is_cancelled()
            {
                warn!(code = %self.code, error = %err, "match task ended abnormally");
            }
        }
    }

    /// Spawn a long-running task that lives as long as the match.
    pub fn spawn_background<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(code = %self.code, task = label, "spawning match task");
        self.track(tokio::spawn(work));
    }

    /// Spawn fire-and-forget work that is dropped when the match shuts down.
    pub fn spawn_detached<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown_signal();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    debug!(task = label, "detached work dropped by shutdown");
                }
                _ = work => {}
            }
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}

/// Resolve once `rx` observes the shutdown flag or its sender is gone.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
