use tokio::task::JoinHandle;
use uuid::Uuid;

/// What an armed timer resolves when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// Nobody buzzed in time; reveal the answer.
    Question,
    /// The contestant holding the buzzer ran out of time.
    Answer {
        /// Contestant who must answer.
        contestant: String,
    },
}

/// Handle on a pending timeout task.
///
/// Owned by the match state's single timer slot, so a match never runs more
/// than one timeout at a time.
#[derive(Debug)]
pub struct ArmedTimer {
    id: Uuid,
    kind: TimerKind,
    handle: JoinHandle<()>,
}

impl ArmedTimer {
    /// Wrap a spawned timeout task.
    pub fn new(id: Uuid, kind: TimerKind, handle: JoinHandle<()>) -> Self {
        Self { id, kind, handle }
    }

    /// Identifier the task checks against the slot when it wakes up.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Kind of timeout.
    pub fn kind(&self) -> &TimerKind {
        &self.kind
    }

    /// Abort the task. A task that already woke up finds the slot changed and does nothing.
    pub fn cancel(self) {
        self.handle.abort();
    }

    /// Detach the task and keep only its kind.
    pub fn into_kind(self) -> TimerKind {
        self.kind
    }
}
