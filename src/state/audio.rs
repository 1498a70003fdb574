use std::{
    collections::{HashMap, VecDeque},
    fmt,
};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Identifier of a narration item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioId(Uuid);

impl AudioId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AudioId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AudioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a narration item announces; drives the buzzer once it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioKind {
    /// Reading of a freshly displayed clue.
    Question,
    /// "Incorrect"/"time's up" announcement after a wrong answer.
    IncorrectAnswer,
    /// Anything else: greetings, control announcements, reveals.
    Generic,
}

/// One queued narration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioItem {
    /// Unique identifier.
    pub id: AudioId,
    /// Text to speak.
    pub text: String,
    /// Kind of announcement.
    pub kind: AudioKind,
    /// Serial of the question a clue narration belongs to.
    pub question_serial: Option<u64>,
}

impl AudioItem {
    /// Build a new item with a fresh identifier.
    pub fn new(text: impl Into<String>, kind: AudioKind, question_serial: Option<u64>) -> Self {
        Self {
            id: AudioId::new(),
            text: text.into(),
            kind,
            question_serial,
        }
    }
}

/// FIFO of pending narrations plus bookkeeping for completions.
#[derive(Debug)]
pub struct AudioQueue {
    pending: VecDeque<AudioItem>,
    playing: Option<AudioId>,
    recent: IndexSet<AudioId>,
    capacity: usize,
    waiters: HashMap<AudioId, Vec<oneshot::Sender<()>>>,
}

impl AudioQueue {
    /// Empty queue remembering up to `capacity` completed ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            playing: None,
            recent: IndexSet::new(),
            capacity: capacity.max(2),
            waiters: HashMap::new(),
        }
    }

    /// Queue `item` unless the same announcement is already pending.
    ///
    /// Returns the id the caller should track: the new one, or the id of the
    /// pending duplicate.
    pub fn push(&mut self, item: AudioItem) -> (AudioId, bool) {
        if let Some(existing) = self
            .pending
            .iter()
            .find(|queued| queued.text == item.text && queued.kind == item.kind)
        {
            return (existing.id, false);
        }
        let id = item.id;
        self.pending.push_back(item);
        (id, true)
    }

    /// Take the next item and mark it as playing.
    pub fn start_next(&mut self) -> Option<AudioItem> {
        let item = self.pending.pop_front()?;
        self.playing = Some(item.id);
        Some(item)
    }

    /// True while something is queued or playing.
    pub fn is_busy(&self) -> bool {
        self.playing.is_some() || !self.pending.is_empty()
    }

    /// Number of items waiting to be played.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Register interest in the completion of `id`.
    pub fn subscribe(&mut self, id: AudioId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if self.recent.contains(&id) {
            let _ = tx.send(());
        } else {
            self.waiters.entry(id).or_default().push(tx);
        }
        rx
    }

    /// Record that `id` finished playing.
    ///
    /// Returns `false` when the id already completed, so completion effects
    /// run at most once per item.
    pub fn complete(&mut self, id: AudioId) -> bool {
        if self.playing == Some(id) {
            self.playing = None;
        }
        if !self.recent.insert(id) {
            return false;
        }
        if self.recent.len() > self.capacity {
            let excess = self.recent.len() - self.capacity / 2;
            self.recent.drain(..excess);
        }
        for waiter in self.waiters.remove(&id).unwrap_or_default() {
            let _ = waiter.send(());
        }
        true
    }

    /// Drop everything pending; waiters observe a closed channel.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.playing = None;
        self.waiters.clear();
    }
}
