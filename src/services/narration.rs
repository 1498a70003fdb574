use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{
    dto::events::{PlayAudioEvent, ServerEvent},
    error::NarrationError,
    state::{
        Broadcaster,
        audio::{AudioId, AudioItem},
    },
};

const EVENT_PLAY_AUDIO: &str = "play-audio";

/// Speech backend: turns text into audio and reports when it finished playing.
pub trait Narrator: Send + Sync {
    /// Start speaking `item`; resolves once playback has been requested.
    fn narrate(&self, item: &AudioItem) -> BoxFuture<'static, Result<(), NarrationError>>;

    /// Resolve `true` once `id` finished playing, `false` if `timeout` elapsed first.
    fn await_completion(&self, id: AudioId, timeout: Duration) -> BoxFuture<'static, bool>;

    /// Completion reported by an external player. Returns `false` for unknown ids.
    fn report_completion(&self, _id: AudioId) -> bool {
        false
    }
}

/// Narrator delegating playback to whoever presents the match.
///
/// Each item is broadcast as a `play-audio` event; the presenter answers with
/// an `audio_complete` message once the clip ends.
pub struct ClientNarrator {
    room: String,
    broadcaster: Arc<dyn Broadcaster>,
    signals: Arc<DashMap<AudioId, oneshot::Sender<()>>>,
    completions: DashMap<AudioId, oneshot::Receiver<()>>,
}

impl ClientNarrator {
    /// Narrator publishing to `room` through `broadcaster`.
    pub fn new(room: impl Into<String>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            room: room.into(),
            broadcaster,
            signals: Arc::new(DashMap::new()),
            completions: DashMap::new(),
        }
    }
}

impl Narrator for ClientNarrator {
    fn narrate(&self, item: &AudioItem) -> BoxFuture<'static, Result<(), NarrationError>> {
        let (tx, rx) = oneshot::channel();
        self.signals.insert(item.id, tx);
        self.completions.insert(item.id, rx);

        let payload = PlayAudioEvent {
            audio_id: item.id,
            text: item.text.clone(),
            kind: item.kind,
        };
        let result = ServerEvent::json(EVENT_PLAY_AUDIO, &self.room, &payload)
            .map(|event| self.broadcaster.broadcast(event))
            .map_err(|err| {
                self.signals.remove(&item.id);
                self.completions.remove(&item.id);
                NarrationError::Backend(err.to_string())
            });

        futures::future::ready(result).boxed()
    }

    fn await_completion(&self, id: AudioId, timeout: Duration) -> BoxFuture<'static, bool> {
        let receiver = self.completions.remove(&id).map(|(_, rx)| rx);
        let signals = Arc::clone(&self.signals);
        async move {
            let Some(rx) = receiver else {
                warn!(%id, "no playback registered for audio item");
                return false;
            };
            let finished = matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())));
            if !finished {
                signals.remove(&id);
            }
            finished
        }
        .boxed()
    }

    fn report_completion(&self, id: AudioId) -> bool {
        match self.signals.remove(&id) {
            Some((_, tx)) => {
                debug!(%id, "presenter finished playing audio");
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BroadcastHub, audio::AudioKind};

    #[tokio::test(start_paused = true)]
    async fn reported_completion_resolves_waiter() {
        let hub = Arc::new(BroadcastHub::new(8));
        let mut events = hub.subscribe();
        let narrator = ClientNarrator::new("ROOM01", hub);
        let item = AudioItem::new("Welcome!", AudioKind::Generic, None);

        narrator.narrate(&item).await.unwrap();
        let event = events.try_recv().unwrap();
        assert_eq!(event.topic, EVENT_PLAY_AUDIO);
        assert_eq!(event.room, "ROOM01");

        assert!(narrator.report_completion(item.id));
        assert!(
            narrator
                .await_completion(item.id, Duration::from_secs(1))
                .await
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_report_times_out() {
        let hub = Arc::new(BroadcastHub::new(8));
        let narrator = ClientNarrator::new("ROOM01", hub);
        let item = AudioItem::new("Welcome!", AudioKind::Generic, None);

        narrator.narrate(&item).await.unwrap();
        assert!(
            !narrator
                .await_completion(item.id, Duration::from_secs(1))
                .await
        );
    }

    #[test]
    fn unknown_completion_is_rejected() {
        let narrator = ClientNarrator::new("ROOM01", Arc::new(BroadcastHub::new(8)));
        assert!(!narrator.report_completion(AudioId::new()));
    }
}
