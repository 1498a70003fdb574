//! Shared fixtures for the match engine tests.

use std::{sync::Arc, time::Duration};

use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{
    config::MatchConfig,
    dto::events::ServerEvent,
    error::{JudgeError, NarrationError},
    services::{
        answer_judge::{AnswerJudge, JudgeRequest, Verdict},
        audio_sequencer,
        narration::Narrator,
    },
    state::{
        BroadcastHub, MatchContext, SharedMatch,
        audio::{AudioId, AudioItem, AudioKind},
        game::{Board, Category, Contestant, MatchStatus, Question},
    },
};

/// Two categories of two clues; Science 400 is a wager.
pub fn sample_board() -> Board {
    let question = |clue: &str, answer: &str, value: i32, is_wager: bool| Question {
        clue: clue.into(),
        answer: answer.into(),
        value,
        used: false,
        is_wager,
    };
    Board {
        categories: vec![
            Category {
                name: "History".into(),
                questions: vec![
                    question("First president of the United States", "Washington", 200, false),
                    question("Year the Berlin Wall fell", "1989", 400, false),
                ],
            },
            Category {
                name: "Science".into(),
                questions: vec![
                    question("Chemical symbol for gold", "Au", 200, false),
                    question("Closest planet to the sun", "Mercury", 400, true),
                ],
            },
        ],
    }
}

/// Active match with Ada, Bob and Cy and nobody in control.
pub fn active_match() -> TestMatch {
    TestMatch::builder().active(&["Ada", "Bob", "Cy"]).build()
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// A match context wired to scripted collaborators, with its event stream captured.
pub struct TestMatch {
    pub ctx: SharedMatch,
    events: Mutex<broadcast::Receiver<ServerEvent>>,
}

impl TestMatch {
    pub fn builder() -> TestMatchBuilder {
        TestMatchBuilder::default()
    }

    /// Drain every event broadcast so far.
    pub fn events(&self) -> Vec<ServerEvent> {
        let mut rx = self.events.lock();
        let mut drained = Vec::new();
        while let Ok(event) = rx.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Drain every event and keep only the topics.
    pub fn topics(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.topic).collect()
    }

    pub fn drain_events(&self) {
        self.events();
    }

    /// Finish queued narration up to and including the next clue narration.
    pub fn arm_buzzer(&self) {
        while let Some(item) = self.ctx.with_audio(|queue| queue.start_next()) {
            audio_sequencer::finish_item(&self.ctx, &item);
            if item.kind == AudioKind::Question {
                break;
            }
        }
    }

    /// Play the whole narration queue through the scripted narrator.
    pub async fn play_all_narration(&self) {
        while audio_sequencer::play_next(&self.ctx).await {}
    }
}

#[derive(Default)]
pub struct TestMatchBuilder {
    contestants: Vec<String>,
    active: bool,
    narrator: Option<Arc<dyn Narrator>>,
    judge: Option<Arc<dyn AnswerJudge>>,
}

impl TestMatchBuilder {
    /// Contestants already registered in the lobby.
    pub fn contestants(mut self, names: &[&str]) -> Self {
        self.contestants = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Contestants registered and the match already started.
    pub fn active(mut self, names: &[&str]) -> Self {
        self.active = true;
        self.contestants(names)
    }

    pub fn narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn judge(mut self, judge: Arc<dyn AnswerJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn build(self) -> TestMatch {
        let hub = Arc::new(BroadcastHub::new(1024));
        let events = Mutex::new(hub.subscribe());
        let narrator: Arc<dyn Narrator> = match self.narrator {
            Some(narrator) => narrator,
            None => Arc::new(ScriptedNarrator::completing()),
        };
        let judge: Arc<dyn AnswerJudge> = match self.judge {
            Some(judge) => judge,
            None => Arc::new(ScriptedJudge::accepting()),
        };
        let ctx = MatchContext::new(
            "TEST01".into(),
            sample_board(),
            Arc::new(MatchConfig::default()),
            hub,
            narrator,
            judge,
        );
        ctx.with_state(|state| {
            for name in &self.contestants {
                state.contestants.insert(
                    name.clone(),
                    Contestant {
                        name: name.clone(),
                        score: 0,
                    },
                );
            }
            if self.active {
                state.status = MatchStatus::Active;
            }
        });
        TestMatch { ctx, events }
    }
}

#[derive(Debug, Clone, Copy)]
enum NarratorMode {
    Completing,
    Failing,
    Silent,
}

/// Narrator that records what it was asked to say.
pub struct ScriptedNarrator {
    mode: NarratorMode,
    spoken: Mutex<Vec<String>>,
}

impl ScriptedNarrator {
    /// Every item finishes as soon as it is requested.
    pub fn completing() -> Self {
        Self::with_mode(NarratorMode::Completing)
    }

    /// Every request fails.
    pub fn failing() -> Self {
        Self::with_mode(NarratorMode::Failing)
    }

    /// Items are accepted but never report completion.
    pub fn silent() -> Self {
        Self::with_mode(NarratorMode::Silent)
    }

    fn with_mode(mode: NarratorMode) -> Self {
        Self {
            mode,
            spoken: Mutex::new(Vec::new()),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

impl Narrator for ScriptedNarrator {
    fn narrate(&self, item: &AudioItem) -> BoxFuture<'static, Result<(), NarrationError>> {
        let result = match self.mode {
            NarratorMode::Failing => Err(NarrationError::Backend("scripted failure".into())),
            NarratorMode::Completing | NarratorMode::Silent => {
                self.spoken.lock().push(item.text.clone());
                Ok(())
            }
        };
        futures::future::ready(result).boxed()
    }

    fn await_completion(&self, _id: AudioId, timeout: Duration) -> BoxFuture<'static, bool> {
        match self.mode {
            NarratorMode::Silent => async move {
                tokio::time::sleep(timeout).await;
                false
            }
            .boxed(),
            NarratorMode::Completing | NarratorMode::Failing => {
                futures::future::ready(true).boxed()
            }
        }
    }
}

/// Judge returning a fixed verdict, optionally after a delay.
pub struct ScriptedJudge {
    correct: bool,
    delay: Option<Duration>,
}

impl ScriptedJudge {
    pub fn accepting() -> Self {
        Self {
            correct: true,
            delay: None,
        }
    }

    pub fn rejecting() -> Self {
        Self {
            correct: false,
            delay: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl AnswerJudge for ScriptedJudge {
    fn evaluate(&self, request: JudgeRequest) -> BoxFuture<'static, Result<Verdict, JudgeError>> {
        let correct = self.correct;
        let delay = self.delay;
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(Verdict {
                is_correct: correct,
                explanation: format!("scripted verdict for \"{}\"", request.candidate),
                unresolved: false,
            })
        }
        .boxed()
    }
}
