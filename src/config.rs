//! Match configuration loading: every timer duration and threshold the host relies on.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/match.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_HOST_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Tunable durations and thresholds shared by every component of a match.
pub struct MatchConfig {
    /// How long the buzzer stays armed before the clue is revealed unanswered.
    pub question_timeout: Duration,
    /// How long a contestant holding the buzzer has to answer.
    pub answer_timeout: Duration,
    /// How long the controlling contestant may stall before a clue is picked for them.
    pub idle_pick_timeout: Duration,
    /// Upper bound on waiting for a narration completion signal.
    pub narration_timeout: Duration,
    /// Poll interval of the audio consumer loop.
    pub audio_poll_interval: Duration,
    /// Tick interval of the flow orchestrator.
    pub tick_interval: Duration,
    /// Deadline for a single answer evaluation.
    pub judge_timeout: Duration,
    /// Contestants required before the match starts.
    pub required_contestants: usize,
    /// Smallest accepted wager.
    pub min_wager: i32,
    /// Wager ceiling for contestants whose score is below it.
    pub wager_ceiling_floor: i32,
    /// Number of completed audio ids remembered for duplicate suppression.
    pub recent_audio_capacity: usize,
    /// Lobby matches older than this are swept from the registry.
    pub lobby_retention: Duration,
    /// Completed matches older than this are swept from the registry.
    pub completed_retention: Duration,
    /// Interval between registry sweeps.
    pub sweep_interval: Duration,
}

impl MatchConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        question_timeout_ms = config.question_timeout.as_millis() as u64,
                        answer_timeout_ms = config.answer_timeout.as_millis() as u64,
                        "loaded match config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Largest wager a contestant holding `score` points may place.
    pub fn max_wager(&self, score: i32) -> i32 {
        self.wager_ceiling_floor.max(score)
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            question_timeout: Duration::from_secs(5),
            answer_timeout: Duration::from_secs(7),
            idle_pick_timeout: Duration::from_secs(15),
            narration_timeout: Duration::from_secs(30),
            audio_poll_interval: Duration::from_millis(500),
            tick_interval: Duration::from_millis(500),
            judge_timeout: Duration::from_secs(10),
            required_contestants: 3,
            min_wager: 5,
            wager_ceiling_floor: 1000,
            recent_audio_capacity: 100,
            lobby_retention: Duration::from_secs(24 * 60 * 60),
            completed_retention: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file; every field is optional.
struct RawConfig {
    question_timeout_ms: Option<u64>,
    answer_timeout_ms: Option<u64>,
    idle_pick_timeout_ms: Option<u64>,
    narration_timeout_ms: Option<u64>,
    audio_poll_interval_ms: Option<u64>,
    tick_interval_ms: Option<u64>,
    judge_timeout_ms: Option<u64>,
    required_contestants: Option<usize>,
    min_wager: Option<i32>,
    wager_ceiling_floor: Option<i32>,
    recent_audio_capacity: Option<usize>,
    lobby_retention_secs: Option<u64>,
    completed_retention_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

impl From<RawConfig> for MatchConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };

        Self {
            question_timeout: millis(raw.question_timeout_ms, defaults.question_timeout),
            answer_timeout: millis(raw.answer_timeout_ms, defaults.answer_timeout),
            idle_pick_timeout: millis(raw.idle_pick_timeout_ms, defaults.idle_pick_timeout),
            narration_timeout: millis(raw.narration_timeout_ms, defaults.narration_timeout),
            audio_poll_interval: millis(raw.audio_poll_interval_ms, defaults.audio_poll_interval),
            tick_interval: millis(raw.tick_interval_ms, defaults.tick_interval),
            judge_timeout: millis(raw.judge_timeout_ms, defaults.judge_timeout),
            required_contestants: raw
                .required_contestants
                .filter(|count| *count > 0)
                .unwrap_or(defaults.required_contestants),
            min_wager: raw.min_wager.unwrap_or(defaults.min_wager),
            wager_ceiling_floor: raw
                .wager_ceiling_floor
                .unwrap_or(defaults.wager_ceiling_floor),
            recent_audio_capacity: raw
                .recent_audio_capacity
                .filter(|capacity| *capacity >= 2)
                .unwrap_or(defaults.recent_audio_capacity),
            lobby_retention: secs(raw.lobby_retention_secs, defaults.lobby_retention),
            completed_retention: secs(raw.completed_retention_secs, defaults.completed_retention),
            sweep_interval: secs(raw.sweep_interval_secs, defaults.sweep_interval),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
