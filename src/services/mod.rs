/// Answer evaluation collaborator and the built-in lenient judge.
pub mod answer_judge;
/// Free-text answer submission glue.
pub mod answer_service;
/// Ordered narration playback.
pub mod audio_sequencer;
/// Buzzer arming, buzz arbitration and timeouts.
pub mod buzzer_arbiter;
/// Periodic match supervision.
pub mod flow_orchestrator;
/// Match event generation.
pub mod match_events;
/// Match lifecycle and client command dispatch.
pub mod match_service;
/// Narration collaborator and the client-driven narrator.
pub mod narration;
/// Question display, scoring and wagers.
pub mod question_lifecycle;
