//! Timeline plan data model (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Default timeout for a `play_cached_speech` step.
pub const DEFAULT_SPEECH_TIMEOUT_MS: u64 = 20_000;

/// Grace added on top of `fade_ms` for a `music_crossfade` step's
/// default timeout.
pub const CROSSFADE_TIMEOUT_GRACE_MS: u64 = 500;

/// The ducked volume the executor requests while speech plays over a
/// crossfade (spec §4.6 audio coupling).
pub const DEFAULT_DUCK_LEVEL: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Foreground,
    Ambient,
}

/// A node in a timeline plan. Plans are single-shot: they do not loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    PlayCachedSpeech {
        speech_id: Uuid,
        #[serde(default = "default_speech_timeout")]
        timeout_ms: u64,
    },
    MusicCrossfade {
        #[serde(default)]
        from_track_id: Option<String>,
        to_track_id: String,
        fade_ms: u64,
    },
    Parallel {
        steps: Vec<Step>,
    },
    Wait {
        event_topic: String,
        #[serde(rename = "match")]
        match_fields: HashMap<String, serde_json::Value>,
        timeout_ms: u64,
    },
}

fn default_speech_timeout() -> u64 {
    DEFAULT_SPEECH_TIMEOUT_MS
}

impl Step {
    /// The step's timeout, applying the spec's documented defaults where
    /// a step doesn't carry an explicit one.
    pub fn timeout_ms(&self) -> u64 {
        match self {
            Step::PlayCachedSpeech { timeout_ms, .. } => *timeout_ms,
            Step::MusicCrossfade { fade_ms, .. } => fade_ms + CROSSFADE_TIMEOUT_GRACE_MS,
            Step::Wait { timeout_ms, .. } => *timeout_ms,
            Step::Parallel { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: Uuid,
    pub layer: Layer,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(layer: Layer, steps: Vec<Step>) -> Self {
        Self { plan_id: Uuid::new_v4(), layer, steps }
    }

    /// True if any top-level step is a `parallel` node pairing speech
    /// playback with a music crossfade — the case that needs ducking
    /// coupled around both (spec §4.6).
    pub fn needs_duck_coupling(&self) -> bool {
        self.steps.iter().any(Step::is_speech_and_crossfade_parallel)
    }
}

impl Step {
    fn is_speech_and_crossfade_parallel(&self) -> bool {
        match self {
            Step::Parallel { steps } => Step::slice_needs_duck_coupling(steps),
            _ => false,
        }
    }

    /// True if `steps` pairs a speech playback with a music crossfade —
    /// the shape that needs ducking coupled around it (spec §4.6). Shared
    /// by [`Plan::needs_duck_coupling`] and the executor's own parallel
    /// runner so the rule is defined exactly once.
    pub(crate) fn slice_needs_duck_coupling(steps: &[Step]) -> bool {
        steps.iter().any(|s| matches!(s, Step::PlayCachedSpeech { .. }))
            && steps.iter().any(|s| matches!(s, Step::MusicCrossfade { .. }))
    }
}
