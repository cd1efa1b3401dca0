//! Typed payload schemas. Every topic has exactly one schema; the registry
//! wraps it in an [`Envelope`] that carries the fields every payload must
//! have (spec §3: `timestamp`, `event_id`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wraps a topic-specific payload body with the fields common to every
/// published event. Constructed only by the bus, so `timestamp`/
/// `event_id` are always present — the "insert if absent" rule from the
/// registry's JS ancestor collapses to "always present" in typed Rust.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub timestamp: f64,
    pub event_id: Uuid,
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(body: T) -> Self {
        Self {
            timestamp: now_secs(),
            event_id: Uuid::new_v4(),
            body,
        }
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Per-payload structural validation (spec §4.1: "a handler that fails
/// validation... surfaced as a typed error"). Most payloads have no
/// extra invariant beyond their Rust type, so the default is a no-op;
/// payloads with a real invariant (e.g. a volume in `0.0..=1.0`) override
/// it.
pub trait Validate {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

macro_rules! no_op_validate {
    ($($t:ty),* $(,)?) => {
        $(impl Validate for $t {})*
    };
}

no_op_validate!(u8, u16, u32, u64, i32, i64, f32, f64, bool, String, ());

/// Canonical service status enum (spec §4.2: "coerce vendor status strings
/// to the canonical enum before delivery").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Initializing,
    Running,
    Degraded,
    Stopped,
    Error,
}

/// Kind of status event, distinguishing routine lifecycle updates from
/// error reports (spec §7 error kinds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Lifecycle,
    ValidationError,
    RegistrationError,
    HandlerError,
    StepTimeout,
    AdapterError,
    LifecycleError,
}

/// Body of a `/system/service_status` publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatusPayload {
    pub service: String,
    pub status: ServiceStatus,
    pub kind: StatusKind,
    pub message: Option<String>,
}

/// Normalized command record produced by the dispatcher (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: String,
    pub subcommand: Option<String>,
    pub args: Vec<String>,
    pub raw_input: String,
    pub source: CommandSource,
    pub command_id: Uuid,
    /// Present only for dashboard-sourced commands; used for ack relay.
    pub sid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandSource {
    Cli,
    Dashboard,
}

/// Raw input line published by a CLI or dashboard bridge before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInput {
    pub line: String,
    pub source: CommandSource,
    pub sid: Option<String>,
}

/// Body of a `/command/ack` publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAck {
    pub command_id: Uuid,
    pub success: bool,
    pub message: String,
    pub sid: Option<String>,
}

/// A one-line, human readable response routed back to the CLI/dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliResponse {
    pub message: String,
    pub hint: Option<String>,
}

/// Action carried by a `/music/command` publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MusicAction {
    Play,
    Stop,
    List,
}

/// Body of `/music/command`, produced by the dispatcher (spec §4.4:
/// `play music <N>` extracts `N` so the music service never parses the
/// phrase itself) and by the DJ coordinator's transition steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicCommandPayload {
    pub action: MusicAction,
    pub track_index: Option<u32>,
}

/// Body of `/dj/command` (spec §4.4: `dj start|stop|next`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DjCommandPayload {
    pub dj_mode_active: bool,
    pub skip: bool,
}

impl Validate for ServiceStatusPayload {}
impl Validate for MusicCommandPayload {
    fn validate(&self) -> Result<(), String> {
        if matches!(self.action, MusicAction::Play) && self.track_index.is_none() {
            return Err("play action requires a track_index".to_string());
        }
        Ok(())
    }
}
impl Validate for DjCommandPayload {}

/// Body of `/audio/duck_requested`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioDuckRequestedPayload {
    pub level: f32,
}

impl Validate for AudioDuckRequestedPayload {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.level) {
            return Err(format!("duck level {} outside 0.0..=1.0", self.level));
        }
        Ok(())
    }
}

/// Body of `/audio/crossfade_complete`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrossfadeCompletePayload {
    pub plan_id: Uuid,
}

impl Validate for CrossfadeCompletePayload {}

/// Body of `/speech/playback_completed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpeechPlaybackCompletedPayload {
    pub speech_id: Uuid,
}

impl Validate for SpeechPlaybackCompletedPayload {}

/// Body of `/tts/play_cached_request`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlayCachedSpeechRequestPayload {
    pub speech_id: Uuid,
}

impl Validate for PlayCachedSpeechRequestPayload {}

/// Body of `/music/crossfade_request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicCrossfadeRequestPayload {
    pub plan_id: Uuid,
    pub from_track_id: Option<String>,
    pub to_track_id: String,
    pub fade_ms: u64,
}

impl Validate for MusicCrossfadeRequestPayload {}
impl Validate for CommandRecord {
    fn validate(&self) -> Result<(), String> {
        if self.command.trim().is_empty() {
            return Err("command must not be empty".to_string());
        }
        Ok(())
    }
}
impl Validate for RawInput {
    fn validate(&self) -> Result<(), String> {
        if self.line.trim().is_empty() {
            return Err("raw input line must not be empty".to_string());
        }
        Ok(())
    }
}
impl Validate for CommandAck {}
impl Validate for CliResponse {}
