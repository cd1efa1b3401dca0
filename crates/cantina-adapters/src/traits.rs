//! Adapter traits (spec §1, §9): the only interfaces the core consumes
//! from vendor-specific collaborators. No other component may call a
//! vendor API directly (spec §5).

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AdapterError;

/// One chunk of a streamed transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptChunk {
    pub text: String,
    pub is_final: bool,
}

#[async_trait]
pub trait SttAdapter: Send + Sync {
    /// Transcribe one buffer of audio, yielding the next chunk of the
    /// running transcript.
    async fn transcribe_chunk(&self, audio: Vec<u8>) -> Result<TranscriptChunk, AdapterError>;
}

/// A request for an LLM completion (a command intent or DJ commentary).
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub prompt: String,
    pub persona: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
}

#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, AdapterError>;
}

/// A speech artifact synthesized and cached by the TTS adapter (spec §5:
/// "speech cache is single-writer... entries transition through
/// pending -> ready -> played").
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSpeech {
    pub speech_id: Uuid,
    pub audio: Vec<u8>,
}

#[async_trait]
pub trait TtsAdapter: Send + Sync {
    async fn synthesize(&self, speech_id: Uuid, text: &str) -> Result<CachedSpeech, AdapterError>;
    async fn play_cached(&self, speech_id: Uuid) -> Result<(), AdapterError>;
}

#[async_trait]
pub trait MusicAdapter: Send + Sync {
    async fn play(&self, track_index: u32) -> Result<(), AdapterError>;
    async fn stop(&self) -> Result<(), AdapterError>;
    async fn crossfade(&self, to_track_id: &str, fade_ms: u64) -> Result<(), AdapterError>;
    async fn list(&self) -> Result<Vec<String>, AdapterError>;
}

/// The handful of named cues the LED hardware understands (spec §4.8
/// sibling note, §9: narrow capability set per adapter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCue {
    Idle,
    Listening,
    Thinking,
    Speaking,
    Error,
}

#[async_trait]
pub trait LedAdapter: Send + Sync {
    async fn cue(&self, cue: LedCue) -> Result<(), AdapterError>;
}

/// Forwards a fixed set of bus events outward to the web dashboard
/// (spec §6: "bridge must not invent topics" — implementations must
/// reject anything not in their allow-list).
pub trait DashboardBridge: Send + Sync {
    fn forward(&self, topic: &str, payload: serde_json::Value) -> Result<(), AdapterError>;
}
