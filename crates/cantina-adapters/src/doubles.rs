//! In-memory/no-op test doubles, one pair per trait, in the style of the
//! event-bus `InMemoryEventBus`/`NullEventBus` pair this crate's traits
//! are modeled on: capture-everything for assertions, or discard
//! everything for a default CLI-only run.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AdapterError;
use crate::traits::{
    CachedSpeech, DashboardBridge, LedAdapter, LedCue, LlmAdapter, LlmRequest, LlmResponse, MusicAdapter, SttAdapter,
    TranscriptChunk, TtsAdapter,
};

/// STT adapter that echoes back whatever bytes it was given as final text,
/// for tests that only care about the bus wiring around transcription.
#[derive(Default)]
pub struct NullSttAdapter;

#[async_trait]
impl SttAdapter for NullSttAdapter {
    async fn transcribe_chunk(&self, audio: Vec<u8>) -> Result<TranscriptChunk, AdapterError> {
        Ok(TranscriptChunk { text: String::from_utf8_lossy(&audio).into_owned(), is_final: true })
    }
}

/// LLM adapter that always returns a fixed canned response.
pub struct NullLlmAdapter {
    response: String,
}

impl NullLlmAdapter {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }
}

impl Default for NullLlmAdapter {
    fn default() -> Self {
        Self::new("")
    }
}

#[async_trait]
impl LlmAdapter for NullLlmAdapter {
    async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse, AdapterError> {
        Ok(LlmResponse { text: self.response.clone() })
    }
}

/// LLM adapter that records every request it was given, for tests that
/// assert on the exact prompt/persona sent.
#[derive(Default)]
pub struct InMemoryLlmAdapter {
    requests: Mutex<Vec<LlmRequest>>,
    response: String,
}

impl InMemoryLlmAdapter {
    pub fn new(response: impl Into<String>) -> Self {
        Self { requests: Mutex::new(Vec::new()), response: response.into() }
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmAdapter for InMemoryLlmAdapter {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, AdapterError> {
        self.requests.lock().unwrap().push(request);
        Ok(LlmResponse { text: self.response.clone() })
    }
}

/// TTS adapter that "synthesizes" by returning empty audio and remembers
/// every `play_cached` call.
#[derive(Default)]
pub struct InMemoryTtsAdapter {
    played: Mutex<Vec<Uuid>>,
}

impl InMemoryTtsAdapter {
    pub fn played(&self) -> Vec<Uuid> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl TtsAdapter for InMemoryTtsAdapter {
    async fn synthesize(&self, speech_id: Uuid, _text: &str) -> Result<CachedSpeech, AdapterError> {
        Ok(CachedSpeech { speech_id, audio: Vec::new() })
    }

    async fn play_cached(&self, speech_id: Uuid) -> Result<(), AdapterError> {
        self.played.lock().unwrap().push(speech_id);
        Ok(())
    }
}

/// Music adapter over an in-memory playlist; records the action history
/// instead of touching a real playback backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MusicCall {
    Play(u32),
    Stop,
    Crossfade { to_track_id: String, fade_ms: u64 },
}

pub struct InMemoryMusicAdapter {
    library: Vec<String>,
    calls: Mutex<Vec<MusicCall>>,
}

impl InMemoryMusicAdapter {
    pub fn new(library: Vec<String>) -> Self {
        Self { library, calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<MusicCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MusicAdapter for InMemoryMusicAdapter {
    async fn play(&self, track_index: u32) -> Result<(), AdapterError> {
        if self.library.get(track_index as usize).is_none() {
            return Err(AdapterError::Rejected { adapter: "music", reason: format!("no track at index {track_index}") });
        }
        self.calls.lock().unwrap().push(MusicCall::Play(track_index));
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        self.calls.lock().unwrap().push(MusicCall::Stop);
        Ok(())
    }

    async fn crossfade(&self, to_track_id: &str, fade_ms: u64) -> Result<(), AdapterError> {
        self.calls.lock().unwrap().push(MusicCall::Crossfade { to_track_id: to_track_id.to_string(), fade_ms });
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, AdapterError> {
        Ok(self.library.clone())
    }
}

/// LED adapter that discards every cue. The default for headless/CLI runs
/// with no attached hardware.
#[derive(Default)]
pub struct NullLedAdapter;

#[async_trait]
impl LedAdapter for NullLedAdapter {
    async fn cue(&self, _cue: LedCue) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// LED adapter that records the cue history, for tests asserting on
/// what would have been shown.
#[derive(Default)]
pub struct InMemoryLedAdapter {
    cues: Mutex<Vec<LedCue>>,
}

impl InMemoryLedAdapter {
    pub fn cues(&self) -> Vec<LedCue> {
        self.cues.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedAdapter for InMemoryLedAdapter {
    async fn cue(&self, cue: LedCue) -> Result<(), AdapterError> {
        self.cues.lock().unwrap().push(cue);
        Ok(())
    }
}

/// Dashboard bridge that only forwards topics on its allow-list, and
/// records everything it forwarded for tests.
pub struct InMemoryDashboardBridge {
    allowed: Vec<&'static str>,
    forwarded: Mutex<Vec<(String, serde_json::Value)>>,
}

impl InMemoryDashboardBridge {
    pub fn new(allowed: Vec<&'static str>) -> Self {
        Self { allowed, forwarded: Mutex::new(Vec::new()) }
    }

    pub fn forwarded(&self) -> Vec<(String, serde_json::Value)> {
        self.forwarded.lock().unwrap().clone()
    }
}

impl DashboardBridge for InMemoryDashboardBridge {
    fn forward(&self, topic: &str, payload: serde_json::Value) -> Result<(), AdapterError> {
        if !self.allowed.contains(&topic) {
            return Err(AdapterError::UnknownTopic { topic: topic.to_string() });
        }
        self.forwarded.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }
}

/// Dashboard bridge that discards everything, for runs with no attached
/// web dashboard.
#[derive(Default)]
pub struct NullDashboardBridge;

impl DashboardBridge for NullDashboardBridge {
    fn forward(&self, _topic: &str, _payload: serde_json::Value) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_llm_adapter_records_requests() {
        let llm = InMemoryLlmAdapter::new("hello");
        let response = llm.complete(LlmRequest { prompt: "hi".to_string(), persona: None }).await.unwrap();
        assert_eq!(response.text, "hello");
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn in_memory_music_adapter_rejects_out_of_range_play() {
        let music = InMemoryMusicAdapter::new(vec!["a".to_string()]);
        assert!(music.play(5).await.is_err());
        assert!(music.calls().is_empty());
    }

    #[test]
    fn dashboard_bridge_rejects_topics_outside_its_allow_list() {
        let bridge = InMemoryDashboardBridge::new(vec!["/system/service_status"]);
        assert!(bridge.forward("/system/service_status", serde_json::json!({})).is_ok());
        assert!(bridge.forward("/made/up/topic", serde_json::json!({})).is_err());
        assert_eq!(bridge.forwarded().len(), 1);
    }
}
