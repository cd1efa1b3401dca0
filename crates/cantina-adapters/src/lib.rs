mod doubles;
mod error;
mod traits;

pub use doubles::{
    InMemoryDashboardBridge, InMemoryLedAdapter, InMemoryLlmAdapter, InMemoryMusicAdapter, InMemoryTtsAdapter, MusicCall,
    NullLedAdapter, NullLlmAdapter, NullSttAdapter, NullDashboardBridge,
};
pub use error::AdapterError;
pub use traits::{
    CachedSpeech, DashboardBridge, LedAdapter, LedCue, LlmAdapter, LlmRequest, LlmResponse, MusicAdapter, SttAdapter,
    TranscriptChunk, TtsAdapter,
};
