//! Audio coordinator service (spec §4.8): the single point of truth for
//! music ducking, so the crossfade step can never silently override an
//! in-progress duck.

use std::sync::Arc;

use async_trait::async_trait;
use cantina_bus::{
    topics, AudioDuckRequestedPayload, CrossfadeCompletePayload, EventBus, HandlerError,
    MusicCrossfadeRequestPayload, PlayCachedSpeechRequestPayload, SpeechPlaybackCompletedPayload,
};
use cantina_service::{LifecycleError, Service, ServiceContext};
use tokio::sync::Mutex;

/// Default ducked-volume setpoint (spec §4.8: "ducked volume setpoint
/// (default 0.5)").
pub const DEFAULT_DUCKED_VOLUME: f32 = 0.5;

/// Full, non-ducked music volume.
pub const DEFAULT_USER_VOLUME: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct AudioState {
    current_volume: f32,
    user_volume: f32,
    ducked_volume: f32,
    speech_active: bool,
    crossfade_active: bool,
}

impl AudioState {
    fn new() -> Self {
        Self {
            current_volume: DEFAULT_USER_VOLUME,
            user_volume: DEFAULT_USER_VOLUME,
            ducked_volume: DEFAULT_DUCKED_VOLUME,
            speech_active: false,
            crossfade_active: false,
        }
    }
}

/// The volume music should target while a crossfade is in progress
/// (spec §4.8: "avoids the classic crossfade-overrides-duck bug").
fn target_volume_during_crossfade(state: &AudioState) -> f32 {
    if state.speech_active {
        state.ducked_volume
    } else {
        state.user_volume
    }
}

/// L3 audio coordinator. Owns no hardware — it only tracks the volume
/// music *should* be at; the music adapter is the one that actually
/// applies it.
pub struct AudioCoordinator {
    state: Arc<Mutex<AudioState>>,
}

impl AudioCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { state: Arc::new(Mutex::new(AudioState::new())) })
    }

    /// The volume music is currently meant to play at.
    pub async fn current_volume(&self) -> f32 {
        self.state.lock().await.current_volume
    }

    /// Set the user's chosen full-volume level (no bus topic covers this;
    /// `app/` wiring or a future volume-control surface calls it directly).
    pub async fn set_user_volume(&self, volume: f32) {
        let mut guard = self.state.lock().await;
        guard.user_volume = volume.clamp(0.0, 1.0);
        if !guard.crossfade_active && !guard.speech_active {
            guard.current_volume = guard.user_volume;
        }
    }
}

async fn on_duck_requested(state: &Arc<Mutex<AudioState>>, level: f32) {
    let mut guard = state.lock().await;
    guard.ducked_volume = level;
    guard.current_volume = guard.current_volume.min(level);
}

async fn on_unduck_requested(state: &Arc<Mutex<AudioState>>) {
    let mut guard = state.lock().await;
    if !guard.crossfade_active {
        guard.current_volume = guard.user_volume;
    }
}

async fn on_speech_started(state: &Arc<Mutex<AudioState>>) {
    state.lock().await.speech_active = true;
}

async fn on_speech_completed(state: &Arc<Mutex<AudioState>>) {
    state.lock().await.speech_active = false;
}

async fn on_crossfade_started(state: &Arc<Mutex<AudioState>>) {
    let mut guard = state.lock().await;
    guard.crossfade_active = true;
    guard.current_volume = target_volume_during_crossfade(&guard);
}

async fn on_crossfade_complete(state: &Arc<Mutex<AudioState>>) {
    let mut guard = state.lock().await;
    guard.crossfade_active = false;
    guard.current_volume = if guard.speech_active { guard.ducked_volume } else { guard.user_volume };
}

#[async_trait]
impl Service for AudioCoordinator {
    fn name(&self) -> &'static str {
        "audio_coordinator"
    }

    async fn on_start(&self, ctx: &ServiceContext) -> Result<(), LifecycleError> {
        let state = self.state.clone();
        ctx.subscribe::<AudioDuckRequestedPayload, _, _>(topics::AUDIO_DUCK_REQUESTED, move |envelope| {
            let state = state.clone();
            async move {
                on_duck_requested(&state, envelope.body.level).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        ctx.subscribe::<(), _, _>(topics::AUDIO_UNDUCK_REQUESTED, move |_envelope| {
            let state = state.clone();
            async move {
                on_unduck_requested(&state).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        ctx.subscribe::<PlayCachedSpeechRequestPayload, _, _>(topics::TTS_PLAY_CACHED_REQUEST, move |_envelope| {
            let state = state.clone();
            async move {
                on_speech_started(&state).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        ctx.subscribe::<SpeechPlaybackCompletedPayload, _, _>(topics::SPEECH_PLAYBACK_COMPLETED, move |_envelope| {
            let state = state.clone();
            async move {
                on_speech_completed(&state).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        ctx.subscribe::<MusicCrossfadeRequestPayload, _, _>(topics::MUSIC_CROSSFADE_REQUEST, move |_envelope| {
            let state = state.clone();
            async move {
                on_crossfade_started(&state).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        let state = self.state.clone();
        ctx.subscribe::<CrossfadeCompletePayload, _, _>(topics::AUDIO_CROSSFADE_COMPLETE, move |_envelope| {
            let state = state.clone();
            async move {
                on_crossfade_complete(&state).await;
                Ok::<(), HandlerError>(())
            }
        })
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantina_bus::Registry;
    use cantina_service::start_service;
    use std::time::Duration;
    use uuid::Uuid;

    fn bus() -> Arc<EventBus> {
        EventBus::shared(Arc::new(Registry::build()))
    }

    #[tokio::test]
    async fn duck_request_lowers_volume_to_the_requested_level() {
        let bus = bus();
        let coord = AudioCoordinator::new();
        let handle = start_service(coord.clone(), bus.clone()).await.unwrap();

        bus.publish(topics::AUDIO_DUCK_REQUESTED, AudioDuckRequestedPayload { level: 0.3 }).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(coord.current_volume().await, 0.3);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unduck_restores_user_volume_when_no_crossfade_is_active() {
        let bus = bus();
        let coord = AudioCoordinator::new();
        let handle = start_service(coord.clone(), bus.clone()).await.unwrap();

        bus.publish(topics::AUDIO_DUCK_REQUESTED, AudioDuckRequestedPayload { level: 0.2 }).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish(topics::AUDIO_UNDUCK_REQUESTED, ()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(coord.current_volume().await, DEFAULT_USER_VOLUME);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn crossfade_during_speech_targets_the_ducked_volume_not_full_volume() {
        let bus = bus();
        let coord = AudioCoordinator::new();
        let handle = start_service(coord.clone(), bus.clone()).await.unwrap();

        let speech_id = Uuid::new_v4();
        bus.publish(topics::TTS_PLAY_CACHED_REQUEST, PlayCachedSpeechRequestPayload { speech_id }).unwrap();
        bus.publish(topics::AUDIO_DUCK_REQUESTED, AudioDuckRequestedPayload { level: 0.4 }).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let plan_id = Uuid::new_v4();
        bus.publish(
            topics::MUSIC_CROSSFADE_REQUEST,
            MusicCrossfadeRequestPayload { plan_id, from_track_id: None, to_track_id: "next".to_string(), fade_ms: 1_000 },
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Without the duck-aware rule this would jump back to full volume.
        assert_eq!(coord.current_volume().await, 0.4);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn crossfade_without_speech_targets_full_user_volume() {
        let bus = bus();
        let coord = AudioCoordinator::new();
        let handle = start_service(coord.clone(), bus.clone()).await.unwrap();

        let plan_id = Uuid::new_v4();
        bus.publish(
            topics::MUSIC_CROSSFADE_REQUEST,
            MusicCrossfadeRequestPayload { plan_id, from_track_id: None, to_track_id: "next".to_string(), fade_ms: 1_000 },
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(coord.current_volume().await, DEFAULT_USER_VOLUME);
        handle.stop().await.unwrap();
    }
}
