//! End-to-end scenarios (spec §8).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cantina_app::{config::Config, wiring};
use cantina_bus::{
    topics, AudioDuckRequestedPayload, CrossfadeCompletePayload, DjCommandPayload, HandlerError, MusicCommandPayload,
    MusicCrossfadeRequestPayload, PlayCachedSpeechRequestPayload, RawInput, ServiceStatus, ServiceStatusPayload,
    SpeechPlaybackCompletedPayload, StatusKind,
};
use cantina_dj::{
    CacheReadyPayload, CommentaryRequestPayload, CommentaryResponsePayload, CommentarySkippedPayload,
    SynthesizeRequestPayload, TrackEndingSoonPayload,
};
use cantina_mode::{Mode, ModeChanged};
use tokio::sync::Mutex;
use tokio::time::timeout;

fn config() -> Config {
    Config { track_library: vec!["a".to_string(), "b".to_string(), "c".to_string()], ..Config::default() }
}

#[tokio::test]
async fn scenario_1_startup_reaches_idle_and_reports_running_services() {
    let core = wiring::start(&config()).await.unwrap();

    assert_eq!(core.mode_manager.current().await, Mode::Idle);

    let observed = Arc::new(Mutex::new(Vec::new()));
    let observed_for_handler = observed.clone();
    core.bus
        .subscribe::<ServiceStatusPayload, _, _>(topics::SYSTEM_SERVICE_STATUS, "test", move |envelope| {
            let observed = observed_for_handler.clone();
            async move {
                observed.lock().await.push(envelope.body);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    // Nudge the dispatcher so it has a reason to report status, then check
    // that every service that reports at all reports Running, not Error.
    core.bus
        .publish(topics::COMMAND_RAW_INPUT, RawInput { line: "status".to_string(), source: cantina_bus::CommandSource::Cli, sid: None })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let statuses = observed.lock().await.clone();
    assert!(statuses.iter().all(|s| s.status != ServiceStatus::Error));

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn scenario_2_compound_command_extracts_track_index_and_touches_no_other_topic() {
    let core = wiring::start(&config()).await.unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_for_handler = received.clone();
    core.bus
        .subscribe::<MusicCommandPayload, _, _>(topics::MUSIC_COMMAND, "test", move |envelope| {
            let received = received_for_handler.clone();
            async move {
                received.lock().await.push(envelope.body);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    core.bus
        .publish(topics::COMMAND_RAW_INPUT, RawInput { line: "play music 3".to_string(), source: cantina_bus::CommandSource::Cli, sid: None })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls = received.lock().await.clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].track_index, Some(3));

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn scenario_3_mode_flip_across_idle_emits_the_expected_event_order() {
    let core = wiring::start(&config()).await.unwrap();

    // Starting mode is IDLE (startup already ran); drive it to AMBIENT first.
    core.bus.publish(topics::SYSTEM_SET_MODE_REQUEST, cantina_mode::SetModeRequest { mode: Mode::Ambient, reason: None }).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(core.mode_manager.current().await, Mode::Ambient);

    let changes = Arc::new(Mutex::new(Vec::new()));
    let changes_for_handler = changes.clone();
    core.bus
        .subscribe::<ModeChanged, _, _>(topics::SYSTEM_MODE_CHANGED, "test", move |envelope| {
            let changes = changes_for_handler.clone();
            async move {
                changes.lock().await.push((envelope.body.from, envelope.body.to));
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    core.bus.publish(topics::SYSTEM_SET_MODE_REQUEST, cantina_mode::SetModeRequest { mode: Mode::Interactive, reason: None }).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let recorded = changes.lock().await.clone();
    assert_eq!(recorded, vec![(Mode::Ambient, Mode::Idle), (Mode::Idle, Mode::Interactive)]);

    core.shutdown().await.unwrap();
}

/// A minimal fake backend: completes TTS/crossfade requests the way the
/// real adapters eventually will, so the DJ/timeline flow can run to
/// completion in-process.
async fn install_fake_backend(bus: &Arc<cantina_bus::EventBus>) {
    let bus_for_commentary = bus.clone();
    bus.subscribe::<CommentaryRequestPayload, _, _>(topics::DJ_COMMENTARY_REQUEST, "fake_backend", move |envelope| {
        let bus = bus_for_commentary.clone();
        async move {
            let _ = bus.publish(
                topics::DJ_COMMENTARY_RESPONSE,
                CommentaryResponsePayload { speech_id: envelope.body.speech_id, text: "next up".to_string() },
            );
            Ok::<(), HandlerError>(())
        }
    })
    .unwrap();

    let bus_for_synth = bus.clone();
    bus.subscribe::<SynthesizeRequestPayload, _, _>(topics::TTS_SYNTHESIZE_REQUEST, "fake_backend", move |envelope| {
        let bus = bus_for_synth.clone();
        async move {
            let _ = bus.publish(topics::TTS_CACHE_READY, CacheReadyPayload { speech_id: envelope.body.speech_id });
            Ok::<(), HandlerError>(())
        }
    })
    .unwrap();

    let bus_for_speech = bus.clone();
    bus.subscribe::<PlayCachedSpeechRequestPayload, _, _>(topics::TTS_PLAY_CACHED_REQUEST, "fake_backend", move |envelope| {
        let bus = bus_for_speech.clone();
        async move {
            let _ = bus.publish(topics::SPEECH_PLAYBACK_COMPLETED, SpeechPlaybackCompletedPayload { speech_id: envelope.body.speech_id });
            Ok::<(), HandlerError>(())
        }
    })
    .unwrap();

    let bus_for_crossfade = bus.clone();
    bus.subscribe::<MusicCrossfadeRequestPayload, _, _>(topics::MUSIC_CROSSFADE_REQUEST, "fake_backend", move |envelope| {
        let bus = bus_for_crossfade.clone();
        async move {
            let _ = bus.publish(topics::AUDIO_CROSSFADE_COMPLETE, CrossfadeCompletePayload { plan_id: envelope.body.plan_id });
            Ok::<(), HandlerError>(())
        }
    })
    .unwrap();
}

#[tokio::test]
async fn scenario_4_dj_happy_path_transition_rotates_on_completion() {
    let core = wiring::start(&config()).await.unwrap();
    install_fake_backend(&core.bus).await;

    core.bus.publish(topics::DJ_COMMAND, DjCommandPayload { dj_mode_active: true, skip: false }).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(core.dj.phase().await, cantina_dj::Phase::Active);
    let first_track = core.dj.current_track_id().await.expect("a track should be selected");

    core.bus.publish(topics::DJ_TRACK_ENDING_SOON, TrackEndingSoonPayload { track_id: first_track.clone() }).unwrap();

    timeout(Duration::from_secs(3), async {
        loop {
            if core.dj.current_track_id().await.as_deref() != Some(first_track.as_str()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("the plan should complete and rotate the current track");

    assert_eq!(core.dj.phase().await, cantina_dj::Phase::Active);
    assert!(core.dj.history_contains(&first_track).await);

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn scenario_5_missing_cache_falls_back_to_crossfade_only_and_reports_skipped() {
    let core = wiring::start(&config()).await.unwrap();

    let bus_for_commentary = core.bus.clone();
    core.bus
        .subscribe::<CommentaryRequestPayload, _, _>(topics::DJ_COMMENTARY_REQUEST, "fake_backend_slow", move |_envelope| {
            let _bus = bus_for_commentary.clone();
            async move {
                // Never answers, so cache_ready is never set: the missing-cache
                // fallback has to run.
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    let bus_for_crossfade = core.bus.clone();
    core.bus
        .subscribe::<MusicCrossfadeRequestPayload, _, _>(topics::MUSIC_CROSSFADE_REQUEST, "fake_backend_slow", move |envelope| {
            let bus = bus_for_crossfade.clone();
            async move {
                let _ = bus.publish(topics::AUDIO_CROSSFADE_COMPLETE, CrossfadeCompletePayload { plan_id: envelope.body.plan_id });
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    let skipped = Arc::new(Mutex::new(None));
    let skipped_for_handler = skipped.clone();
    core.bus
        .subscribe::<CommentarySkippedPayload, _, _>(topics::DJ_COMMENTARY_SKIPPED, "test", move |envelope| {
            let skipped = skipped_for_handler.clone();
            async move {
                *skipped.lock().await = Some(envelope.body);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    core.bus.publish(topics::DJ_COMMAND, DjCommandPayload { dj_mode_active: true, skip: false }).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let first_track = core.dj.current_track_id().await.expect("a track should be selected");
    core.bus.publish(topics::DJ_TRACK_ENDING_SOON, TrackEndingSoonPayload { track_id: first_track }).unwrap();

    timeout(Duration::from_secs(3), async {
        loop {
            if skipped.lock().await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("commentary_skipped should fire once the 2s grace window elapses");

    assert!(skipped.lock().await.as_ref().unwrap().reason.contains("deadline"));

    core.shutdown().await.unwrap();
}

#[tokio::test]
async fn scenario_6_handler_isolation_lets_the_second_handler_run_despite_the_first_failing() {
    let core = wiring::start(&config()).await.unwrap();

    let first_ran = Arc::new(AtomicUsize::new(0));
    let first_ran_for_handler = first_ran.clone();
    core.bus
        .subscribe::<AudioDuckRequestedPayload, _, _>(topics::AUDIO_DUCK_REQUESTED, "failing_handler", move |_envelope| {
            first_ran_for_handler.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(HandlerError::Failed { service: "failing_handler".to_string(), message: "boom".to_string() })
            }
        })
        .unwrap();

    let second_ran = Arc::new(AtomicUsize::new(0));
    let second_ran_for_handler = second_ran.clone();
    core.bus
        .subscribe::<AudioDuckRequestedPayload, _, _>(topics::AUDIO_DUCK_REQUESTED, "ok_handler", move |_envelope| {
            second_ran_for_handler.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<(), HandlerError>(()) }
        })
        .unwrap();

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let statuses_for_handler = statuses.clone();
    core.bus
        .subscribe::<ServiceStatusPayload, _, _>(topics::SYSTEM_SERVICE_STATUS, "test", move |envelope| {
            let statuses = statuses_for_handler.clone();
            async move {
                statuses.lock().await.push(envelope.body);
                Ok::<(), HandlerError>(())
            }
        })
        .unwrap();

    core.bus.publish(topics::AUDIO_DUCK_REQUESTED, AudioDuckRequestedPayload { level: 0.4 }).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(first_ran.load(Ordering::SeqCst), 1);
    assert_eq!(second_ran.load(Ordering::SeqCst), 1);

    let failures: Vec<_> = statuses
        .lock()
        .await
        .iter()
        .filter(|s| s.kind == StatusKind::HandlerError && s.service == "failing_handler" && s.status == ServiceStatus::Error)
        .cloned()
        .collect();
    assert_eq!(failures.len(), 1);

    core.shutdown().await.unwrap();
}
