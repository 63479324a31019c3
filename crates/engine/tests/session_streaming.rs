//! Streaming-session state machine properties, driven end-to-end
//! through the public session surface against the stub provider.

mod common;

use std::sync::Arc;
use std::time::Duration;

use streamscribe_config::Settings;
use streamscribe_engine::pool::PoolManager;
use streamscribe_engine::provider::stub::StubProvider;
use streamscribe_engine::provider::InferenceProvider;
use streamscribe_engine::session::{Session, SessionKind};
use streamscribe_engine::SessionError;

use common::{
    silence_bytes, speech_bytes, stub_sample_count, test_settings, wait_until, FlakyProvider,
    RecordingSink, SinkEvent,
};

async fn open_streaming(
    settings: &Settings,
    provider: Arc<dyn InferenceProvider>,
) -> (Session, Arc<RecordingSink>, Arc<PoolManager>) {
    let manager = PoolManager::initialize(provider, settings).await.unwrap();
    let sink = RecordingSink::new();
    let session = Session::open(
        SessionKind::Streaming,
        Arc::clone(&manager),
        settings,
        sink.clone(),
    )
    .await
    .unwrap();
    (session, sink, manager)
}

#[tokio::test]
async fn idle_silence_keeps_rolling_buffer_bounded() {
    let settings = test_settings();
    let window = settings.vad.window_size;
    let (session, sink, _manager) =
        open_streaming(&settings, Arc::new(StubProvider::new())).await;

    // Fifty windows of silence, ten per chunk: far beyond the ten-window
    // idle cap.
    for _ in 0..5 {
        session.submit_audio(&silence_bytes(10, window)).await;
    }
    // Speech triggers a partial over the entire remaining buffer.
    session.submit_audio(&speech_bytes(5, window)).await;

    assert!(wait_until(2000, || !sink.partials().is_empty()).await);
    session.stop().await;

    let partial = &sink.partials()[0];
    let samples = stub_sample_count(&partial.text).unwrap();
    // At most ten trimmed silence windows plus the five speech windows;
    // without trimming this would be 55 windows.
    assert!(samples <= 15 * window, "buffer grew unbounded: {samples}");
    assert!(samples >= 5 * window);
}

#[tokio::test]
async fn partials_precede_finals_and_indices_increase() {
    let settings = test_settings();
    let window = settings.vad.window_size;
    let (session, sink, _manager) =
        open_streaming(&settings, Arc::new(StubProvider::new())).await;

    // Two utterances, each closed by a run of silence.
    session.submit_audio(&speech_bytes(8, window)).await;
    assert!(wait_until(2000, || !sink.partials().is_empty()).await);
    session.submit_audio(&silence_bytes(4, window)).await;
    assert!(wait_until(2000, || sink.finals().len() == 1).await);

    session.submit_audio(&speech_bytes(8, window)).await;
    session.submit_audio(&silence_bytes(4, window)).await;
    assert!(wait_until(2000, || sink.finals().len() == 2).await);

    session.stop().await;

    let finals = sink.finals();
    assert_eq!(finals[0].sequence_index, 0);
    assert_eq!(finals[1].sequence_index, 1);

    // Event order: at least one partial for the first segment arrives
    // before that segment's final, and it carries the same index.
    let events = sink.events();
    let first_final_pos = events
        .iter()
        .position(|e| matches!(e, SinkEvent::Result(r) if r.finished))
        .unwrap();
    let first_partial_pos = events
        .iter()
        .position(|e| matches!(e, SinkEvent::Result(r) if !r.finished))
        .unwrap();
    assert!(first_partial_pos < first_final_pos);

    for partial in sink.partials() {
        assert!(partial.sequence_index <= 1);
    }
}

#[tokio::test]
async fn stop_is_idempotent_and_silences_callbacks() {
    let settings = test_settings();
    let window = settings.vad.window_size;
    let (session, sink, _manager) =
        open_streaming(&settings, Arc::new(StubProvider::new())).await;

    session.submit_audio(&speech_bytes(8, window)).await;
    assert!(wait_until(2000, || !sink.results().is_empty()).await);

    session.stop().await;
    let seen = sink.len();

    // Audio after stop is dropped; a second stop is a no-op.
    session.submit_audio(&speech_bytes(8, window)).await;
    session.stop().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(sink.len(), seen);
}

#[tokio::test]
async fn refuses_to_start_without_a_vad_instance() {
    let mut settings = test_settings();
    settings.vad_pool.min_size = 1;
    settings.vad_pool.max_size = 1;
    settings.vad_pool.acquire_timeout_ms = 100;

    let manager = PoolManager::initialize(Arc::new(StubProvider::new()), &settings)
        .await
        .unwrap();

    let sink = RecordingSink::new();
    let first = Session::open(
        SessionKind::Streaming,
        Arc::clone(&manager),
        &settings,
        sink.clone(),
    )
    .await
    .unwrap();
    assert_eq!(manager.stats().vad.in_use, 1);

    // The only detector is taken: the second session must refuse.
    let second = Session::open(
        SessionKind::Streaming,
        Arc::clone(&manager),
        &settings,
        RecordingSink::new(),
    )
    .await;
    assert!(matches!(second, Err(SessionError::VadUnavailable(_))));
    assert_eq!(manager.stats().active_sessions, 1);

    // Stopping the first session returns its detector to the pool.
    first.stop().await;
    assert_eq!(manager.stats().vad.in_use, 0);
    assert_eq!(manager.stats().active_sessions, 0);

    let third = Session::open(
        SessionKind::Streaming,
        Arc::clone(&manager),
        &settings,
        RecordingSink::new(),
    )
    .await;
    assert!(third.is_ok());
}

#[tokio::test]
async fn failed_final_recognition_still_advances_sequence_index() {
    let mut settings = test_settings();
    // No partials: every recognize call belongs to a final.
    settings.streaming.partial_interval_ms = 600_000;
    let window = settings.vad.window_size;

    let (session, sink, _manager) =
        open_streaming(&settings, Arc::new(FlakyProvider::failing(1))).await;

    // First utterance: recognition fails, nothing is emitted, but the
    // segment still consumes index 0.
    session.submit_audio(&speech_bytes(8, window)).await;
    session.submit_audio(&silence_bytes(4, window)).await;

    // Second utterance succeeds.
    session.submit_audio(&speech_bytes(8, window)).await;
    session.submit_audio(&silence_bytes(4, window)).await;

    assert!(wait_until(2000, || sink.finals().len() == 1).await);
    session.stop().await;

    let finals = sink.finals();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].sequence_index, 1);
    // Provider failures are absorbed, not surfaced as session errors.
    assert!(sink.errors().is_empty());
}

#[tokio::test]
async fn control_messages_are_rejected_without_breaking_the_stream() {
    let settings = test_settings();
    let window = settings.vad.window_size;
    let (session, sink, _manager) =
        open_streaming(&settings, Arc::new(StubProvider::new())).await;

    session.submit_control("start").await;
    assert_eq!(sink.errors().len(), 1);
    assert!(sink.errors()[0].contains("unexpected control message"));

    // The session keeps processing audio afterwards.
    session.submit_audio(&speech_bytes(8, window)).await;
    assert!(wait_until(2000, || !sink.results().is_empty()).await);
    session.stop().await;
}
