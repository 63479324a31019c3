//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use streamscribe_config::{RecognizerSettings, Settings, VadSettings};
use streamscribe_engine::provider::stub::StubProvider;
use streamscribe_engine::provider::{InferenceProvider, Recognition, Recognizer, VoiceDetector};
use streamscribe_engine::session::{EventSink, SessionId, SessionStatus};
use streamscribe_engine::RecognitionResult;

/// Settings tuned for fast deterministic tests: 256-sample windows,
/// detection after one loud window, segment close after three quiet
/// ones, partials on every processing pass during speech.
pub fn test_settings() -> Settings {
    Settings {
        vad: VadSettings {
            window_size: 256,
            threshold: 0.2,
            min_speech_secs: 0.016,  // 1 window at 256/16k
            min_silence_secs: 0.048, // 3 windows
            ..VadSettings::default()
        },
        recognizer: RecognizerSettings {
            acquire_timeout_ms: 1000,
            ..RecognizerSettings::default()
        },
        vad_pool: streamscribe_config::VadPoolSettings {
            acquire_timeout_ms: 250,
            ..Default::default()
        },
        streaming: streamscribe_config::StreamingSettings {
            partial_interval_ms: 0,
            ..Default::default()
        },
    }
}

/// PCM16 square wave at the given amplitude, `windows` windows long.
pub fn pcm_bytes(amplitude: f32, windows: usize, window_size: usize) -> Vec<u8> {
    let value = (amplitude * 32767.0) as i16;
    let mut bytes = Vec::with_capacity(windows * window_size * 2);
    for i in 0..windows * window_size {
        let sample = if i % 2 == 0 { value } else { -value };
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

pub fn speech_bytes(windows: usize, window_size: usize) -> Vec<u8> {
    pcm_bytes(0.5, windows, window_size)
}

pub fn silence_bytes(windows: usize, window_size: usize) -> Vec<u8> {
    pcm_bytes(0.0, windows, window_size)
}

/// Extracts N from the stub recognizer's "[stub: N samples]" output.
pub fn stub_sample_count(text: &str) -> Option<usize> {
    text.strip_prefix("[stub: ")?
        .strip_suffix(" samples]")?
        .parse()
        .ok()
}

/// Polls `cond` until it holds or `deadline_ms` elapses.
pub async fn wait_until(deadline_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

#[derive(Debug, Clone)]
pub enum SinkEvent {
    Result(RecognitionResult),
    Status(SessionStatus),
    Error(String),
}

/// Event sink that records everything for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn results(&self) -> Vec<RecognitionResult> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Result(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn finals(&self) -> Vec<RecognitionResult> {
        self.results().into_iter().filter(|r| r.finished).collect()
    }

    pub fn partials(&self) -> Vec<RecognitionResult> {
        self.results().into_iter().filter(|r| !r.finished).collect()
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Status(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Error(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn on_result(&self, _session: SessionId, result: &RecognitionResult) {
        self.events.lock().push(SinkEvent::Result(result.clone()));
    }

    fn on_status(&self, _session: SessionId, status: SessionStatus) {
        self.events.lock().push(SinkEvent::Status(status));
    }

    fn on_error(&self, _session: SessionId, message: &str) {
        self.events.lock().push(SinkEvent::Error(message.to_string()));
    }
}

/// Provider whose recognizers fail a configured number of calls before
/// delegating to the stub. VAD creation delegates unchanged.
pub struct FlakyProvider {
    inner: StubProvider,
    fail_remaining: Arc<AtomicUsize>,
}

impl FlakyProvider {
    pub fn failing(times: usize) -> Self {
        Self {
            inner: StubProvider::new(),
            fail_remaining: Arc::new(AtomicUsize::new(times)),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(usize::MAX)
    }
}

#[async_trait]
impl InferenceProvider for FlakyProvider {
    async fn create_recognizer(
        &self,
        settings: &RecognizerSettings,
        num_threads: usize,
    ) -> anyhow::Result<Arc<dyn Recognizer>> {
        let inner = self.inner.create_recognizer(settings, num_threads).await?;
        Ok(Arc::new(FlakyRecognizer {
            inner,
            fail_remaining: Arc::clone(&self.fail_remaining),
        }))
    }

    async fn create_vad(&self, settings: &VadSettings) -> anyhow::Result<Box<dyn VoiceDetector>> {
        self.inner.create_vad(settings).await
    }
}

struct FlakyRecognizer {
    inner: Arc<dyn Recognizer>,
    fail_remaining: Arc<AtomicUsize>,
}

#[async_trait]
impl Recognizer for FlakyRecognizer {
    async fn recognize(&self, samples: &[f32]) -> anyhow::Result<Recognition> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
            }
            anyhow::bail!("injected recognizer failure");
        }
        self.inner.recognize(samples).await
    }
}
