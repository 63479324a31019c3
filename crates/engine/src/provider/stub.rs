//! Deterministic stub provider used by tests and the loadgen binary.
//!
//! The detector is a plain RMS-threshold VAD; the recognizer echoes how
//! much audio it saw. Together they let the full pool and session
//! machinery run end-to-end without any model files.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use streamscribe_config::{RecognizerSettings, VadSettings};

use super::{InferenceProvider, Recognition, Recognizer, SpeechSegment, VoiceDetector};

/// Factory for stub recognizers and detectors.
pub struct StubProvider {
    recognize_delay: Duration,
    vad_create_delay: Duration,
    recognizers_created: AtomicUsize,
    vads_created: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            recognize_delay: Duration::ZERO,
            vad_create_delay: Duration::ZERO,
            recognizers_created: AtomicUsize::new(0),
            vads_created: AtomicUsize::new(0),
        }
    }

    /// Adds artificial inference latency, for exercising contention.
    pub fn with_recognize_delay(delay: Duration) -> Self {
        Self {
            recognize_delay: delay,
            ..Self::new()
        }
    }

    /// Adds artificial VAD creation latency, for exercising the elastic
    /// pool's create-outside-the-lock path.
    pub fn with_vad_create_delay(delay: Duration) -> Self {
        Self {
            vad_create_delay: delay,
            ..Self::new()
        }
    }

    pub fn recognizers_created(&self) -> usize {
        self.recognizers_created.load(Ordering::SeqCst)
    }

    pub fn vads_created(&self) -> usize {
        self.vads_created.load(Ordering::SeqCst)
    }
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceProvider for StubProvider {
    async fn create_recognizer(
        &self,
        settings: &RecognizerSettings,
        num_threads: usize,
    ) -> anyhow::Result<Arc<dyn Recognizer>> {
        let id = self.recognizers_created.fetch_add(1, Ordering::SeqCst);
        debug!(id, num_threads, model = %settings.model, "stub recognizer created");
        Ok(Arc::new(StubRecognizer {
            language: settings.language.clone(),
            delay: self.recognize_delay,
        }))
    }

    async fn create_vad(&self, settings: &VadSettings) -> anyhow::Result<Box<dyn VoiceDetector>> {
        if !self.vad_create_delay.is_zero() {
            tokio::time::sleep(self.vad_create_delay).await;
        }
        let id = self.vads_created.fetch_add(1, Ordering::SeqCst);
        debug!(id, threshold = settings.threshold, "stub VAD created");
        Ok(Box::new(EnergyVad::new(settings)))
    }
}

/// Echo recognizer: reports how much audio it was given.
struct StubRecognizer {
    language: String,
    delay: Duration,
}

#[async_trait]
impl Recognizer for StubRecognizer {
    async fn recognize(&self, samples: &[f32]) -> anyhow::Result<Recognition> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if samples.is_empty() {
            return Ok(Recognition::default());
        }
        let text = format!("[stub: {} samples]", samples.len());
        Ok(Recognition {
            tokens: vec![text.clone()],
            timestamps: vec![0.0],
            text,
            language: self.language.clone(),
            emotion: "neutral".to_string(),
            event: "speech".to_string(),
        })
    }
}

/// RMS-threshold detector assembling completed segments.
///
/// Detection requires `min_speech` consecutive loud windows; a segment
/// closes after `min_silence` quiet windows or at the `max_speech` cap.
pub struct EnergyVad {
    threshold: f32,
    min_speech_windows: usize,
    min_silence_windows: usize,
    max_speech_samples: usize,

    active: bool,
    speech_run: usize,
    silence_run: usize,
    current: Vec<f32>,
    current_start: usize,
    stream_pos: usize,
    completed: VecDeque<SpeechSegment>,
}

impl EnergyVad {
    pub fn new(settings: &VadSettings) -> Self {
        let windows_per_sec = settings.sample_rate as f32 / settings.window_size as f32;
        let to_windows = |secs: f32| ((secs * windows_per_sec).ceil() as usize).max(1);
        Self {
            threshold: settings.threshold,
            min_speech_windows: to_windows(settings.min_speech_secs),
            min_silence_windows: to_windows(settings.min_silence_secs),
            max_speech_samples: to_windows(settings.max_speech_secs) * settings.window_size,
            active: false,
            speech_run: 0,
            silence_run: 0,
            current: Vec::new(),
            current_start: 0,
            stream_pos: 0,
            completed: VecDeque::new(),
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }

    fn close_segment(&mut self) {
        let samples = std::mem::take(&mut self.current);
        self.completed.push_back(SpeechSegment {
            start_sample: self.current_start,
            samples,
        });
        self.active = false;
        self.speech_run = 0;
        self.silence_run = 0;
    }
}

impl VoiceDetector for EnergyVad {
    fn accept_waveform(&mut self, window: &[f32]) -> anyhow::Result<()> {
        let pos = self.stream_pos;
        self.stream_pos += window.len();
        let loud = Self::rms(window) >= self.threshold;

        if self.active {
            self.current.extend_from_slice(window);
            if loud {
                self.silence_run = 0;
            } else {
                self.silence_run += 1;
            }
            if self.silence_run >= self.min_silence_windows
                || self.current.len() >= self.max_speech_samples
            {
                self.close_segment();
            }
            return Ok(());
        }

        if loud {
            if self.current.is_empty() {
                self.current_start = pos;
            }
            self.current.extend_from_slice(window);
            self.speech_run += 1;
            if self.speech_run >= self.min_speech_windows {
                self.active = true;
                self.silence_run = 0;
            }
        } else {
            // A run shorter than min_speech is discarded as noise.
            self.speech_run = 0;
            self.current.clear();
        }
        Ok(())
    }

    fn is_detected(&self) -> bool {
        self.active
    }

    fn has_completed_segment(&self) -> bool {
        !self.completed.is_empty()
    }

    fn pop_segment(&mut self) -> Option<SpeechSegment> {
        self.completed.pop_front()
    }

    fn reset(&mut self) {
        self.active = false;
        self.speech_run = 0;
        self.silence_run = 0;
        self.current.clear();
        self.completed.clear();
        self.stream_pos = 0;
    }
}
