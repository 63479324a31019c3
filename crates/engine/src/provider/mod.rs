//! The inference-provider capability consumed by the engine.
//!
//! The engine treats the provider as opaque: possibly slow, possibly
//! failing. Model loading and tensor execution live behind these traits;
//! the engine only schedules access to them.

pub mod stub;

use std::sync::Arc;

use async_trait::async_trait;

use streamscribe_config::{RecognizerSettings, VadSettings};

/// A complete speech span identified by the VAD, start-of-speech to
/// end-of-speech. Consumed exactly once by the session that owns the
/// detector.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    /// Index of the first sample, relative to the detector's stream.
    pub start_sample: usize,
    pub samples: Vec<f32>,
}

/// Raw provider output for one recognize call.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    pub text: String,
    pub language: String,
    pub emotion: String,
    pub event: String,
    pub timestamps: Vec<f32>,
    pub tokens: Vec<String>,
}

/// A loaded recognition model instance.
#[async_trait]
pub trait Recognizer: Send + Sync + 'static {
    /// Transcribes a buffer of normalized mono samples.
    async fn recognize(&self, samples: &[f32]) -> anyhow::Result<Recognition>;
}

/// Stateful windowed voice-activity detector.
///
/// Feed fixed-size windows through [`accept_waveform`](Self::accept_waveform);
/// the detector reports whether speech is currently present and queues
/// completed segments for retrieval.
pub trait VoiceDetector: Send + 'static {
    fn accept_waveform(&mut self, window: &[f32]) -> anyhow::Result<()>;

    /// Whether speech is currently present in the stream.
    fn is_detected(&self) -> bool;

    fn has_completed_segment(&self) -> bool;

    fn pop_segment(&mut self) -> Option<SpeechSegment>;

    /// Clears all detection state. Called before an instance is recycled
    /// into the pool so no speech state leaks across sessions.
    fn reset(&mut self);
}

/// Factory for recognizer and detector instances.
#[async_trait]
pub trait InferenceProvider: Send + Sync + 'static {
    /// Creates one recognizer instance. `num_threads` is the per-instance
    /// share of the configured total, sized by the caller.
    async fn create_recognizer(
        &self,
        settings: &RecognizerSettings,
        num_threads: usize,
    ) -> anyhow::Result<Arc<dyn Recognizer>>;

    async fn create_vad(&self, settings: &VadSettings) -> anyhow::Result<Box<dyn VoiceDetector>>;
}
