pub mod audio;
pub mod error;
pub mod pool;
pub mod provider;
pub mod session;

pub use error::{EngineError, PoolError, RecognizeError, SessionError};
pub use pool::{ManagerStats, PoolManager, PoolStats, RecognizerStrategy};
pub use provider::{InferenceProvider, Recognition, Recognizer, SpeechSegment, VoiceDetector};
pub use session::{EventSink, Session, SessionId, SessionKind, SessionStatus};

use serde::{Deserialize, Serialize};

/// A transcription result emitted to the session's event sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    /// `true` for a completed segment or end-of-stream, `false` for a
    /// periodic partial during ongoing speech.
    pub finished: bool,
    /// Monotonically non-decreasing per session; advances exactly once
    /// per completed segment. Partials carry the index of the segment
    /// they belong to.
    pub sequence_index: u32,
    pub language: String,
    pub emotion: String,
    pub event: String,
    /// Per-token timestamps in seconds, when the model provides them.
    pub timestamps: Vec<f32>,
    pub tokens: Vec<String>,
    /// How long inference took in milliseconds.
    pub inference_duration_ms: u64,
}
