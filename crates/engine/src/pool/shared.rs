//! Single recognizer instance with mutex-serialized access.
//!
//! The alternative to the fixed pool: one loaded model, so inference
//! calls cannot overlap. Appropriate when model memory dominates compute
//! cost or only light concurrency is expected.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

use streamscribe_config::RecognizerSettings;

use crate::error::{EngineError, RecognizeError};
use crate::pool::strategy::TimedRecognition;
use crate::provider::{InferenceProvider, Recognizer};

pub struct SharedRecognizer {
    recognizer: Arc<dyn Recognizer>,
    /// Serializes recognitions; held for the full call on purpose.
    gate: Mutex<()>,
    /// Observability only: access is fully serialized, so this reads 0
    /// or 1 at any sampled instant.
    active_recognitions: AtomicUsize,
}

impl SharedRecognizer {
    /// Creates the single instance with the full thread budget.
    pub async fn initialize(
        provider: &dyn InferenceProvider,
        settings: &RecognizerSettings,
    ) -> Result<Self, EngineError> {
        info!(threads = settings.num_threads, "creating shared recognizer");
        let recognizer = provider
            .create_recognizer(settings, settings.num_threads)
            .await
            .map_err(|source| EngineError::RecognizerInit { index: 0, source })?;
        Ok(Self {
            recognizer,
            gate: Mutex::new(()),
            active_recognitions: AtomicUsize::new(0),
        })
    }

    /// Runs one recognition under the engine lock. Waiting for the lock
    /// counts against `timeout`; the inference itself does not.
    pub async fn recognize(
        &self,
        samples: &[f32],
        timeout: Duration,
    ) -> Result<TimedRecognition, RecognizeError> {
        let waited = Instant::now();
        let _guard = tokio::time::timeout(timeout, self.gate.lock())
            .await
            .map_err(|_| RecognizeError::Exhausted(timeout))?;
        let wait_ms = waited.elapsed().as_millis() as u64;
        if wait_ms > 0 {
            debug!(wait_ms, "recognition waited for the shared engine");
        }

        self.active_recognitions.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let outcome = self.recognizer.recognize(samples).await;
        self.active_recognitions.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(recognition) => Ok(TimedRecognition {
                recognition,
                inference_duration_ms: started.elapsed().as_millis() as u64,
            }),
            Err(e) => Err(RecognizeError::Provider(e)),
        }
    }

    pub fn active_recognitions(&self) -> usize {
        self.active_recognitions.load(Ordering::SeqCst)
    }
}
