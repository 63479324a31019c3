//! The strategy seam between sessions and recognizer capacity.
//!
//! Sessions call [`RecognizerStrategy::recognize`] and never learn which
//! pooling approach backs it; the choice is an explicit configuration
//! decision made once at startup.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::RecognizeError;
use crate::pool::recognizer::RecognizerPool;
use crate::pool::shared::SharedRecognizer;
use crate::pool::PoolStats;
use crate::provider::Recognition;

/// A recognition plus how long inference took.
#[derive(Debug, Clone)]
pub struct TimedRecognition {
    pub recognition: Recognition,
    pub inference_duration_ms: u64,
}

#[async_trait]
pub trait RecognizerStrategy: Send + Sync + 'static {
    /// Runs one recognition, waiting at most `timeout` for capacity.
    async fn recognize(
        &self,
        samples: &[f32],
        timeout: Duration,
    ) -> Result<TimedRecognition, RecognizeError>;

    /// Pool occupancy, or `None` when the strategy has no pool to report.
    fn pool_stats(&self) -> Option<PoolStats>;
}

/// Exclusive-instance strategy backed by the fixed pool.
pub struct PooledStrategy {
    pool: RecognizerPool,
}

impl PooledStrategy {
    pub fn new(pool: RecognizerPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &RecognizerPool {
        &self.pool
    }
}

#[async_trait]
impl RecognizerStrategy for PooledStrategy {
    async fn recognize(
        &self,
        samples: &[f32],
        timeout: Duration,
    ) -> Result<TimedRecognition, RecognizeError> {
        let id = self
            .pool
            .acquire(timeout)
            .await
            .map_err(|_| RecognizeError::Exhausted(timeout))?;

        let recognizer = match self.pool.recognizer(id) {
            Ok(r) => r,
            Err(e) => {
                self.pool.release(id);
                return Err(RecognizeError::Provider(e.into()));
            }
        };

        let started = Instant::now();
        let outcome = recognizer.recognize(samples).await;
        // The instance goes back before the result is inspected, so a
        // provider failure never leaks a pool slot.
        self.pool.release(id);

        match outcome {
            Ok(recognition) => Ok(TimedRecognition {
                recognition,
                inference_duration_ms: started.elapsed().as_millis() as u64,
            }),
            Err(e) => Err(RecognizeError::Provider(e)),
        }
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        Some(self.pool.stats())
    }
}

/// Mutex-serialized single-instance strategy.
pub struct SharedStrategy {
    engine: SharedRecognizer,
}

impl SharedStrategy {
    pub fn new(engine: SharedRecognizer) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SharedRecognizer {
        &self.engine
    }
}

#[async_trait]
impl RecognizerStrategy for SharedStrategy {
    async fn recognize(
        &self,
        samples: &[f32],
        timeout: Duration,
    ) -> Result<TimedRecognition, RecognizeError> {
        self.engine.recognize(samples, timeout).await
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }
}
