//! Composition root binding one recognizer strategy with the elastic
//! VAD pool, plus session-lifecycle counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tracing::info;

use streamscribe_config::{RecognizerStrategyKind, Settings};

use crate::error::EngineError;
use crate::pool::recognizer::RecognizerPool;
use crate::pool::shared::SharedRecognizer;
use crate::pool::strategy::{PooledStrategy, RecognizerStrategy, SharedStrategy};
use crate::pool::vad::VadPool;
use crate::pool::PoolStats;
use crate::provider::InferenceProvider;

/// Merged snapshot for periodic external reporting. Advisory telemetry,
/// never used for control decisions.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub active_sessions: usize,
    pub peak_sessions: usize,
    pub total_sessions: u64,
    /// `None` under the shared strategy.
    pub recognizer: Option<PoolStats>,
    pub vad: PoolStats,
    /// In-use over total VAD instances; 0.0 for an empty pool.
    pub memory_efficiency: f32,
}

pub struct PoolManager {
    recognizers: Arc<dyn RecognizerStrategy>,
    vad_pool: Arc<VadPool>,
    active_sessions: AtomicUsize,
    peak_sessions: AtomicUsize,
    total_sessions: AtomicU64,
}

impl PoolManager {
    /// Builds the configured recognizer strategy and the VAD pool. Any
    /// failure here is fatal: the service cannot run without inference.
    pub async fn initialize(
        provider: Arc<dyn InferenceProvider>,
        settings: &Settings,
    ) -> Result<Arc<Self>, EngineError> {
        let recognizers: Arc<dyn RecognizerStrategy> = match settings.recognizer.strategy {
            RecognizerStrategyKind::Pooled => {
                let pool = RecognizerPool::initialize(provider.as_ref(), &settings.recognizer).await?;
                Arc::new(PooledStrategy::new(pool))
            }
            RecognizerStrategyKind::Shared => {
                let engine =
                    SharedRecognizer::initialize(provider.as_ref(), &settings.recognizer).await?;
                Arc::new(SharedStrategy::new(engine))
            }
        };

        let vad_pool = Arc::new(
            VadPool::initialize(provider, settings.vad.clone(), &settings.vad_pool).await?,
        );

        info!(strategy = ?settings.recognizer.strategy, "pool manager initialized");
        Ok(Arc::new(Self {
            recognizers,
            vad_pool,
            active_sessions: AtomicUsize::new(0),
            peak_sessions: AtomicUsize::new(0),
            total_sessions: AtomicU64::new(0),
        }))
    }

    pub fn recognizers(&self) -> Arc<dyn RecognizerStrategy> {
        Arc::clone(&self.recognizers)
    }

    pub fn vad_pool(&self) -> Arc<VadPool> {
        Arc::clone(&self.vad_pool)
    }

    /// Registers a session start; the peak high-water mark is updated
    /// with an atomic max, race-free under concurrent increments.
    pub fn session_started(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        let active = self.active_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_sessions.fetch_max(active, Ordering::SeqCst);
    }

    pub fn session_ended(&self) {
        self.active_sessions.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn stats(&self) -> ManagerStats {
        let vad = self.vad_pool.stats();
        let memory_efficiency = if vad.total == 0 {
            0.0
        } else {
            vad.in_use as f32 / vad.total as f32
        };
        ManagerStats {
            active_sessions: self.active_sessions.load(Ordering::SeqCst),
            peak_sessions: self.peak_sessions.load(Ordering::SeqCst),
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            recognizer: self.recognizers.pool_stats(),
            vad,
            memory_efficiency,
        }
    }

    /// One structured line suitable for periodic reporting.
    pub fn log_stats(&self) {
        let s = self.stats();
        info!(
            active = s.active_sessions,
            peak = s.peak_sessions,
            total = s.total_sessions,
            vad_total = s.vad.total,
            vad_available = s.vad.available,
            vad_in_use = s.vad.in_use,
            memory_efficiency = s.memory_efficiency,
            "session stats"
        );
    }
}
