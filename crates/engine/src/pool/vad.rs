//! Elastic pool of VAD instances.
//!
//! Avoids pre-creating a detector per potential session while still
//! amortizing creation cost: a warm floor of `min_size` instances is
//! created eagerly, the pool grows on demand up to `max_size`, and
//! surplus instances returned to a full queue are discarded so
//! steady-state memory tracks live concurrency rather than the
//! historical peak.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use streamscribe_config::{VadPoolSettings, VadSettings};

use crate::error::{EngineError, PoolError};
use crate::pool::PoolStats;
use crate::provider::{InferenceProvider, VoiceDetector};

struct VadState {
    available: VecDeque<Box<dyn VoiceDetector>>,
    /// Instances alive or reserved for creation.
    total: usize,
}

pub struct VadPool {
    provider: Arc<dyn InferenceProvider>,
    vad_settings: VadSettings,
    max_size: usize,
    state: Mutex<VadState>,
    returned: Notify,
}

impl VadPool {
    /// Eagerly creates the warm floor of `min_size` instances. Creation
    /// failure at this point aborts startup.
    pub async fn initialize(
        provider: Arc<dyn InferenceProvider>,
        vad_settings: VadSettings,
        pool_settings: &VadPoolSettings,
    ) -> Result<Self, EngineError> {
        let mut available = VecDeque::with_capacity(pool_settings.min_size);
        for _ in 0..pool_settings.min_size {
            let vad = provider
                .create_vad(&vad_settings)
                .await
                .map_err(EngineError::VadInit)?;
            available.push_back(vad);
        }

        info!(
            min = pool_settings.min_size,
            max = pool_settings.max_size,
            "VAD pool initialized"
        );
        Ok(Self {
            provider,
            vad_settings,
            max_size: pool_settings.max_size,
            state: Mutex::new(VadState {
                total: pool_settings.min_size,
                available,
            }),
            returned: Notify::new(),
        })
    }

    /// Takes an instance: from the queue when one is idle, freshly
    /// created when the pool may still grow, otherwise by waiting up to
    /// `timeout` for a release.
    pub async fn acquire(&self, timeout: Duration) -> Result<Box<dyn VoiceDetector>, PoolError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let grow = {
                let mut state = self.state.lock();
                if let Some(vad) = state.available.pop_front() {
                    debug!(
                        available = state.available.len(),
                        total = state.total,
                        "acquired pooled VAD instance"
                    );
                    return Ok(vad);
                }
                if state.total < self.max_size {
                    // Reserve the slot now; the slow creation happens
                    // outside the lock.
                    state.total += 1;
                    true
                } else {
                    false
                }
            };

            if grow {
                match self.provider.create_vad(&self.vad_settings).await {
                    Ok(vad) => {
                        // A grown instance goes straight to the caller,
                        // never through the queue.
                        info!(total = self.state.lock().total, "created VAD instance on demand");
                        return Ok(vad);
                    }
                    Err(e) => {
                        self.state.lock().total -= 1;
                        self.returned.notify_one();
                        return Err(PoolError::Create(e));
                    }
                }
            }

            let notified = self.returned.notified();
            // An instance may have come back between unlock and here.
            {
                let mut state = self.state.lock();
                if let Some(vad) = state.available.pop_front() {
                    return Ok(vad);
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                warn!(?timeout, "timed out waiting for a VAD instance");
                return Err(PoolError::AcquireTimeout(timeout));
            }
        }
    }

    /// Returns an instance. Detection state is cleared before the
    /// instance can reach another session; a queue already at `max_size`
    /// means the instance is surplus and is dropped instead.
    pub fn release(&self, mut vad: Box<dyn VoiceDetector>) {
        vad.reset();
        let mut state = self.state.lock();
        if state.available.len() >= self.max_size {
            state.total = state.total.saturating_sub(1);
            debug!(total = state.total, "discarded surplus VAD instance");
            return;
        }
        state.available.push_back(vad);
        debug!(
            available = state.available.len(),
            total = state.total,
            "released VAD instance"
        );
        drop(state);
        self.returned.notify_one();
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            total: state.total,
            available: state.available.len(),
            in_use: state.total.saturating_sub(state.available.len()),
        }
    }
}
