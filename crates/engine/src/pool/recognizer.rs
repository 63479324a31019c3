//! Fixed-size pool of recognizer instances, each lent exclusively to one
//! caller at a time.
//!
//! Trades memory (N loaded models) for per-call latency: a checked-out
//! instance runs inference with no lock contention. Callers block on
//! acquire up to a per-call timeout; a timeout is a skipped recognition
//! opportunity, not a fault.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use streamscribe_config::RecognizerSettings;

use crate::error::{EngineError, PoolError};
use crate::pool::PoolStats;
use crate::provider::{InferenceProvider, Recognizer};

struct Slot {
    recognizer: Arc<dyn Recognizer>,
    in_use: bool,
    last_used: Instant,
}

struct PoolState {
    slots: Vec<Slot>,
    available: VecDeque<usize>,
}

pub struct RecognizerPool {
    state: Mutex<PoolState>,
    permits: Semaphore,
}

impl RecognizerPool {
    /// Pre-creates `pool_size` instances, dividing the configured thread
    /// budget across them. Any creation failure aborts startup.
    pub async fn initialize(
        provider: &dyn InferenceProvider,
        settings: &RecognizerSettings,
    ) -> Result<Self, EngineError> {
        let threads = settings.threads_per_instance();
        let mut slots = Vec::with_capacity(settings.pool_size);
        let mut available = VecDeque::with_capacity(settings.pool_size);

        for id in 0..settings.pool_size {
            info!(id, threads, "creating recognizer instance");
            let recognizer = provider
                .create_recognizer(settings, threads)
                .await
                .map_err(|source| EngineError::RecognizerInit { index: id, source })?;
            slots.push(Slot {
                recognizer,
                in_use: false,
                last_used: Instant::now(),
            });
            available.push_back(id);
        }

        info!(total = slots.len(), "recognizer pool initialized");
        Ok(Self {
            permits: Semaphore::new(slots.len()),
            state: Mutex::new(PoolState { slots, available }),
        })
    }

    /// Checks out an instance, blocking until one is free or `timeout`
    /// elapses.
    pub async fn acquire(&self, timeout: Duration) -> Result<usize, PoolError> {
        let permit = match tokio::time::timeout(timeout, self.permits.acquire()).await {
            Ok(permit) => permit.expect("recognizer pool semaphore closed"),
            Err(_) => {
                warn!(?timeout, "timed out waiting for a recognizer instance");
                return Err(PoolError::AcquireTimeout(timeout));
            }
        };
        // The permit is restored manually in release().
        permit.forget();

        let mut state = self.state.lock();
        let id = state
            .available
            .pop_front()
            .expect("semaphore permit issued without an available instance");
        let slot = &mut state.slots[id];
        slot.in_use = true;
        slot.last_used = Instant::now();
        debug!(id, available = state.available.len(), "acquired recognizer instance");
        Ok(id)
    }

    /// Returns an instance to the pool and wakes one waiter. Releasing an
    /// id that is not checked out is a logic error: logged and ignored,
    /// pool state untouched.
    pub fn release(&self, id: usize) {
        {
            let mut state = self.state.lock();
            match state.slots.get_mut(id) {
                None => {
                    warn!(id, "release of unknown recognizer instance ignored");
                    return;
                }
                Some(slot) if !slot.in_use => {
                    warn!(id, "release of recognizer instance that is not in use ignored");
                    return;
                }
                Some(slot) => {
                    let held_ms = slot.last_used.elapsed().as_millis() as u64;
                    slot.in_use = false;
                    slot.last_used = Instant::now();
                    debug!(id, held_ms, "released recognizer instance");
                }
            }
            state.available.push_back(id);
        }
        self.permits.add_permits(1);
    }

    /// The only sanctioned access to a pooled instance. Errors on ids
    /// that are unknown or not currently checked out. The handle is
    /// cloned out under the lock; the lock is never held across
    /// inference.
    pub fn recognizer(&self, id: usize) -> Result<Arc<dyn Recognizer>, PoolError> {
        let state = self.state.lock();
        let slot = state.slots.get(id).ok_or(PoolError::InvalidInstance(id))?;
        if !slot.in_use {
            return Err(PoolError::NotAcquired(id));
        }
        Ok(Arc::clone(&slot.recognizer))
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let total = state.slots.len();
        let available = state.available.len();
        PoolStats {
            total,
            available,
            in_use: total - available,
        }
    }
}
