//! Resource pools multiplexing scarce inference instances across many
//! concurrent sessions.

pub mod manager;
pub mod recognizer;
pub mod shared;
pub mod strategy;
pub mod vad;

pub use manager::{ManagerStats, PoolManager};
pub use recognizer::RecognizerPool;
pub use shared::SharedRecognizer;
pub use strategy::{PooledStrategy, RecognizerStrategy, SharedStrategy, TimedRecognition};
pub use vad::VadPool;

use serde::Serialize;

/// Point-in-time pool occupancy, recomputed from live state on every
/// report and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub in_use: usize,
}
