use std::time::Duration;

use thiserror::Error;

/// Construction-time failures. These abort startup: the engine cannot
/// run without its inference capability.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to create recognizer instance {index}: {source}")]
    RecognizerInit {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to create VAD instance: {0}")]
    VadInit(#[source] anyhow::Error),
}

/// Failures of pool operations. `AcquireTimeout` is expected under
/// contention and callers treat it as a skipped opportunity, not a
/// fault.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no instance became available within {0:?}")]
    AcquireTimeout(Duration),

    #[error("unknown instance id {0}")]
    InvalidInstance(usize),

    #[error("instance {0} is not checked out")]
    NotAcquired(usize),

    #[error("failed to create instance: {0}")]
    Create(#[source] anyhow::Error),
}

/// Failures of one recognition attempt through a strategy.
#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("no recognizer available within {0:?}")]
    Exhausted(Duration),

    #[error("recognition failed: {0}")]
    Provider(#[source] anyhow::Error),
}

/// Failures surfaced to the collaborator that opens sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no VAD instance available for session: {0}")]
    VadUnavailable(#[source] PoolError),
}
