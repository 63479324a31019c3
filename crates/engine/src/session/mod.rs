//! Per-connection sessions: the streaming state machine and the
//! one-shot state machine behind one common surface.

pub mod oneshot;
pub mod streaming;

pub use oneshot::OneShotSession;
pub use streaming::StreamingSession;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use streamscribe_config::Settings;

use crate::error::SessionError;
use crate::pool::manager::PoolManager;
use crate::RecognitionResult;

/// Correlation id attached to every event and log line for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle notices sent to the transport collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Ready,
    Recording,
    Processing,
    Finished,
}

/// One-shot session phases; transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    WaitingStart,
    Recording,
    Processing,
    Finished,
}

/// Callback surface owned by the transport collaborator. Invoked from
/// session worker tasks, so implementations must be thread-safe.
pub trait EventSink: Send + Sync + 'static {
    fn on_result(&self, session: SessionId, result: &RecognitionResult);
    fn on_status(&self, session: SessionId, status: SessionStatus);
    fn on_error(&self, session: SessionId, message: &str);
}

/// Which state machine backs a connection; chosen once at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Streaming,
    OneShot,
}

/// A connection's session, behind one surface regardless of kind.
pub enum Session {
    Streaming(StreamingSession),
    OneShot(OneShotSession),
}

impl Session {
    /// Opens a session of the requested kind against the shared pools.
    pub async fn open(
        kind: SessionKind,
        manager: Arc<PoolManager>,
        settings: &Settings,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, SessionError> {
        let id = SessionId::new();
        match kind {
            SessionKind::Streaming => Ok(Self::Streaming(
                StreamingSession::start(id, manager, settings, sink).await?,
            )),
            SessionKind::OneShot => {
                Ok(Self::OneShot(OneShotSession::start(id, manager, settings, sink)))
            }
        }
    }

    pub fn id(&self) -> SessionId {
        match self {
            Session::Streaming(s) => s.id(),
            Session::OneShot(s) => s.id(),
        }
    }

    pub async fn submit_audio(&self, bytes: &[u8]) {
        match self {
            Session::Streaming(s) => s.submit_audio(bytes).await,
            Session::OneShot(s) => s.submit_audio(bytes),
        }
    }

    /// Control messages only make sense for one-shot sessions; a
    /// streaming session reports a protocol error and keeps its state.
    pub async fn submit_control(&self, command: &str) {
        match self {
            Session::Streaming(s) => s.reject_control(command),
            Session::OneShot(s) => s.submit_control(command).await,
        }
    }

    pub async fn stop(&self) {
        match self {
            Session::Streaming(s) => s.stop().await,
            Session::OneShot(s) => s.stop(),
        }
    }
}
