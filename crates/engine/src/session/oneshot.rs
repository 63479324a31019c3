//! One-shot session: buffer a whole utterance between `start` and
//! `stop` control messages, then recognize it in a single call.
//!
//! The state machine is strictly linear (WaitingStart, Recording,
//! Processing, Finished, in that order) and commands received outside
//! their valid state are rejected without a transition.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use streamscribe_config::Settings;

use crate::audio::pcm16le_to_f32;
use crate::error::RecognizeError;
use crate::pool::manager::PoolManager;
use crate::pool::strategy::RecognizerStrategy;
use crate::session::{EventSink, SessionId, SessionPhase, SessionStatus};
use crate::RecognitionResult;

struct OneShotState {
    phase: SessionPhase,
    buffer: Vec<f32>,
}

pub struct OneShotSession {
    id: SessionId,
    manager: Arc<PoolManager>,
    recognizers: Arc<dyn RecognizerStrategy>,
    sink: Arc<dyn EventSink>,
    recognize_timeout: Duration,
    state: Mutex<OneShotState>,
    ended: AtomicBool,
}

impl OneShotSession {
    /// Registers the session and reports readiness.
    pub fn start(
        id: SessionId,
        manager: Arc<PoolManager>,
        settings: &Settings,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        manager.session_started();
        info!(session = %id, "one-shot session started");

        let session = Self {
            id,
            recognizers: manager.recognizers(),
            manager,
            sink,
            recognize_timeout: settings.recognizer.acquire_timeout(),
            state: Mutex::new(OneShotState {
                phase: SessionPhase::WaitingStart,
                buffer: Vec::new(),
            }),
            ended: AtomicBool::new(false),
        };
        session.sink.on_status(id, SessionStatus::Ready);
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Dispatches a control message from the transport collaborator.
    pub async fn submit_control(&self, command: &str) {
        match command.trim() {
            "start" => self.handle_start(),
            "stop" => self.handle_stop().await,
            other => {
                warn!(session = %self.id, command = other, "unknown control command");
                self.sink
                    .on_error(self.id, &format!("unknown command: {other}"));
            }
        }
    }

    /// Buffers audio only while recording; anything else is dropped.
    pub fn submit_audio(&self, bytes: &[u8]) {
        let mut state = self.state.lock();
        if state.phase != SessionPhase::Recording {
            return;
        }
        let samples = pcm16le_to_f32(bytes);
        state.buffer.extend_from_slice(&samples);
        debug!(
            session = %self.id,
            added = samples.len(),
            total = state.buffer.len(),
            "buffered audio"
        );
    }

    /// Terminal teardown; safe to call more than once.
    pub fn stop(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.lock().phase = SessionPhase::Finished;
        self.manager.session_ended();
        info!(session = %self.id, "one-shot session ended");
    }

    fn handle_start(&self) {
        {
            let mut state = self.state.lock();
            if state.phase != SessionPhase::WaitingStart {
                drop(state);
                warn!(session = %self.id, "start command in invalid state");
                self.sink.on_error(self.id, "invalid state for start command");
                return;
            }
            state.buffer.clear();
            state.phase = SessionPhase::Recording;
        }
        info!(session = %self.id, "recording started");
        self.sink.on_status(self.id, SessionStatus::Recording);
    }

    /// Runs recognition over the whole buffered utterance, synchronously
    /// on the task that delivered the command.
    async fn handle_stop(&self) {
        let samples = {
            let mut state = self.state.lock();
            if state.phase != SessionPhase::Recording {
                drop(state);
                warn!(session = %self.id, "stop command in invalid state");
                self.sink.on_error(self.id, "invalid state for stop command");
                return;
            }
            state.phase = SessionPhase::Processing;
            std::mem::take(&mut state.buffer)
        };
        self.sink.on_status(self.id, SessionStatus::Processing);

        if samples.is_empty() {
            warn!(session = %self.id, "no audio data to process");
            self.sink.on_error(self.id, "no audio data received");
            return;
        }

        info!(session = %self.id, samples = samples.len(), "processing recorded audio");
        match self.recognizers.recognize(&samples, self.recognize_timeout).await {
            Ok(timed) if timed.recognition.text.is_empty() => {
                self.sink.on_error(self.id, "recognition produced no result");
            }
            Ok(timed) => {
                let r = timed.recognition;
                let result = RecognitionResult {
                    text: r.text,
                    finished: true,
                    sequence_index: 0,
                    language: r.language,
                    emotion: r.emotion,
                    event: r.event,
                    timestamps: r.timestamps,
                    tokens: r.tokens,
                    inference_duration_ms: timed.inference_duration_ms,
                };
                info!(session = %self.id, text = %result.text, "recognition completed");
                self.sink.on_result(self.id, &result);
                self.state.lock().phase = SessionPhase::Finished;
                self.sink.on_status(self.id, SessionStatus::Finished);
            }
            Err(RecognizeError::Exhausted(timeout)) => {
                warn!(session = %self.id, ?timeout, "no recognizer available for one-shot session");
                self.sink.on_error(self.id, "no recognizer available, try again");
            }
            Err(e) => {
                warn!(session = %self.id, "recognition failed: {e}");
                self.sink.on_error(self.id, &format!("recognition failed: {e}"));
            }
        }
    }
}

impl Drop for OneShotSession {
    fn drop(&mut self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.manager.session_ended();
        }
    }
}
