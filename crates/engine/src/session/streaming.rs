//! Streaming session: a dedicated worker task per connection that
//! windows incoming audio through a session-owned VAD instance and runs
//! partial and final recognitions against the shared strategy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use streamscribe_config::Settings;

use crate::audio::{pcm16le_to_f32, RollingBuffer};
use crate::error::{RecognizeError, SessionError};
use crate::pool::manager::PoolManager;
use crate::pool::strategy::{RecognizerStrategy, TimedRecognition};
use crate::pool::vad::VadPool;
use crate::provider::{SpeechSegment, VoiceDetector};
use crate::session::{EventSink, SessionId};
use crate::RecognitionResult;

pub struct StreamingSession {
    id: SessionId,
    sink: Arc<dyn EventSink>,
    audio_tx: mpsc::Sender<Vec<f32>>,
    stop_signal: Arc<Notify>,
    stopped: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingSession {
    /// Acquires a dedicated VAD instance and spawns the worker. A pool
    /// timeout means the session refuses to start.
    pub async fn start(
        id: SessionId,
        manager: Arc<PoolManager>,
        settings: &Settings,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, SessionError> {
        let vad = manager
            .vad_pool()
            .acquire(settings.vad_pool.acquire_timeout())
            .await
            .map_err(|e| {
                warn!(session = %id, "refusing to start streaming session: {e}");
                SessionError::VadUnavailable(e)
            })?;

        let (audio_tx, audio_rx) = mpsc::channel(settings.streaming.queue_capacity);
        let stop_signal = Arc::new(Notify::new());

        manager.session_started();
        info!(session = %id, "streaming session started");

        let worker = SessionWorker {
            id,
            sink: Arc::clone(&sink),
            recognizers: manager.recognizers(),
            vad_pool: manager.vad_pool(),
            manager,
            vad,
            buffer: RollingBuffer::new(),
            speech_active: false,
            segment_index: 0,
            last_partial: Instant::now(),
            window_size: settings.vad.window_size,
            idle_buffer_windows: settings.streaming.idle_buffer_windows,
            partial_interval: settings.streaming.partial_interval(),
            recognize_timeout: settings.recognizer.acquire_timeout(),
            started_at: Instant::now(),
            processed_samples: 0,
            processed_segments: 0,
        };

        let handle = tokio::spawn(worker.run(audio_rx, Arc::clone(&stop_signal)));

        Ok(Self {
            id,
            sink,
            audio_tx,
            stop_signal,
            stopped: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Converts PCM16 bytes and queues them for the worker. Ignored
    /// after stop; a full queue applies backpressure to the caller.
    pub async fn submit_audio(&self, bytes: &[u8]) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let samples = pcm16le_to_f32(bytes);
        if samples.is_empty() {
            return;
        }
        if self.audio_tx.send(samples).await.is_err() {
            debug!(session = %self.id, "audio dropped: session worker has exited");
        }
    }

    /// Streaming sessions accept no control messages.
    pub fn reject_control(&self, command: &str) {
        warn!(session = %self.id, command, "control message on streaming session");
        self.sink
            .on_error(self.id, &format!("unexpected control message: {command}"));
    }

    /// Idempotent: the first caller signals the worker and waits for it
    /// to exit, so no further callback fires once `stop` returns.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(session = %self.id, "stopping streaming session");
        self.stop_signal.notify_one();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(session = %self.id, "session worker join failed: {e}");
            }
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        // A dropped-but-never-stopped session still wakes its worker so
        // the VAD instance goes back to the pool exactly once.
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.stop_signal.notify_one();
        }
    }
}

struct SessionWorker {
    id: SessionId,
    sink: Arc<dyn EventSink>,
    recognizers: Arc<dyn RecognizerStrategy>,
    vad_pool: Arc<VadPool>,
    manager: Arc<PoolManager>,
    vad: Box<dyn VoiceDetector>,
    buffer: RollingBuffer,
    speech_active: bool,
    segment_index: u32,
    last_partial: Instant,
    window_size: usize,
    idle_buffer_windows: usize,
    partial_interval: Duration,
    recognize_timeout: Duration,
    started_at: Instant,
    processed_samples: u64,
    processed_segments: u64,
}

impl SessionWorker {
    async fn run(mut self, mut audio_rx: mpsc::Receiver<Vec<f32>>, stop: Arc<Notify>) {
        debug!(session = %self.id, "session worker running");

        loop {
            let chunk = tokio::select! {
                _ = stop.notified() => break,
                chunk = audio_rx.recv() => match chunk {
                    Some(chunk) => chunk,
                    None => break,
                },
            };
            self.processed_samples += chunk.len() as u64;
            self.process_chunk(&chunk).await;
        }

        self.vad_pool.release(self.vad);
        self.manager.session_ended();
        info!(
            session = %self.id,
            duration_secs = self.started_at.elapsed().as_secs(),
            samples = self.processed_samples,
            segments = self.processed_segments,
            "streaming session ended"
        );
    }

    async fn process_chunk(&mut self, chunk: &[f32]) {
        self.buffer.extend(chunk);

        // Window the unconsumed tail through the VAD. The offset advances
        // past every window, whether or not speech is active yet.
        while let Some(window) = self.buffer.next_window(self.window_size) {
            if let Err(e) = self.vad.accept_waveform(window) {
                warn!(session = %self.id, "VAD error: {e:#}");
                return;
            }
            if !self.speech_active && self.vad.is_detected() {
                self.speech_active = true;
                self.last_partial = Instant::now();
                debug!(session = %self.id, "speech detected");
            }
        }

        // Bound idle memory: keep only the trailing windows while silent.
        if !self.speech_active {
            let cap = self.idle_buffer_windows * self.window_size;
            if self.buffer.len() > cap {
                self.buffer.trim_to_last(cap);
            }
        }

        if self.speech_active && self.last_partial.elapsed() >= self.partial_interval {
            self.run_partial().await;
            // The cadence resets whether or not recognition succeeded.
            self.last_partial = Instant::now();
        }

        while self.vad.has_completed_segment() {
            let Some(segment) = self.vad.pop_segment() else {
                break;
            };
            self.run_final(segment).await;
            // Next utterance starts from a clean buffer.
            self.buffer.clear();
            self.speech_active = false;
        }
    }

    /// Recognizes the entire current buffer as an interim hypothesis,
    /// tagged with the index of the segment in progress.
    async fn run_partial(&mut self) {
        match self
            .recognizers
            .recognize(self.buffer.samples(), self.recognize_timeout)
            .await
        {
            Ok(timed) => {
                if timed.recognition.text.is_empty() {
                    return;
                }
                let result = self.make_result(timed, false, self.segment_index);
                debug!(session = %self.id, idx = result.sequence_index, "partial result");
                self.sink.on_result(self.id, &result);
            }
            Err(RecognizeError::Exhausted(timeout)) => {
                debug!(session = %self.id, ?timeout, "skipping partial: no recognizer available");
            }
            Err(e) => {
                warn!(session = %self.id, "partial recognition failed: {e}");
            }
        }
    }

    /// Recognizes one completed segment. The sequence index advances
    /// exactly once per segment, even when recognition fails, so later
    /// segments keep their positions.
    async fn run_final(&mut self, segment: SpeechSegment) {
        let idx = self.segment_index;
        self.segment_index += 1;
        self.processed_segments += 1;

        match self
            .recognizers
            .recognize(&segment.samples, self.recognize_timeout)
            .await
        {
            Ok(timed) => {
                if timed.recognition.text.is_empty() {
                    debug!(session = %self.id, idx, "segment recognized as empty, skipping");
                    return;
                }
                let result = self.make_result(timed, true, idx);
                info!(session = %self.id, idx, text = %result.text, "final result");
                self.sink.on_result(self.id, &result);
            }
            Err(RecognizeError::Exhausted(timeout)) => {
                warn!(session = %self.id, ?timeout, idx, "segment dropped: no recognizer available");
            }
            Err(e) => {
                warn!(session = %self.id, idx, "final recognition failed: {e}");
            }
        }
    }

    fn make_result(
        &self,
        timed: TimedRecognition,
        finished: bool,
        sequence_index: u32,
    ) -> RecognitionResult {
        let r = timed.recognition;
        RecognitionResult {
            text: r.text,
            finished,
            sequence_index,
            language: r.language,
            emotion: r.emotion,
            event: r.event,
            timestamps: r.timestamps,
            tokens: r.tokens,
            inference_duration_ms: timed.inference_duration_ms,
        }
    }
}
