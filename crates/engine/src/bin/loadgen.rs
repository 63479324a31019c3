//! Synthetic load driver: runs concurrent streaming sessions against
//! the stub inference provider and prints pool statistics.
//!
//! ```
//! cargo run -p streamscribe-engine --bin loadgen -- --sessions 8 --utterances 3
//! ```

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use streamscribe_config::Settings;
use streamscribe_engine::pool::PoolManager;
use streamscribe_engine::provider::stub::StubProvider;
use streamscribe_engine::session::{EventSink, Session, SessionId, SessionKind, SessionStatus};
use streamscribe_engine::RecognitionResult;

#[derive(Debug)]
struct Args {
    sessions: usize,
    utterances: usize,
}

struct LogSink;

impl EventSink for LogSink {
    fn on_result(&self, session: SessionId, result: &RecognitionResult) {
        info!(
            session = %session,
            finished = result.finished,
            idx = result.sequence_index,
            text = %result.text,
            "result"
        );
    }

    fn on_status(&self, session: SessionId, status: SessionStatus) {
        info!(session = %session, ?status, "status");
    }

    fn on_error(&self, session: SessionId, message: &str) {
        warn!(session = %session, message, "session error");
    }
}

fn parse_args() -> Result<Args, String> {
    let mut sessions = 8usize;
    let mut utterances = 3usize;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--sessions" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --sessions".into());
                };
                sessions = v
                    .parse()
                    .map_err(|_| "invalid value for --sessions".to_string())?;
            }
            "--utterances" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --utterances".into());
                };
                utterances = v
                    .parse()
                    .map_err(|_| "invalid value for --utterances".to_string())?;
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p streamscribe-engine --bin loadgen -- \\
  [--sessions <n>] [--utterances <n>]"
                );
                std::process::exit(0);
            }
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }

    Ok(Args {
        sessions,
        utterances,
    })
}

/// One window of square-wave PCM16 at the given amplitude.
fn pcm_window(amplitude: f32, window_size: usize) -> Vec<u8> {
    let value = (amplitude * 32767.0) as i16;
    let mut bytes = Vec::with_capacity(window_size * 2);
    for i in 0..window_size {
        let sample = if i % 2 == 0 { value } else { -value };
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

async fn feed(session: &Session, amplitude: f32, windows: usize, window_size: usize) {
    let chunk = pcm_window(amplitude, window_size);
    for _ in 0..windows {
        session.submit_audio(&chunk).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

async fn drive_session(n: usize, manager: Arc<PoolManager>, settings: Settings, utterances: usize) {
    let sink = Arc::new(LogSink);
    let session = match Session::open(SessionKind::Streaming, manager, &settings, sink).await {
        Ok(s) => s,
        Err(e) => {
            warn!(n, "session refused: {e}");
            return;
        }
    };

    let window_size = settings.vad.window_size;
    for _ in 0..utterances {
        // Roughly 0.5–1.5 s of speech, then enough silence to close the
        // segment.
        let speech_windows = rand::rng().random_range(16..48);
        feed(&session, 0.4, speech_windows, window_size).await;
        feed(&session, 0.0, 40, window_size).await;
    }

    session.stop().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args().map_err(|e| anyhow::anyhow!(e))?;
    let settings = Settings::load()?;

    let provider = Arc::new(StubProvider::new());
    let manager = PoolManager::initialize(provider, &settings).await?;

    info!(sessions = args.sessions, utterances = args.utterances, "starting load");

    let mut tasks = Vec::new();
    for n in 0..args.sessions {
        let manager = Arc::clone(&manager);
        let settings = settings.clone();
        tasks.push(tokio::spawn(drive_session(
            n,
            manager,
            settings,
            args.utterances,
        )));
    }
    for task in tasks {
        let _ = task.await;
    }

    manager.log_stats();
    Ok(())
}
