//! Validated configuration for the streamscribe engine.
//!
//! Settings are layered: struct defaults, then environment variables with
//! the `STREAMSCRIBE` prefix and `__` separator (e.g.
//! `STREAMSCRIBE__RECOGNIZER__POOL_SIZE=4`). The engine itself never reads
//! the environment; it receives a [`Settings`] value that has already
//! passed [`Settings::check`].

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How recognizer capacity is shared across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerStrategyKind {
    /// N pre-loaded instances, each lent exclusively to one caller at a
    /// time. Trades memory for lock-free inference.
    Pooled,
    /// One loaded instance, access serialized by a mutex. Trades
    /// throughput for memory.
    Shared,
}

/// Recognizer model and pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RecognizerSettings {
    pub strategy: RecognizerStrategyKind,
    /// Number of recognizer instances under the pooled strategy.
    #[validate(range(min = 1, max = 50))]
    pub pool_size: usize,
    /// Total inference threads, divided across pool instances.
    #[validate(range(min = 1, max = 32))]
    pub num_threads: usize,
    /// How long a caller may wait for a free instance.
    #[validate(range(min = 1))]
    pub acquire_timeout_ms: u64,
    /// Model identifier, resolved by the inference provider.
    pub model: String,
    /// Language hint ("auto" lets the model detect).
    pub language: String,
    /// Inverse text normalization.
    pub use_itn: bool,
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            strategy: RecognizerStrategyKind::Pooled,
            pool_size: 2,
            num_threads: 2,
            acquire_timeout_ms: 5000,
            model: "sense-voice".to_string(),
            language: "auto".to_string(),
            use_itn: true,
        }
    }
}

impl RecognizerSettings {
    pub fn acquire_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Threads per pooled instance: the configured total divided across
    /// the pool, never below one.
    pub fn threads_per_instance(&self) -> usize {
        (self.num_threads / self.pool_size).max(1)
    }
}

/// Voice-activity detection parameters, applied to every VAD instance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VadSettings {
    /// Speech probability threshold.
    #[validate(range(min = 0.0, max = 1.0))]
    pub threshold: f32,
    /// Silence run that closes a segment.
    #[validate(range(min = 0.001))]
    pub min_silence_secs: f32,
    /// Shorter detections are discarded as noise.
    #[validate(range(min = 0.001))]
    pub min_speech_secs: f32,
    /// Segments are force-closed past this length.
    pub max_speech_secs: f32,
    /// Samples fed to the detector per call.
    #[validate(range(min = 1))]
    pub window_size: usize,
    #[validate(range(min = 8000, max = 48000))]
    pub sample_rate: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_silence_secs: 0.25,
            min_speech_secs: 0.25,
            max_speech_secs: 8.0,
            window_size: 512,
            sample_rate: 16000,
        }
    }
}

/// Elastic VAD pool bounds.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VadPoolSettings {
    /// Instances created eagerly at startup.
    #[validate(range(min = 1))]
    pub min_size: usize,
    /// Hard ceiling on live instances.
    #[validate(range(min = 1))]
    pub max_size: usize,
    #[validate(range(min = 1))]
    pub acquire_timeout_ms: u64,
}

impl Default for VadPoolSettings {
    fn default() -> Self {
        Self {
            min_size: 2,
            max_size: 10,
            acquire_timeout_ms: 5000,
        }
    }
}

impl VadPoolSettings {
    pub fn acquire_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Streaming-session windowing behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StreamingSettings {
    /// Minimum gap between partial recognitions during ongoing speech.
    pub partial_interval_ms: u64,
    /// While no speech is active the rolling buffer is trimmed to this
    /// many trailing windows.
    #[validate(range(min = 1))]
    pub idle_buffer_windows: usize,
    /// Bound on the per-session audio queue.
    #[validate(range(min = 1))]
    pub queue_capacity: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            partial_interval_ms: 200,
            idle_buffer_windows: 10,
            queue_capacity: 32,
        }
    }
}

impl StreamingSettings {
    pub fn partial_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.partial_interval_ms)
    }
}

/// Aggregate engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Settings {
    #[validate(nested)]
    pub recognizer: RecognizerSettings,
    #[validate(nested)]
    pub vad: VadSettings,
    #[validate(nested)]
    pub vad_pool: VadPoolSettings,
    #[validate(nested)]
    pub streaming: StreamingSettings,
}

impl Settings {
    /// Loads settings from defaults overlaid with `STREAMSCRIBE__*`
    /// environment variables, then validates.
    pub fn load() -> Result<Self, SettingsError> {
        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(
                Environment::with_prefix("STREAMSCRIBE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.check()?;
        Ok(settings)
    }

    /// Field-level ranges plus the cross-field constraints that
    /// `validator` cannot express.
    pub fn check(&self) -> Result<(), SettingsError> {
        self.validate()
            .map_err(|e| SettingsError::Invalid(e.to_string()))?;

        if self.vad.max_speech_secs <= self.vad.min_speech_secs {
            return Err(SettingsError::Invalid(format!(
                "vad.max_speech_secs ({}) must exceed vad.min_speech_secs ({})",
                self.vad.max_speech_secs, self.vad.min_speech_secs
            )));
        }
        if self.vad_pool.min_size > self.vad_pool.max_size {
            return Err(SettingsError::Invalid(format!(
                "vad_pool.min_size ({}) must not exceed vad_pool.max_size ({})",
                self.vad_pool.min_size, self.vad_pool.max_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Settings::default().check().unwrap();
    }

    #[test]
    fn threads_divided_across_pool() {
        let r = RecognizerSettings {
            num_threads: 8,
            pool_size: 4,
            ..RecognizerSettings::default()
        };
        assert_eq!(r.threads_per_instance(), 2);

        // Never drops below one thread per instance.
        let r = RecognizerSettings {
            num_threads: 2,
            pool_size: 8,
            ..RecognizerSettings::default()
        };
        assert_eq!(r.threads_per_instance(), 1);
    }

    #[test]
    fn rejects_zero_pool_size() {
        let settings = Settings {
            recognizer: RecognizerSettings {
                pool_size: 0,
                ..RecognizerSettings::default()
            },
            ..Settings::default()
        };
        assert!(settings.check().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let settings = Settings {
            vad: VadSettings {
                threshold: 1.5,
                ..VadSettings::default()
            },
            ..Settings::default()
        };
        assert!(settings.check().is_err());
    }

    #[test]
    fn rejects_inverted_speech_durations() {
        let settings = Settings {
            vad: VadSettings {
                max_speech_secs: 0.1,
                ..VadSettings::default()
            },
            ..Settings::default()
        };
        assert!(settings.check().is_err());
    }

    #[test]
    fn rejects_inverted_vad_pool_bounds() {
        let settings = Settings {
            vad_pool: VadPoolSettings {
                min_size: 11,
                max_size: 10,
                ..VadPoolSettings::default()
            },
            ..Settings::default()
        };
        assert!(settings.check().is_err());
    }
}
