use rollcall_core::{MatchStrategy, RecognizerConfig, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture size; the driver may negotiate another.
    pub camera_width: u32,
    pub camera_height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Enrollment record file.
    pub store_path: PathBuf,
    /// Directory of enrollment photos, one per person.
    pub library_dir: PathBuf,
    /// Directory receiving attendance session files.
    pub attendance_dir: PathBuf,
    /// Confidence a match must exceed to be named.
    pub min_confidence: u8,
    pub match_strategy: MatchStrategy,
    /// TTF/OTF font replacing the bundled label font.
    pub label_font: Option<PathBuf>,
    pub file_retry_attempts: u32,
    pub file_retry_delay: Duration,
    /// How often the session preview is refreshed.
    pub render_interval: Duration,
    /// Where the session writes the latest annotated frame.
    pub preview_path: PathBuf,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| rollcall_core::default_model_dir());

        let data_dir = std::env::var("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| {
                        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("rollcall")
            });

        let match_strategy = match std::env::var("ROLLCALL_MATCH_STRATEGY") {
            Ok(raw) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring ROLLCALL_MATCH_STRATEGY");
                MatchStrategy::default()
            }),
            Err(_) => MatchStrategy::default(),
        };

        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            camera_width: env_parse("ROLLCALL_CAMERA_WIDTH", 1280),
            camera_height: env_parse("ROLLCALL_CAMERA_HEIGHT", 720),
            model_dir,
            store_path: env_path("ROLLCALL_STORE_PATH", || data_dir.join("signatures.csv")),
            library_dir: env_path("ROLLCALL_LIBRARY_DIR", || data_dir.join("images")),
            attendance_dir: env_path("ROLLCALL_ATTENDANCE_DIR", || data_dir.join("attendance")),
            min_confidence: env_parse::<u8>("ROLLCALL_MIN_CONFIDENCE", 50).min(100),
            match_strategy,
            label_font: std::env::var("ROLLCALL_LABEL_FONT").ok().map(PathBuf::from),
            file_retry_attempts: env_parse("ROLLCALL_FILE_RETRY_ATTEMPTS", 5),
            file_retry_delay: Duration::from_millis(env_parse("ROLLCALL_FILE_RETRY_DELAY_MS", 500)),
            render_interval: Duration::from_millis(
                env_parse::<u64>("ROLLCALL_RENDER_INTERVAL_MS", 100).max(1),
            ),
            preview_path: env_path("ROLLCALL_PREVIEW_PATH", || data_dir.join("preview.png")),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.file_retry_attempts.max(1),
            delay: self.file_retry_delay,
        }
    }

    pub fn recognizer_config(&self) -> RecognizerConfig {
        RecognizerConfig {
            min_confidence: self.min_confidence,
            strategy: self.match_strategy,
        }
    }
}

fn env_path(key: &str, default: impl FnOnce() -> PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| default())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
