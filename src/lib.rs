//! Browser test harness
//!
//! Instrumentation around browser-driven tests: a session-scoped virtual
//! display (Xvfb), per-test screen recording via an external ffmpeg process,
//! and one teardown screenshot per test. Recording and screenshots are
//! best-effort; only a test's own assertions determine pass/fail.

pub mod browser;
pub mod display;
pub mod error;
pub mod fixture;
pub mod recorder;
pub mod screenshot;
pub mod supervisor;

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub use browser::{BrowserError, BrowserSession, BrowserSessionConfig};
pub use error::HarnessError;
pub use fixture::{HarnessSession, TestCase};
pub use recorder::{RecorderConfig, RecordingOutcome, VideoRecorder};

/// Harness configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarnessConfig {
    /// Virtual display / capture width
    pub window_width: u32,
    /// Virtual display / capture height
    pub window_height: u32,
    /// Capture frame rate
    pub frame_rate: u32,
    /// Directory for video files and encoder logs
    pub video_dir: PathBuf,
    /// Directory for teardown screenshots
    pub screenshot_dir: PathBuf,
    /// Encoder binary
    pub ffmpeg_path: String,
    /// Encoder exit codes counted as a successful recording
    pub success_exit_codes: Vec<i32>,
    /// Seconds to wait after the graceful stop signal before killing
    pub stop_timeout_secs: u64,
    /// Whether the session should spawn its own Xvfb (otherwise $DISPLAY)
    pub manage_display: bool,
    /// Chrome/Chromium executable override
    pub chrome_path: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            window_width: 1920,
            window_height: 1080,
            frame_rate: 15,
            video_dir: PathBuf::from("saved_videos"),
            screenshot_dir: PathBuf::from("latest_logs/screenshots"),
            ffmpeg_path: "ffmpeg".to_string(),
            success_exit_codes: vec![0, 255],
            stop_timeout_secs: 5,
            manage_display: true,
            chrome_path: None,
        }
    }
}

impl HarnessConfig {
    /// Default config file path, relative to the working directory.
    fn config_path() -> PathBuf {
        PathBuf::from("harness.json")
    }

    /// Load config from `harness.json`, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a specific file, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => {
                        info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        warn!("Failed to parse config file: {}", e);
                    }
                },
                Err(e) => {
                    warn!("Failed to read config file: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to `harness.json`. Best-effort.
    pub fn save(&self) {
        self.save_to(&Self::config_path());
    }

    /// Save config to a specific file. Best-effort.
    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!("Failed to create config directory: {}", e);
                    return;
                }
            }
        }

        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = std::fs::write(path, content) {
                    warn!("Failed to save config: {}", e);
                } else {
                    info!("Config saved to {:?}", path);
                }
            }
            Err(e) => {
                warn!("Failed to serialize config: {}", e);
            }
        }
    }

    /// Recorder configuration derived from this config.
    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            ffmpeg_path: self.ffmpeg_path.clone(),
            width: self.window_width,
            height: self.window_height,
            frame_rate: self.frame_rate,
            video_dir: self.video_dir.clone(),
            success_exit_codes: self.success_exit_codes.clone(),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
        }
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> PathBuf {
    PathBuf::from("latest_logs")
}

/// Initialize logging: console layer plus a file layer under `latest_logs/`.
///
/// Safe to call more than once (later calls are no-ops), so each integration
/// test can set it up without coordinating. Keep the returned guard alive for
/// the duration of the run so buffered file output is flushed.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    let log_dir = log_dir();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "browser-harness.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init();

        Some(guard)
    } else {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init();

        None
    }
}
