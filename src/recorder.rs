//! Per-test video recording
//!
//! Spawns an external encoder (ffmpeg x11grab) scoped to one test's lifetime,
//! bound to the active virtual display, and stops it deterministically at test
//! teardown: graceful stop signal, bounded wait, forced kill on timeout.
//!
//! Recording is best-effort instrumentation. Every failure here is reported
//! through logging and never surfaces as a test failure.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::HarnessError;

/// Configuration for the per-test encoder process.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Encoder binary to invoke.
    pub ffmpeg_path: String,
    /// Capture width in pixels.
    pub width: u32,
    /// Capture height in pixels.
    pub height: u32,
    /// Capture frame rate.
    pub frame_rate: u32,
    /// Directory receiving video and encoder log files.
    pub video_dir: PathBuf,
    /// Exit codes treated as a successful recording. ffmpeg exits 0 on a
    /// clean stop and 255 when terminated mid-encode; both leave a playable
    /// file behind. Configurable rather than hard-coded.
    pub success_exit_codes: Vec<i32>,
    /// How long to wait after the stop signal before force-killing.
    pub stop_timeout: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            width: 1920,
            height: 1080,
            frame_rate: 15,
            video_dir: PathBuf::from("saved_videos"),
            success_exit_codes: vec![0, 255],
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl RecorderConfig {
    /// Path of the video file for a test.
    pub fn video_path(&self, test_name: &str) -> PathBuf {
        self.video_dir.join(format!("{}.mp4", test_name))
    }

    /// Path of the encoder log file for a test.
    pub fn log_path(&self, test_name: &str) -> PathBuf {
        self.video_dir.join(format!("{}_ffmpeg.log", test_name))
    }
}

/// What became of one test's recording.
#[derive(Debug)]
pub enum RecordingOutcome {
    /// No display was available or the encoder never started.
    Skipped,
    /// Encoder exited with a success code; the log file was removed.
    Saved { video: PathBuf },
    /// Encoder exited abnormally (or had to be killed); the log file is kept
    /// for diagnosis. `code` is `None` when the process died to a signal.
    Failed { code: Option<i32>, log: PathBuf },
}

struct Recording {
    child: Child,
    test_name: String,
    video_path: PathBuf,
    log_path: PathBuf,
}

/// A recording session for exactly one test.
///
/// Owned by the per-test fixture and never shared; `stop` consumes the
/// recorder, so the encoder cannot outlive the fixture that started it.
pub struct VideoRecorder {
    config: RecorderConfig,
    inner: Option<Recording>,
}

impl VideoRecorder {
    /// Start recording `test_name` from `display`.
    ///
    /// With no display identifier this is a no-op recorder and the test
    /// proceeds unrecorded. A spawn failure likewise degrades to a no-op
    /// after a log message.
    pub fn start(config: RecorderConfig, display: Option<&str>, test_name: &str) -> Self {
        let Some(display) = display else {
            debug!("No display set; recording skipped for {}", test_name);
            return Self {
                config,
                inner: None,
            };
        };

        match spawn_encoder(&config, display, test_name) {
            Ok(recording) => {
                info!(
                    "Recording {} -> {}",
                    test_name,
                    recording.video_path.display()
                );
                Self {
                    config,
                    inner: Some(recording),
                }
            }
            Err(e) => {
                warn!(
                    "Could not start encoder for {}: {}; test proceeds unrecorded",
                    test_name, e
                );
                Self {
                    config,
                    inner: None,
                }
            }
        }
    }

    /// Whether an encoder process was actually started.
    pub fn is_recording(&self) -> bool {
        self.inner.is_some()
    }

    /// Stop the encoder and classify the result.
    ///
    /// Sends a graceful stop signal, waits up to the configured timeout, and
    /// force-kills on timeout. The encoder has exited by the time this
    /// returns.
    pub async fn stop(mut self) -> RecordingOutcome {
        let Some(mut recording) = self.inner.take() else {
            return RecordingOutcome::Skipped;
        };

        let status = match recording.child.try_wait() {
            Ok(Some(status)) => status,
            _ => {
                signal_stop(&recording.child);
                match tokio::time::timeout(self.config.stop_timeout, recording.child.wait()).await
                {
                    Ok(Ok(status)) => status,
                    Ok(Err(e)) => {
                        warn!("Failed waiting on encoder for {}: {}", recording.test_name, e);
                        return RecordingOutcome::Failed {
                            code: None,
                            log: recording.log_path,
                        };
                    }
                    Err(_) => {
                        warn!(
                            "Encoder for {} ignored stop signal for {:?}; killing",
                            recording.test_name, self.config.stop_timeout
                        );
                        if let Err(e) = recording.child.kill().await {
                            warn!("Failed to kill encoder for {}: {}", recording.test_name, e);
                        }
                        match recording.child.wait().await {
                            Ok(status) => status,
                            Err(e) => {
                                warn!(
                                    "Failed to reap encoder for {}: {}",
                                    recording.test_name, e
                                );
                                return RecordingOutcome::Failed {
                                    code: None,
                                    log: recording.log_path,
                                };
                            }
                        }
                    }
                }
            }
        };

        let code = status.code();
        if is_success(code, &self.config.success_exit_codes) {
            info!("Saved video: {}", recording.video_path.display());
            if let Err(e) = std::fs::remove_file(&recording.log_path) {
                debug!(
                    "Could not remove encoder log {}: {}",
                    recording.log_path.display(),
                    e
                );
            }
            RecordingOutcome::Saved {
                video: recording.video_path,
            }
        } else {
            warn!(
                "Encoder for {} exited with {:?}; log kept at {}",
                recording.test_name,
                code,
                recording.log_path.display()
            );
            RecordingOutcome::Failed {
                code,
                log: recording.log_path,
            }
        }
    }
}

fn spawn_encoder(
    config: &RecorderConfig,
    display: &str,
    test_name: &str,
) -> Result<Recording, HarnessError> {
    std::fs::create_dir_all(&config.video_dir)?;

    let video_path = config.video_path(test_name);
    let log_path = config.log_path(test_name);

    // Encoder output goes to its own log file so it never interleaves with
    // test output. The log is removed again on a successful stop.
    let log_file = std::fs::File::create(&log_path)?;
    let log_for_stderr = log_file.try_clone()?;

    let spawned = Command::new(&config.ffmpeg_path)
        .args(["-y", "-f", "x11grab"])
        .args(["-video_size", &format!("{}x{}", config.width, config.height)])
        .args(["-framerate", &config.frame_rate.to_string()])
        .args(["-i", display])
        .args(["-c:v", "libx264", "-preset", "ultrafast"])
        .args(["-pix_fmt", "yuv420p"])
        .arg(&video_path)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_for_stderr))
        .kill_on_drop(true)
        .spawn();

    match spawned {
        Ok(child) => Ok(Recording {
            child,
            test_name: test_name.to_string(),
            video_path,
            log_path,
        }),
        Err(e) => {
            // Don't leave an empty log behind for an encoder that never ran.
            let _ = std::fs::remove_file(&log_path);
            Err(HarnessError::SpawnFailed {
                program: config.ffmpeg_path.clone(),
                source: e,
            })
        }
    }
}

/// Ask the encoder to stop gracefully. ffmpeg finalizes the container on
/// SIGTERM; a hard kill would corrupt the file, so that only happens after
/// the bounded wait times out.
fn signal_stop(child: &Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = std::process::Command::new("kill")
            .arg(pid.to_string())
            .status();
        return;
    }

    // Non-unix: no graceful signal available; the timeout path in `stop`
    // falls through to a hard kill.
    #[cfg(not(unix))]
    let _ = child;
}

fn is_success(code: Option<i32>, success_exit_codes: &[i32]) -> bool {
    code.map_or(false, |c| success_exit_codes.contains(&c))
}
