//! Session and per-test fixtures
//!
//! `HarnessSession` is the session-scoped fixture: it brings up the virtual
//! display once and hands its identifier to dependents. `TestCase` is the
//! per-test fixture: it starts the recorder when a test begins and, at
//! finish, stops the recorder and writes the teardown screenshot.
//!
//! Everything here is instrumentation. Failures are logged and contained;
//! only a test's own assertions decide pass or fail.

use std::path::PathBuf;
use tracing::{info, warn};

use crate::browser::{BrowserSession, BrowserSessionConfig};
use crate::display::VirtualDisplay;
use crate::recorder::{RecorderConfig, RecordingOutcome, VideoRecorder};
use crate::screenshot;
use crate::HarnessConfig;

/// Where the session's display identifier came from.
enum DisplayHandle {
    /// Xvfb spawned and owned by this session.
    Managed(VirtualDisplay),
    /// Pre-existing display adopted from the DISPLAY environment variable.
    External(String),
}

impl DisplayHandle {
    fn display(&self) -> &str {
        match self {
            DisplayHandle::Managed(d) => d.display(),
            DisplayHandle::External(d) => d,
        }
    }
}

/// Session-scoped fixture: one virtual display plus artifact directories.
pub struct HarnessSession {
    config: HarnessConfig,
    display: Option<DisplayHandle>,
}

impl HarnessSession {
    /// Bring up the session. Prefers a managed Xvfb display; falls back to
    /// `$DISPLAY`; with neither, tests still run but nothing is recorded.
    pub async fn start(config: HarnessConfig) -> Self {
        let display = if config.manage_display {
            match VirtualDisplay::start(config.window_width, config.window_height).await {
                Ok(d) => Some(DisplayHandle::Managed(d)),
                Err(e) => {
                    warn!("Virtual display unavailable ({}); trying $DISPLAY", e);
                    env_display().map(DisplayHandle::External)
                }
            }
        } else {
            env_display().map(DisplayHandle::External)
        };

        match &display {
            Some(d) => info!("Harness session using display {}", d.display()),
            None => info!("No display available; video recording disabled"),
        }

        Self { config, display }
    }

    /// The active display identifier, if any.
    pub fn display(&self) -> Option<&str> {
        self.display.as_ref().map(|d| d.display())
    }

    /// Recorder configuration derived from the session config.
    pub fn recorder_config(&self) -> RecorderConfig {
        self.config.recorder_config()
    }

    /// Browser configuration bound to this session's display.
    pub fn browser_config(&self) -> BrowserSessionConfig {
        BrowserSessionConfig::for_test(self.display())
            .chrome_path(self.config.chrome_path.clone())
            .window_size(self.config.window_width, self.config.window_height)
    }

    /// Start the per-test fixture. `test_name` keys every artifact, so it
    /// must be unique within the session.
    pub fn begin(&self, test_name: &str) -> TestCase {
        TestCase {
            test_name: test_name.to_string(),
            recorder: VideoRecorder::start(self.recorder_config(), self.display(), test_name),
            screenshot_dir: self.config.screenshot_dir.clone(),
        }
    }

    /// Tear down the session, stopping the managed display if there is one.
    pub async fn shutdown(self) {
        if let Some(DisplayHandle::Managed(d)) = self.display {
            d.stop().await;
        }
        info!("Harness session shut down");
    }
}

fn env_display() -> Option<String> {
    std::env::var("DISPLAY").ok().filter(|d| !d.is_empty())
}

/// Per-test fixture. Holds the recording session for exactly one test.
pub struct TestCase {
    test_name: String,
    recorder: VideoRecorder,
    screenshot_dir: PathBuf,
}

impl TestCase {
    /// The test this fixture belongs to.
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Whether this test is being recorded.
    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Finish the test: stop the recorder, then write the teardown
    /// screenshot. Runs on pass and fail alike; nothing here raises.
    pub async fn finish(self, session: &BrowserSession) -> RecordingOutcome {
        let outcome = self.recorder.stop().await;
        let _ = screenshot::save_test_screenshot(session, &self.screenshot_dir, &self.test_name)
            .await;
        outcome
    }

    /// Finish a test that never got a browser (e.g. launch failed). The
    /// recording is still stopped cleanly; there is no screenshot to take.
    pub async fn finish_without_browser(self) -> RecordingOutcome {
        warn!(
            "No browser session for {}; skipping teardown screenshot",
            self.test_name
        );
        self.recorder.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_display_handle_reports_identifier() {
        let handle = DisplayHandle::External(":42".to_string());
        assert_eq!(handle.display(), ":42");
    }
}
