//! Virtual display management
//!
//! Owns an Xvfb child process so a headful browser can render without real
//! hardware. One display is brought up per test session and torn down when
//! the session ends; dependents receive the display identifier through this
//! handle rather than through mutated global state.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::HarnessError;

/// Display numbers probed when looking for a free X display.
const DISPLAY_RANGE: std::ops::RangeInclusive<u32> = 99..=199;

/// How long to wait for Xvfb to create its socket before giving up.
const STARTUP_WAIT: Duration = Duration::from_secs(5);

/// A session-scoped virtual display backed by a spawned Xvfb process.
pub struct VirtualDisplay {
    display: String,
    child: Child,
}

impl VirtualDisplay {
    /// Start Xvfb on a free display number with the given screen size.
    pub async fn start(width: u32, height: u32) -> Result<Self, HarnessError> {
        let number = free_display_number().ok_or_else(|| {
            HarnessError::DisplayUnavailable(format!(
                "no free X display number in {}..={}",
                DISPLAY_RANGE.start(),
                DISPLAY_RANGE.end()
            ))
        })?;
        let display = display_name(number);

        let child = Command::new("Xvfb")
            .arg(&display)
            .args(["-screen", "0"])
            .arg(format!("{}x{}x24", width, height))
            .args(["-nolisten", "tcp"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::SpawnFailed {
                program: "Xvfb".to_string(),
                source: e,
            })?;

        let mut handle = Self { display, child };

        // Xvfb creates /tmp/.X11-unix/X{n} once it is accepting connections.
        let socket = x11_socket_path(number);
        let deadline = tokio::time::Instant::now() + STARTUP_WAIT;
        loop {
            if let Ok(Some(status)) = handle.child.try_wait() {
                return Err(HarnessError::DisplayUnavailable(format!(
                    "Xvfb exited during startup with {}",
                    status
                )));
            }
            if socket.exists() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = handle.child.start_kill();
                let _ = handle.child.wait().await;
                return Err(HarnessError::DisplayUnavailable(format!(
                    "Xvfb did not come up on {} within {:?}",
                    handle.display, STARTUP_WAIT
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!("Started virtual display on {}", handle.display);
        Ok(handle)
    }

    /// The display identifier, e.g. `":99"`.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Stop the Xvfb child and wait for it to exit.
    ///
    /// The child also carries `kill_on_drop` as a backstop, so a dropped
    /// handle cannot leak the display past the session.
    pub async fn stop(mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("Xvfb on {} already gone: {}", self.display, e);
        }
        match self.child.wait().await {
            Ok(_) => info!("Stopped virtual display {}", self.display),
            Err(e) => warn!("Failed to reap Xvfb on {}: {}", self.display, e),
        }
    }
}

fn display_name(number: u32) -> String {
    format!(":{}", number)
}

fn x11_socket_path(number: u32) -> PathBuf {
    PathBuf::from(format!("/tmp/.X11-unix/X{}", number))
}

/// Find a display number with neither an X lock file nor a live socket.
fn free_display_number() -> Option<u32> {
    DISPLAY_RANGE.find(|n| {
        let lock = PathBuf::from(format!("/tmp/.X{}-lock", n));
        !lock.exists() && !x11_socket_path(*n).exists()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_has_colon_prefix() {
        assert_eq!(display_name(99), ":99");
        assert_eq!(display_name(150), ":150");
    }

    #[cfg(unix)]
    #[test]
    fn free_display_number_stays_in_probe_range() {
        if let Some(n) = free_display_number() {
            assert!(DISPLAY_RANGE.contains(&n));
        }
    }
}
