//! Teardown screenshots
//!
//! One image per test, written after the test regardless of outcome. A
//! screenshot failure is reported and swallowed; it must never change a test
//! result.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::browser::BrowserSession;

/// Capture the session's viewport and write `<dir>/<test_name>.png`.
///
/// Returns the written path, or `None` if any step failed (already reported).
pub async fn save_test_screenshot(
    session: &BrowserSession,
    dir: &Path,
    test_name: &str,
) -> Option<PathBuf> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!(
            "Could not create screenshot dir {}: {}",
            dir.display(),
            e
        );
        return None;
    }

    let path = screenshot_path(dir, test_name);
    match session.screenshot_png().await {
        Ok(bytes) => match std::fs::write(&path, &bytes) {
            Ok(()) => {
                info!("Saved screenshot: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Failed to write screenshot {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            warn!("Failed to capture screenshot for {}: {}", test_name, e);
            None
        }
    }
}

pub(crate) fn screenshot_path(dir: &Path, test_name: &str) -> PathBuf {
    dir.join(format!("{}.png", test_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_path_derives_from_test_name() {
        let path = screenshot_path(Path::new("latest_logs/screenshots"), "checkout_flow");
        assert_eq!(
            path,
            PathBuf::from("latest_logs/screenshots/checkout_flow.png")
        );
    }
}
