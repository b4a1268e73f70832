//! Browser session management
//!
//! Handles launching and controlling an individual Chrome browser instance
//! over the DevTools Protocol. The browser runs headful because the harness
//! renders into a virtual display; the launch flags match what automation
//! under Xvfb needs (no sandbox, no shm, fake media devices).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::BrowserError;

/// Global counter for sequential session naming (browser-1, browser-2, ...)
static SESSION_COUNTER: AtomicU32 = AtomicU32::new(1);

/// Serializes DISPLAY overrides across concurrent launches.
static DISPLAY_ENV_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Scoped DISPLAY override held across one Chrome launch.
///
/// Saves the previous value on construction and restores it (or removes the
/// variable) on drop, so a session's display never leaks into the process
/// environment where another session, or a later env fallback, could pick
/// it up.
struct DisplayEnvGuard {
    saved: Option<std::ffi::OsString>,
    _lock: tokio::sync::MutexGuard<'static, ()>,
}

impl DisplayEnvGuard {
    async fn set(display: &str) -> Self {
        let lock = DISPLAY_ENV_LOCK.lock().await;
        let saved = std::env::var_os("DISPLAY");
        std::env::set_var("DISPLAY", display);
        Self { saved, _lock: lock }
    }
}

impl Drop for DisplayEnvGuard {
    fn drop(&mut self) {
        match self.saved.take() {
            Some(old) => std::env::set_var("DISPLAY", old),
            None => std::env::remove_var("DISPLAY"),
        }
    }
}

/// Find Chrome/Chromium executable on the system
fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    } else {
        vec![
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Configuration for a browser session
#[derive(Debug, Clone)]
pub struct BrowserSessionConfig {
    /// Path to Chrome/Chromium executable
    pub chrome_path: Option<String>,
    /// User data directory
    pub user_data_dir: Option<PathBuf>,
    /// Navigation timeout in seconds
    pub timeout_secs: u64,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
    /// X display the browser renders into (exported as DISPLAY)
    pub display: Option<String>,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            user_data_dir: None,
            timeout_secs: 30,
            window_width: 1920,
            window_height: 1080,
            display: None,
        }
    }
}

impl BrowserSessionConfig {
    /// Config for a test browser: fresh uuid-keyed profile dir under the temp
    /// directory, rendering into the given display.
    pub fn for_test(display: Option<&str>) -> Self {
        let user_data_dir = std::env::temp_dir()
            .join("browser-harness")
            .join("browser_data")
            .join(uuid::Uuid::new_v4().to_string());

        Self {
            user_data_dir: Some(user_data_dir),
            display: display.map(|d| d.to_string()),
            ..Default::default()
        }
    }

    /// Set Chrome path
    pub fn chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Set navigation timeout
    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set window size
    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }
}

/// A browser session for one test
pub struct BrowserSession {
    /// Session display name, e.g. "browser-1"
    pub id: String,
    browser: Browser,
    page: Page,
    config: BrowserSessionConfig,
    /// Whether the CDP connection is still up
    alive: Arc<AtomicBool>,
    _handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch Chrome with the harness flag set and open one blank page.
    pub async fn launch(config: BrowserSessionConfig) -> Result<Self, BrowserError> {
        let session_id = format!("browser-{}", SESSION_COUNTER.fetch_add(1, Ordering::Relaxed));

        if config.chrome_path.is_none() && find_chrome().is_none() {
            return Err(BrowserError::LaunchFailed(
                "Chrome/Chromium not found on this system".to_string(),
            ));
        }

        info!(
            "Launching browser session {} (display: {:?})",
            session_id, config.display
        );

        let mut builder = BrowserConfig::builder()
            // Headful: the virtual display provides headlessness, and video
            // capture needs real rendering.
            .with_head()
            .window_size(config.window_width, config.window_height)
            .arg("--disable-infobars")
            .arg("--disable-popup-blocking")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--use-fake-ui-for-media-stream")
            .arg("--use-fake-device-for-media-stream")
            .arg("--use-gl=desktop")
            .arg(format!(
                "--window-size={},{}",
                config.window_width, config.window_height
            ));

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        } else if let Some(chrome_path) = find_chrome() {
            debug!("Auto-detected Chrome at: {}", chrome_path.display());
            builder = builder.chrome_executable(chrome_path);
        }

        if let Some(ref dir) = config.user_data_dir {
            let _ = std::fs::create_dir_all(dir);
            builder = builder.user_data_dir(dir);
        }

        let browser_config = builder
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        // Chrome finds its X display through the inherited environment. The
        // override is scoped to this launch and serialized, so concurrent
        // sessions each spawn their Chrome against their own display and the
        // process environment is restored afterwards.
        let display_env = match config.display {
            Some(ref display) => Some(DisplayEnvGuard::set(display).await),
            None => None,
        };

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        drop(display_env);

        // Drive the CDP event loop in the background. When the handler ends,
        // Chrome has disconnected or crashed.
        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive.clone();
        let session_id_for_handler = session_id.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("Session {} CDP event error", session_id_for_handler);
                }
            }
            warn!(
                "Session {} Chrome disconnected (event handler ended)",
                session_id_for_handler
            );
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        // Chrome opens with one blank tab; use it and close any extras.
        let page = {
            let mut pages = browser
                .pages()
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            let main_page = if !pages.is_empty() {
                pages.remove(0)
            } else {
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
            };

            for extra_page in pages {
                debug!("Closing extra blank tab");
                let _ = extra_page.close().await;
            }

            main_page
        };

        info!("Browser session {} ready", session_id);

        Ok(Self {
            id: session_id,
            browser,
            page,
            config,
            alive,
            _handler_task: handler_task,
        })
    }

    /// Get session ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Check if the session is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Navigate to a URL
    pub async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        debug!("Session {} navigating to: {}", self.id, url);
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    /// Wait for the pending navigation to complete, bounded by the session
    /// timeout.
    pub async fn wait_for_navigation(&self) -> Result<(), BrowserError> {
        tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.page.wait_for_navigation(),
        )
        .await
        .map_err(|_| BrowserError::Timeout("Navigation timeout".into()))?
        .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    /// Current document title
    pub async fn title(&self) -> Result<String, BrowserError> {
        self.page
            .evaluate("document.title")
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?
            .into_value::<String>()
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))
    }

    /// Inner text of the first element matching a CSS selector
    pub async fn text(&self, selector: &str) -> Result<String, BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;

        element
            .inner_text()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?
            .ok_or_else(|| BrowserError::ElementNotFound(format!("{} has no text", selector)))
    }

    /// Click the first element matching a CSS selector
    pub async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;

        element
            .click()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?;
        Ok(())
    }

    /// Poll until an element matching the selector appears.
    pub async fn wait_for_element(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let start = std::time::Instant::now();
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(BrowserError::Timeout(format!(
                    "element {} did not appear within {:?}",
                    selector, timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Capture the current viewport as PNG bytes
    pub async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(false)
                    .build(),
            )
            .await
            .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))
    }

    /// Close the browser and wait for Chrome to shut down.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Session {} error closing browser: {}", self.id, e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Session {} browser already gone: {}", self.id, e);
        }
        info!("Browser session {} closed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_gets_unique_profile_dirs() {
        let a = BrowserSessionConfig::for_test(Some(":99"));
        let b = BrowserSessionConfig::for_test(Some(":99"));
        assert_ne!(a.user_data_dir, b.user_data_dir);
        assert_eq!(a.display.as_deref(), Some(":99"));
    }

    #[tokio::test]
    async fn display_override_is_scoped_to_the_guard() {
        // Pre-existing value comes back once the guard is gone.
        std::env::set_var("DISPLAY", ":7");
        {
            let _guard = DisplayEnvGuard::set(":99").await;
            assert_eq!(std::env::var("DISPLAY").unwrap(), ":99");
        }
        assert_eq!(std::env::var("DISPLAY").unwrap(), ":7");

        // With no prior value, the variable is removed again, so a dead
        // managed display can never be adopted through the env fallback.
        std::env::remove_var("DISPLAY");
        {
            let _guard = DisplayEnvGuard::set(":99").await;
            assert_eq!(std::env::var("DISPLAY").unwrap(), ":99");
        }
        assert!(std::env::var_os("DISPLAY").is_none());
    }

    #[test]
    fn default_config_matches_harness_resolution() {
        let config = BrowserSessionConfig::default();
        assert_eq!(config.window_width, 1920);
        assert_eq!(config.window_height, 1080);
        assert!(config.display.is_none());
    }
}
