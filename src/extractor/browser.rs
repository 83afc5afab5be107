use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::script::{IDLE_PROBE_SCRIPT, SNAPSHOT_SCRIPT};
use super::{BrowserSession, ExtractionError, PageExtractor, PageSnapshot};
use crate::config::{NAVIGATION_TIMEOUT_SECS, NETWORK_IDLE_POLL_MS, NETWORK_IDLE_QUIET_MS};

/// Launches a fresh headless Chromium with a private profile per scan.
pub struct ChromiumExtractor {
    chrome: Option<PathBuf>,
}

impl ChromiumExtractor {
    pub fn new(chrome: Option<PathBuf>) -> Self {
        Self { chrome }
    }
}

#[async_trait]
impl PageExtractor for ChromiumExtractor {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, ExtractionError> {
        let user_data_dir =
            std::env::temp_dir().join(format!("a11y-scanner-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&user_data_dir).map_err(|e| {
            ExtractionError::LaunchFailure(format!("cannot create profile dir: {}", e))
        })?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .user_data_dir(&user_data_dir)
            .request_timeout(Duration::from_secs(NAVIGATION_TIMEOUT_SECS));
        if let Some(path) = find_chrome(self.chrome.as_deref()) {
            builder = builder.chrome_executable(path);
        }

        let config = match builder.build() {
            Ok(config) => config,
            Err(e) => {
                remove_profile_dir(&user_data_dir);
                return Err(ExtractionError::LaunchFailure(e));
            }
        };

        let (browser, mut handler) = match Browser::launch(config).await {
            Ok(pair) => pair,
            Err(e) => {
                remove_profile_dir(&user_data_dir);
                return Err(ExtractionError::LaunchFailure(e.to_string()));
            }
        };

        // The CDP connection only makes progress while the handler is polled.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {:?}", e);
                }
            }
        });

        debug!("Browser launched with profile {}", user_data_dir.display());
        Ok(Box::new(ChromiumSession {
            browser,
            handler,
            page: None,
            user_data_dir: Some(user_data_dir),
            closed: false,
        }))
    }
}

pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Option<Page>,
    user_data_dir: Option<PathBuf>,
    closed: bool,
}

impl ChromiumSession {
    fn cleanup_profile(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            remove_profile_dir(&path);
        }
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), ExtractionError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ExtractionError::NavigationFailed(e.to_string()))?;
        self.page = Some(page.clone());

        let load = async {
            page.goto(url)
                .await
                .map_err(|e| ExtractionError::NavigationFailed(e.to_string()))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| ExtractionError::NavigationFailed(e.to_string()))?;
            wait_for_network_idle(&page).await;
            Ok(())
        };

        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::NavigationTimeout {
                url: url.to_string(),
                secs: timeout.as_secs(),
            }),
        }
    }

    async fn capture(&mut self) -> Result<PageSnapshot, ExtractionError> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| ExtractionError::EvaluationFailure("no page loaded".to_string()))?;

        let result = page
            .evaluate(SNAPSHOT_SCRIPT)
            .await
            .map_err(|e| ExtractionError::EvaluationFailure(e.to_string()))?;
        result
            .into_value::<PageSnapshot>()
            .map_err(|e| ExtractionError::EvaluationFailure(format!("unexpected snapshot shape: {}", e)))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Page close failed: {}", e);
            }
        }
        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Waiting for browser exit failed: {}", e);
        }
        self.handler.abort();
        self.cleanup_profile();
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Browser's own Drop kills the child process.
        self.handler.abort();
        if self.user_data_dir.is_some() {
            warn!("Browser session dropped without close, removing profile dir");
            self.cleanup_profile();
        }
    }
}

fn remove_profile_dir(path: &Path) {
    if let Err(e) = std::fs::remove_dir_all(path) {
        warn!("Failed to remove browser profile {}: {}", path.display(), e);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdleProbe {
    ready_state: String,
    resources: usize,
}

/// Decides when a page has gone quiet: document complete and no new
/// resource entries for the quiet window.
#[derive(Debug)]
struct IdleTracker {
    quiet: Duration,
    last_count: Option<usize>,
    stable_since: Option<Instant>,
}

impl IdleTracker {
    fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_count: None,
            stable_since: None,
        }
    }

    fn observe(&mut self, complete: bool, resources: usize, now: Instant) -> bool {
        if self.last_count != Some(resources) {
            self.last_count = Some(resources);
            self.stable_since = complete.then_some(now);
            return false;
        }
        if !complete {
            self.stable_since = None;
            return false;
        }
        let since = *self.stable_since.get_or_insert(now);
        now.duration_since(since) >= self.quiet
    }
}

/// Polls until idle. Unbounded; the caller's timeout is the budget.
async fn wait_for_network_idle(page: &Page) {
    let poll = Duration::from_millis(NETWORK_IDLE_POLL_MS);
    let mut tracker = IdleTracker::new(Duration::from_millis(NETWORK_IDLE_QUIET_MS));

    loop {
        match page.evaluate(IDLE_PROBE_SCRIPT).await {
            Ok(result) => match result.into_value::<IdleProbe>() {
                Ok(probe) => {
                    let complete = probe.ready_state == "complete";
                    if tracker.observe(complete, probe.resources, Instant::now()) {
                        return;
                    }
                }
                Err(e) => debug!("Idle probe returned unexpected value: {}", e),
            },
            // Mid-navigation contexts can reject evaluation; keep polling.
            Err(e) => debug!("Idle probe failed: {}", e),
        }
        tokio::time::sleep(poll).await;
    }
}

/// Resolve the browser binary: explicit path, then `CHROMIUM_PATH`, then
/// well-known install locations. `None` leaves detection to chromiumoxide.
pub fn find_chrome(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        warn!("Configured browser {} does not exist", path.display());
    }

    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Some(path);
        }
        warn!("CHROMIUM_PATH points to missing file: {}", path.display());
    }

    let candidates: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}
