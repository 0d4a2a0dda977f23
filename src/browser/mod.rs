//! Native browser management using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (env override → PATH → well-known
//!   install paths, cross-platform).
//! * Launching a **headful** session bound to a persistent profile
//!   directory, so a manual storefront login survives across runs.
//! * Page-level helpers: promise-aware JS evaluation, settle-wait, scroll.
//!
//! Headful is deliberate: the storefront gates product pages behind a login
//! that is performed manually in the opened window once, then reused from
//! the profile on every later run.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::config::{self, TaolensConfig};
use crate::dom::CdpDom;

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/usr/bin/brave-browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Headful profile config builder ───────────────────────────────────────────

/// Build a `BrowserConfig` for a headful, profile-backed session.
///
/// `--disable-blink-features=AutomationControlled` hides the
/// `navigator.webdriver` flag from the storefront's bot checks; the
/// persistent `user_data_dir` carries the login cookies.
pub fn build_profile_config(exe: &str, profile_dir: &Path) -> Result<BrowserConfig> {
    let ua = random_user_agent();

    BrowserConfig::builder()
        .chrome_executable(exe)
        .with_head()
        .window_size(1920, 1080)
        .arg(format!("--user-data-dir={}", profile_dir.display()))
        .arg("--start-maximized")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--ignore-certificate-errors")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-crash-reporter")
        .arg(format!("--user-agent={}", ua))
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Session ──────────────────────────────────────────────────────────────────

/// One authenticated browser session: a single long-lived product page plus
/// the ability to open side tabs (shared cookies) for image capture.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch the browser against the configured profile directory and open
    /// the working page.
    pub async fn launch(cfg: &TaolensConfig) -> Result<Self> {
        let exe = find_chrome_executable().ok_or_else(|| {
            anyhow!(
                "No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE."
            )
        })?;

        let profile_dir = cfg.resolve_profile_dir();
        std::fs::create_dir_all(&profile_dir)
            .with_context(|| format!("creating profile dir {}", profile_dir.display()))?;

        info!("🚀 Launching browser: {} (profile: {})", exe, profile_dir.display());
        let config = build_profile_config(&exe, &profile_dir)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to open working page: {}", e))?;

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Query root over the working page.
    pub fn dom(&self) -> CdpDom {
        CdpDom::new(self.page.clone())
    }

    /// Navigate the working page and wait for it to settle.
    pub async fn goto(&self, url: &str, settle_ms: u64) -> Result<()> {
        info!("🌐 Navigating: {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;
        wait_until_stable(&self.page, settle_ms.min(3_000), settle_ms + 10_000).await?;
        Ok(())
    }

    /// Open the storefront home page and leave a window for a manual login.
    pub async fn login_pause(&self, login_url: &str, wait_secs: u64) -> Result<()> {
        info!(
            "Opening {} (log in manually within {}s if required)",
            login_url, wait_secs
        );
        self.page
            .goto(login_url)
            .await
            .map_err(|e| anyhow!("Failed to open login page: {}", e))?;
        tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        info!("Login period over; starting scrape");
        Ok(())
    }

    /// Open a side tab sharing this session's cookies.
    pub async fn open_tab(&self, url: &str) -> Result<Page> {
        self.browser
            .new_page(url)
            .await
            .map_err(|e| anyhow!("Failed to open tab for {}: {}", url, e))
    }

    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close error (non-fatal): {}", e);
        }
        self.handler_task.abort();
        info!("🛑 Browser session shut down");
    }
}

// ── Page helpers ─────────────────────────────────────────────────────────────

/// Evaluate `expr` on `page`, awaiting any returned promise, and hand back
/// the JSON value (Null when the script yielded nothing usable).
pub async fn evaluate_json(page: &Page, expr: impl Into<String>) -> Result<serde_json::Value> {
    let params = EvaluateParams::builder()
        .expression(expr)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(|e| anyhow!("evaluate params: {}", e))?;
    let result = page
        .evaluate(params)
        .await
        .map_err(|e| anyhow!("evaluate failed: {}", e))?;
    Ok(result
        .into_value::<serde_json::Value>()
        .unwrap_or(serde_json::Value::Null))
}

/// Wait until the page network goes idle (no new resource entries for
/// `quiet_ms` consecutive ms) or until `timeout_ms` has elapsed.
///
/// Polls `performance.getEntriesByType("resource").length` every 250 ms, a
/// networkidle heuristic that works without CDP Network events.
pub async fn wait_until_stable(page: &Page, quiet_ms: u64, timeout_ms: u64) -> Result<()> {
    let poll_ms = 250u64;
    let start = std::time::Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = std::time::Instant::now();

    loop {
        if start.elapsed().as_millis() as u64 >= timeout_ms {
            info!("wait_until_stable: timeout after {}ms", timeout_ms);
            break;
        }

        let count: u64 = evaluate_json(page, "performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready_complete: bool = evaluate_json(page, "document.readyState")
            .await
            .ok()
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready_complete {
            stable_since = std::time::Instant::now();
            last_count = count;
        } else if count != last_count {
            last_count = count;
            stable_since = std::time::Instant::now();
        } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
            break;
        }

        tokio::time::sleep(Duration::from_millis(poll_ms)).await;
    }
    Ok(())
}

/// Scroll the full page height in steps to trigger lazy-loaded detail
/// sections, then jump to the bottom.
pub async fn scroll_to_page_end(page: &Page) -> Result<()> {
    let height: u64 = evaluate_json(
        page,
        "Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)",
    )
    .await
    .ok()
    .and_then(|j| j.as_u64())
    .unwrap_or(3000);

    let step = 600u64;
    let steps = (height / step).min(20); // cap to avoid infinite-scroll traps
    for i in 0..=steps {
        let y = i * step;
        if let Err(e) =
            evaluate_json(page, format!("window.scrollTo({{top: {y}, behavior: 'smooth'}});")).await
        {
            warn!("scroll step {} error: {}", i, e);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    evaluate_json(page, "window.scrollTo(0, document.body.scrollHeight);").await?;
    Ok(())
}
