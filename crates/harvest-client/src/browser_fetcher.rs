use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use harvest_core::error::AppError;
use harvest_core::traits::Fetcher;

/// Headless-browser fetcher using Chromium via the Chrome DevTools Protocol.
///
/// Storefront product modals and listing grids are rendered client-side, so
/// this fetcher returns the DOM after scripts have run. It can optionally
/// wait for a CSS selector (e.g. the product modal title) before reading the
/// page.
///
/// One Chromium process is shared by all clones; each fetch opens a tab,
/// reads the rendered HTML and closes the tab.
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    timeout: Duration,
    wait_for: Option<String>,
}

impl BrowserFetcher {
    /// Launches a headless Chromium browser with a 30 s navigation timeout.
    pub async fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!(path = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::Generic(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Generic(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
            wait_for: None,
        })
    }

    /// Wait until `selector` is present before reading the page.
    pub fn wait_for(mut self, selector: impl Into<String>) -> Self {
        self.wait_for = Some(selector.into());
        self
    }

    /// `CHROME_BIN` first, then well-known install locations. `None` lets
    /// chromiumoxide run its own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            // The snap wrapper strips headless flags; use the real binary.
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let result = tokio::time::timeout(self.timeout, async {
            let page = self
                .browser
                .new_page(url)
                .await
                .map_err(|e| AppError::Transport(format!("Failed to navigate to {url}: {e}")))?;

            let selector = self.wait_for.as_deref().unwrap_or("body");
            let rendered = page.find_element(selector).await.map_err(|e| {
                AppError::MissingStructuredData(format!("'{selector}' never rendered: {e}"))
            });

            let html = match rendered {
                Ok(_) => page
                    .content()
                    .await
                    .map_err(|e| AppError::Transport(format!("Failed to read page content: {e}"))),
                Err(e) => Err(e),
            };

            let _ = page.close().await;
            html
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }
}
