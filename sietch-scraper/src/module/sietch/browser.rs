///! Headless Chromium page renderer
///!
///! The status page is built client-side, so a plain HTTP GET only returns
///! an empty shell. We drive a headless browser, wait for the server list to
///! show up and hand back the rendered DOM.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::PageConfig;
use crate::error::RenderError;

const OUTER_HTML_SCRIPT: &str = "document.documentElement.outerHTML";
const WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// Anything that can turn a URL into rendered HTML.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, RenderError>;
}

/// Renders pages with a fresh headless Chromium per call.
pub struct ChromeRenderer {
    config: PageConfig,
}

impl ChromeRenderer {
    pub fn new(config: PageConfig) -> Self {
        Self { config }
    }

    fn launch_options(config: &PageConfig) -> LaunchOptions<'static> {
        // Keep the browser alive through the ready wait and settle delay.
        let idle_timeout = config.ready_timeout() + config.settle_delay() + Duration::from_secs(30);

        LaunchOptions {
            headless: true,
            sandbox: false,
            window_size: Some(WINDOW_SIZE),
            path: config.chrome_path.clone(),
            idle_browser_timeout: idle_timeout,
            args: vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
            ],
            ..Default::default()
        }
    }

    /// Blocking render; the browser is closed when it goes out of scope.
    fn render_blocking(config: &PageConfig, url: &str) -> Result<String, RenderError> {
        let browser = Browser::new(Self::launch_options(config))
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        if let Err(e) = tab.set_user_agent(&config.user_agent, None, None) {
            warn!("Failed to set user agent: {}", e);
        }

        info!("Navigating to: {}", url);
        tab.navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        // The page often finishes just after the timeout, so keep going.
        debug!("Waiting for '{}' to appear", config.ready_selector);
        if let Err(e) =
            tab.wait_for_element_with_custom_timeout(&config.ready_selector, config.ready_timeout())
        {
            warn!(
                "Timeout waiting for '{}' after {:?}, continuing with current page: {}",
                config.ready_selector,
                config.ready_timeout(),
                e
            );
        }

        std::thread::sleep(config.settle_delay());

        let evaluated = tab
            .evaluate(OUTER_HTML_SCRIPT, false)
            .ok()
            .and_then(|object| object.value)
            .and_then(|value| value.as_str().map(str::to_string));

        let html = match evaluated {
            Some(html) => html,
            None => {
                warn!("Script evaluation returned no HTML, falling back to page content");
                tab.get_content()
                    .map_err(|e| RenderError::Content(e.to_string()))?
            }
        };

        Ok(html)
    }
}

#[async_trait]
impl PageRenderer for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        let config = self.config.clone();
        let target = url.to_string();

        let html =
            tokio::task::spawn_blocking(move || Self::render_blocking(&config, &target)).await??;

        info!("Rendered {} ({} bytes)", url, html.len());

        if let Some(path) = &self.config.debug_html_path {
            match tokio::fs::write(path, &html).await {
                Ok(()) => debug!("Saved rendered HTML to {:?}", path),
                Err(e) => warn!("Failed to save rendered HTML to {:?}: {}", path, e),
            }
        }

        Ok(html)
    }
}
