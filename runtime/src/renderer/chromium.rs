// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.
//!
//! Each [`ChromiumRenderer::launch`] starts its own headless Chromium
//! process. Network events from the page are bridged into a channel of
//! [`FinishedRequest`]s: `Network.responseReceived` supplies the URL and
//! `Network.loadingFinished` marks the body as complete.

use super::{FinishedRequest, RenderSession, Renderer, ResponseBody};
use crate::config::{BrowserOptions, WaitCondition, DEFAULT_NAVIGATION_TIMEOUT_MS};
use crate::error::RefreshError;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. ~/.feed-relay/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".feed-relay/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".feed-relay/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".feed-relay/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".feed-relay/chromium/chrome-linux64/chrome"),
                home.join(".feed-relay/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 2. System PATH
    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 3. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Headroom added on top of the navigation timeout for CDP commands.
const REQUEST_TIMEOUT_HEADROOM: Duration = Duration::from_secs(5);

/// Launches a fresh headless Chromium per session.
pub struct ChromiumRenderer {
    options: BrowserOptions,
    request_timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(options: BrowserOptions) -> Self {
        Self {
            options,
            request_timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS)
                + REQUEST_TIMEOUT_HEADROOM,
        }
    }

    /// Let CDP commands outlive `timeout`, so a slow page is cut off by the
    /// navigation deadline rather than by the command deadline.
    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout + REQUEST_TIMEOUT_HEADROOM;
        self
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let chrome_path = match &self.options.chromium_path {
            Some(p) => p.clone(),
            None => find_chromium()
                .context("Chromium not found; set --chromium-path or install Chrome")?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(self.request_timeout)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--mute-audio");
        if self.options.no_sandbox {
            builder = builder.no_sandbox();
        }
        builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))
    }

    async fn start(&self) -> Result<ChromiumSession> {
        let config = self.browser_config()?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        match open_page(&browser).await {
            Ok((page, requests, bridge)) => Ok(ChromiumSession {
                browser,
                page,
                handler: handler_task,
                bridge,
                requests: Some(requests),
            }),
            Err(e) => {
                shutdown_browser(&mut browser).await;
                handler_task.abort();
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn launch(&self) -> Result<Box<dyn RenderSession>, RefreshError> {
        match self.start().await {
            Ok(session) => Ok(Box::new(session)),
            Err(e) => Err(RefreshError::Launch(format!("{e:#}"))),
        }
    }
}

/// Open a blank page with network events bridged into a channel.
async fn open_page(
    browser: &Browser,
) -> Result<(Page, mpsc::UnboundedReceiver<FinishedRequest>, JoinHandle<()>)> {
    let page = browser
        .new_page("about:blank")
        .await
        .context("failed to create new page")?;

    page.execute(EnableParams::default())
        .await
        .context("failed to enable network domain")?;

    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .context("failed to subscribe to responses")?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .context("failed to subscribe to loading events")?;

    let (tx, rx) = mpsc::unbounded_channel();
    let bridge_page = page.clone();
    let bridge = tokio::spawn(async move {
        let mut pairing = RequestPairing::default();
        loop {
            // Responses first: when both events of a request are queued the
            // URL is recorded before the finish is seen.
            let ready = tokio::select! {
                biased;
                Some(event) = responses.next() => pairing
                    .response(event.request_id.inner(), event.response.url.clone())
                    .map(|url| (event.request_id.clone(), url)),
                Some(event) = finished.next() => pairing
                    .finished(event.request_id.inner())
                    .map(|url| (event.request_id.clone(), url)),
                else => break,
            };
            let Some((request_id, url)) = ready else {
                continue;
            };
            let body = CdpBody {
                page: bridge_page.clone(),
                request_id,
            };
            if tx.send(FinishedRequest::new(url, Box::new(body))).is_err() {
                break;
            }
        }
    });

    Ok((page, rx, bridge))
}

/// Joins `Network.responseReceived` and `Network.loadingFinished` by
/// request id. Either event may be seen first; the second one completes
/// the pair.
#[derive(Debug, Default)]
struct RequestPairing {
    urls: HashMap<String, String>,
    finished_early: HashSet<String>,
}

impl RequestPairing {
    /// Record a response URL. Returns it if the request already finished.
    fn response(&mut self, request_id: &str, url: String) -> Option<String> {
        if self.finished_early.remove(request_id) {
            return Some(url);
        }
        self.urls.insert(request_id.to_string(), url);
        None
    }

    /// Record a finished load. Returns the URL if the response was seen.
    fn finished(&mut self, request_id: &str) -> Option<String> {
        match self.urls.remove(request_id) {
            Some(url) => Some(url),
            None => {
                self.finished_early.insert(request_id.to_string());
                None
            }
        }
    }
}

async fn shutdown_browser(browser: &mut Browser) {
    if let Err(e) = browser.close().await {
        warn!("graceful browser close failed, killing process: {e}");
        if let Some(Err(e)) = browser.kill().await {
            warn!("failed to kill browser process: {e}");
        }
    }
    if let Err(e) = browser.wait().await {
        debug!("waiting for browser exit failed: {e}");
    }
}

/// Body of a finished request, fetched over CDP on demand.
struct CdpBody {
    page: Page,
    request_id: RequestId,
}

#[async_trait]
impl ResponseBody for CdpBody {
    async fn text(&self) -> Result<String> {
        let resp = self
            .page
            .execute(GetResponseBodyParams::new(self.request_id.clone()))
            .await
            .context("failed to read response body")?;
        decode_body(&resp.result.body, resp.result.base64_encoded)
    }
}

/// Decode a CDP response body, which may arrive base64-encoded.
pub(crate) fn decode_body(body: &str, base64_encoded: bool) -> Result<String> {
    if !base64_encoded {
        return Ok(body.to_string());
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body)
        .context("response body is not valid base64")?;
    String::from_utf8(bytes).context("response body is not valid UTF-8")
}

/// A single Chromium process with one page.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    bridge: JoinHandle<()>,
    requests: Option<mpsc::UnboundedReceiver<FinishedRequest>>,
}

async fn load(page: &Page, url: &str, wait: WaitCondition) -> Result<()> {
    match wait {
        WaitCondition::Load => {
            page.goto(url).await.context("navigation failed")?;
        }
        WaitCondition::DomContentLoaded => {
            let mut dom_ready = page
                .event_listener::<EventDomContentEventFired>()
                .await
                .context("failed to subscribe to DOMContentLoaded")?;
            // The navigate command itself resolves only on load, so whichever
            // comes first wins.
            let navigate = page.execute(NavigateParams::new(url));
            tokio::pin!(navigate);
            tokio::select! {
                Some(_) = dom_ready.next() => {}
                nav = &mut navigate => {
                    let nav = nav.context("navigation failed")?;
                    if let Some(reason) = &nav.result.error_text {
                        bail!("{reason}");
                    }
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RenderSession for ChromiumSession {
    fn finished_requests(&mut self) -> Option<mpsc::UnboundedReceiver<FinishedRequest>> {
        self.requests.take()
    }

    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitCondition,
        timeout: Duration,
    ) -> Result<(), RefreshError> {
        let timeout_ms = timeout.as_millis() as u64;
        match tokio::time::timeout(timeout, load(&self.page, url, wait)).await {
            Ok(Ok(())) => {
                debug!("navigated to {url}");
                Ok(())
            }
            Ok(Err(e)) => Err(RefreshError::Navigation(format!("{e:#}"))),
            Err(_) => Err(RefreshError::NavigationTimeout(timeout_ms)),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumSession {
            mut browser,
            page,
            handler,
            bridge,
            requests,
        } = *self;
        bridge.abort();
        drop(requests);
        if let Err(e) = page.close().await {
            debug!("page close failed: {e}");
        }
        shutdown_browser(&mut browser).await;
        handler.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_response_then_finish() {
        let mut pairing = RequestPairing::default();
        assert_eq!(pairing.response("1", "https://api.example.com/data".into()), None);
        assert_eq!(
            pairing.finished("1").as_deref(),
            Some("https://api.example.com/data")
        );
        assert_eq!(pairing.finished("1"), None);
    }

    #[test]
    fn test_pairing_finish_before_response() {
        let mut pairing = RequestPairing::default();
        assert_eq!(pairing.finished("7"), None);
        assert_eq!(
            pairing.response("7", "https://api.example.com/data?x=1".into()).as_deref(),
            Some("https://api.example.com/data?x=1")
        );
        assert!(pairing.urls.is_empty());
        assert!(pairing.finished_early.is_empty());
    }

    #[test]
    fn test_pairing_interleaved_requests() {
        let mut pairing = RequestPairing::default();
        assert_eq!(pairing.response("a", "https://cdn.example.com/app.js".into()), None);
        assert_eq!(pairing.finished("b"), None);
        assert_eq!(
            pairing.response("b", "https://api.example.com/data".into()).as_deref(),
            Some("https://api.example.com/data")
        );
        assert_eq!(
            pairing.finished("a").as_deref(),
            Some("https://cdn.example.com/app.js")
        );
    }

    #[test]
    fn test_decode_plain_body() {
        assert_eq!(decode_body(r#"{"v":1}"#, false).unwrap(), r#"{"v":1}"#);
    }

    #[test]
    fn test_decode_base64_body() {
        // {"v":2}
        assert_eq!(decode_body("eyJ2IjoyfQ==", true).unwrap(), r#"{"v":2}"#);
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        assert!(decode_body("not base64!", true).is_err());
    }

    #[test]
    fn test_request_timeout_covers_navigation() {
        let renderer = ChromiumRenderer::new(BrowserOptions::default())
            .with_navigation_timeout(Duration::from_secs(90));
        assert!(renderer.request_timeout > Duration::from_secs(90));
        let default = ChromiumRenderer::new(BrowserOptions::default());
        assert!(default.request_timeout > Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS));
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let renderer = ChromiumRenderer::new(BrowserOptions {
            chromium_path: Some(PathBuf::from("/nonexistent/feed-relay/chrome")),
            no_sandbox: true,
        });
        let err = renderer.launch().await.err().unwrap();
        assert_eq!(err.kind(), "launch");
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_navigate_and_close() {
        let renderer = ChromiumRenderer::new(BrowserOptions {
            chromium_path: None,
            no_sandbox: true,
        });
        let mut session = renderer.launch().await.expect("launch failed");
        assert!(session.finished_requests().is_some());
        assert!(session.finished_requests().is_none());

        session
            .navigate(
                "data:text/html,<h1>Hello</h1>",
                WaitCondition::DomContentLoaded,
                Duration::from_secs(10),
            )
            .await
            .expect("navigation failed");

        session.close().await.expect("close failed");
    }
}
