// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Renderer abstraction for headless page loads.
//!
//! Defines the `Renderer` and `RenderSession` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). A session
//! reports every network request the page completes while loading, which
//! is all the relay needs from a browser.

pub mod chromium;

use crate::config::WaitCondition;
use crate::error::RefreshError;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Lazily readable response body of a finished request.
#[async_trait]
pub trait ResponseBody: Send + Sync {
    /// Read the body as text.
    async fn text(&self) -> Result<String>;
}

/// A network request the page completed, with access to its body.
pub struct FinishedRequest {
    pub url: String,
    pub body: Box<dyn ResponseBody>,
}

impl FinishedRequest {
    pub fn new(url: impl Into<String>, body: Box<dyn ResponseBody>) -> Self {
        Self {
            url: url.into(),
            body,
        }
    }
}

impl fmt::Debug for FinishedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinishedRequest")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Body already held in memory.
#[derive(Debug, Clone)]
pub struct StaticBody(pub String);

#[async_trait]
impl ResponseBody for StaticBody {
    async fn text(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// A browser engine that starts one isolated session per refresh attempt.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Start a browser process with a fresh context and blank page.
    ///
    /// Every successful launch must be paired with exactly one
    /// [`RenderSession::close`].
    async fn launch(&self) -> Result<Box<dyn RenderSession>, RefreshError>;
}

/// One browser process, context and page.
#[async_trait]
pub trait RenderSession: Send {
    /// Take the stream of finished requests. Returns `None` once taken.
    ///
    /// Requests are reported in completion order, which is unrelated to
    /// when navigation itself completes.
    fn finished_requests(&mut self) -> Option<mpsc::UnboundedReceiver<FinishedRequest>>;

    /// Navigate to `url` and wait for `wait` or `timeout`, whichever comes first.
    async fn navigate(
        &mut self,
        url: &str,
        wait: WaitCondition,
        timeout: Duration,
    ) -> Result<(), RefreshError>;

    /// Tear down the page and the browser process.
    async fn close(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_body_text() {
        let body = StaticBody(r#"{"example":"payload"}"#.to_string());
        assert_eq!(body.text().await.unwrap(), r#"{"example":"payload"}"#);
    }

    #[test]
    fn test_finished_request_debug_omits_body() {
        let req = FinishedRequest::new(
            "https://api.example.com/data",
            Box::new(StaticBody("secret".to_string())),
        );
        let dbg = format!("{req:?}");
        assert!(dbg.contains("https://api.example.com/data"));
        assert!(!dbg.contains("secret"));
    }
}
