// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Feed extraction from finished network requests.
//!
//! A request is interesting when its URL starts with the configured
//! prefix: an exact, case-sensitive byte prefix with no pattern language.
//! A matching body that is not JSON is logged and treated as a non-match.

use crate::config::MatchPolicy;
use crate::renderer::FinishedRequest;
use serde_json::Value;
use tracing::{debug, warn};

/// A decoded feed response and the exact text it was decoded from.
///
/// The text is what gets served; the value is kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub raw: String,
}

impl Extracted {
    /// Decode `raw` as JSON, keeping the original text.
    pub fn parse(raw: String) -> serde_json::Result<Self> {
        let value = serde_json::from_str::<Value>(&raw)?;
        Ok(Self { value, raw })
    }
}

/// Decides which finished requests carry the feed and decodes them.
#[derive(Debug, Clone)]
pub struct Extractor {
    prefix: String,
}

impl Extractor {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `url` starts with the configured prefix.
    pub fn matches(&self, url: &str) -> bool {
        url.starts_with(&self.prefix)
    }

    /// Decode the request's body when its URL matches.
    ///
    /// Body read and parse failures are logged and yield `None`.
    pub async fn try_extract(&self, request: &FinishedRequest) -> Option<Extracted> {
        if !self.matches(&request.url) {
            return None;
        }
        let text = match request.body.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!("could not read body of {}: {e:#}", request.url);
                return None;
            }
        };
        match Extracted::parse(text) {
            Ok(extracted) => {
                debug!(
                    "extracted {} byte payload from {}",
                    extracted.raw.len(),
                    request.url
                );
                Some(extracted)
            }
            Err(e) => {
                warn!("matching response {} is not JSON: {e}", request.url);
                None
            }
        }
    }
}

/// Payload candidates observed during one page load.
#[derive(Debug, Default)]
pub struct Extraction {
    policy: MatchPolicy,
    value: Option<Extracted>,
    matched: usize,
}

impl Extraction {
    pub fn new(policy: MatchPolicy) -> Self {
        Self {
            policy,
            value: None,
            matched: 0,
        }
    }

    /// Record a decoded candidate according to the match policy.
    pub fn offer(&mut self, value: Extracted) {
        self.matched += 1;
        match self.policy {
            MatchPolicy::Last => self.value = Some(value),
            MatchPolicy::First => {
                if self.value.is_none() {
                    self.value = Some(value);
                }
            }
        }
    }

    /// Number of decoded candidates offered so far.
    pub fn matched(&self) -> usize {
        self.matched
    }

    pub fn into_payload(self) -> Option<Extracted> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::StaticBody;
    use serde_json::json;

    fn request(url: &str, body: &str) -> FinishedRequest {
        FinishedRequest::new(url, Box::new(StaticBody(body.to_string())))
    }

    fn candidate(raw: &str) -> Extracted {
        Extracted::parse(raw.to_string()).unwrap()
    }

    #[test]
    fn test_prefix_boundary() {
        let ex = Extractor::new("https://api.example.com/data");
        assert!(ex.matches("https://api.example.com/data/v2?x=1"));
        assert!(ex.matches("https://api.example.com/data"));
        assert!(!ex.matches("https://api.example.org/data"));
        assert!(!ex.matches("https://API.example.com/data"));
        assert!(!ex.matches("http://api.example.com/data"));
    }

    #[tokio::test]
    async fn test_extract_matching_json() {
        let ex = Extractor::new("https://api.example.com/data");
        let got = ex
            .try_extract(&request(
                "https://api.example.com/data?page=1",
                r#"{"example":"payload"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(got.value, json!({"example": "payload"}));
        assert_eq!(got.raw, r#"{"example":"payload"}"#);
    }

    #[tokio::test]
    async fn test_extract_keeps_original_text() {
        let ex = Extractor::new("https://api.example.com/data");
        let body = "{\"zeta\": 1,\n \"alpha\": [2, 3]}";
        let got = ex
            .try_extract(&request("https://api.example.com/data", body))
            .await
            .unwrap();
        assert_eq!(got.raw, body);
        assert_eq!(got.value, json!({"alpha": [2, 3], "zeta": 1}));
    }

    #[tokio::test]
    async fn test_non_matching_url_ignored() {
        let ex = Extractor::new("https://api.example.com/data");
        let got = ex
            .try_extract(&request("https://cdn.example.com/app.js", r#"{"v":1}"#))
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_invalid_json_is_a_miss() {
        let ex = Extractor::new("https://api.example.com/data");
        let got = ex
            .try_extract(&request("https://api.example.com/data", "<html>oops</html>"))
            .await;
        assert!(got.is_none());
    }

    #[test]
    fn test_last_match_wins() {
        let mut ext = Extraction::new(MatchPolicy::Last);
        ext.offer(candidate(r#"{"v":1}"#));
        ext.offer(candidate(r#"{"v":2}"#));
        assert_eq!(ext.matched(), 2);
        assert_eq!(ext.into_payload().unwrap().raw, r#"{"v":2}"#);
    }

    #[test]
    fn test_first_match_policy() {
        let mut ext = Extraction::new(MatchPolicy::First);
        ext.offer(candidate(r#"{"v":1}"#));
        ext.offer(candidate(r#"{"v":2}"#));
        assert_eq!(ext.into_payload().unwrap().raw, r#"{"v":1}"#);
    }

    #[test]
    fn test_empty_extraction() {
        let ext = Extraction::new(MatchPolicy::Last);
        assert_eq!(ext.matched(), 0);
        assert!(ext.into_payload().is_none());
    }
}
