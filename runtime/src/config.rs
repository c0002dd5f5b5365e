// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Relay configuration.
//!
//! The binary fills [`RelayConfig`] from CLI flags and environment
//! variables; tests build it directly from [`RelayConfig::default`].

use crate::error::ConfigError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 5_000;
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_LAUNCH_TIMEOUT_MS: u64 = 30_000;

/// Page readiness condition that ends a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitCondition {
    /// `DOMContentLoaded` fired.
    #[default]
    DomContentLoaded,
    /// The `load` event fired.
    Load,
}

impl FromStr for WaitCondition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "domcontentloaded" | "dom" => Ok(Self::DomContentLoaded),
            "load" => Ok(Self::Load),
            other => Err(ConfigError::UnknownOption {
                option: "wait-until",
                value: other.to_string(),
            }),
        }
    }
}

/// Which matching response wins when several fire during one page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// The last matching response observed replaces earlier ones.
    #[default]
    Last,
    /// The first matching response is kept; later ones are ignored.
    First,
}

impl FromStr for MatchPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last" => Ok(Self::Last),
            "first" => Ok(Self::First),
            other => Err(ConfigError::UnknownOption {
                option: "match-policy",
                value: other.to_string(),
            }),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::UnknownOption {
                option: "log-format",
                value: other.to_string(),
            }),
        }
    }
}

/// Browser launch options.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    /// Explicit Chromium binary; discovered on PATH when `None`.
    pub chromium_path: Option<PathBuf>,
    /// Disable the Chromium sandbox (needed in most containers).
    pub no_sandbox: bool,
}

/// Everything the relay needs to render, extract, cache and serve.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: String,
    pub port: u16,
    /// Page rendered on every refresh.
    pub target_page_url: String,
    /// Exact, case-sensitive prefix identifying the feed response.
    pub api_url_prefix: String,
    pub refresh_interval: Duration,
    /// Wait after navigation so late client-side requests can finish.
    pub settle_delay: Duration,
    pub navigation_timeout: Duration,
    pub launch_timeout: Duration,
    pub wait_until: WaitCondition,
    pub match_policy: MatchPolicy,
    pub browser: BrowserOptions,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            target_page_url: String::new(),
            api_url_prefix: String::new(),
            refresh_interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            navigation_timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
            launch_timeout: Duration::from_millis(DEFAULT_LAUNCH_TIMEOUT_MS),
            wait_until: WaitCondition::default(),
            match_policy: MatchPolicy::default(),
            browser: BrowserOptions::default(),
        }
    }
}

impl RelayConfig {
    /// Check the configuration before anything is launched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_http_url("target-url", &self.target_page_url)?;
        if self.api_url_prefix.is_empty() {
            return Err(ConfigError::Missing("api-prefix"));
        }
        check_http_url("api-prefix", &self.api_url_prefix)?;
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("refresh-interval-ms"));
        }
        if self.navigation_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("navigation-timeout-ms"));
        }
        if self.launch_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("launch-timeout-ms"));
        }
        Ok(())
    }

    /// Socket address string for the HTTP listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn check_http_url(option: &'static str, raw: &str) -> Result<(), ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::Missing(option));
    }
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        option,
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidUrl {
            option,
            value: raw.to_string(),
            reason: format!("unsupported scheme `{scheme}`"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelayConfig {
        RelayConfig {
            target_page_url: "https://www.example.com/discover".to_string(),
            api_url_prefix: "https://api.example.com/data".to_string(),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn test_defaults_match_deployment() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.refresh_interval, Duration::from_secs(30));
        assert_eq!(cfg.navigation_timeout, Duration::from_secs(60));
        assert_eq!(cfg.launch_timeout, Duration::from_secs(30));
        assert_eq!(cfg.match_policy, MatchPolicy::Last);
        assert_eq!(cfg.wait_until, WaitCondition::DomContentLoaded);
    }

    #[test]
    fn test_validate_accepts_http_urls() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_target() {
        let cfg = RelayConfig {
            target_page_url: String::new(),
            ..valid()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Missing("target-url"))
        ));
    }

    #[test]
    fn test_validate_rejects_non_http_prefix() {
        let cfg = RelayConfig {
            api_url_prefix: "ftp://api.example.com/data".to_string(),
            ..valid()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidUrl { option: "api-prefix", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let cfg = RelayConfig {
            refresh_interval: Duration::ZERO,
            ..valid()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ZeroDuration("refresh-interval-ms"))
        ));
    }

    #[test]
    fn test_option_parsing() {
        assert_eq!("load".parse::<WaitCondition>().unwrap(), WaitCondition::Load);
        assert_eq!(
            "DOMContentLoaded".parse::<WaitCondition>().unwrap(),
            WaitCondition::DomContentLoaded
        );
        assert_eq!("first".parse::<MatchPolicy>().unwrap(), MatchPolicy::First);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("largest".parse::<MatchPolicy>().is_err());
    }
}
