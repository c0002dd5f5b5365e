// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the feed-relay binary.

pub mod doctor;
pub mod fetch_cmd;
pub mod start;

use crate::config::{BrowserOptions, LogFormat, MatchPolicy, RelayConfig, WaitCondition};
use crate::config::{
    DEFAULT_LAUNCH_TIMEOUT_MS, DEFAULT_NAVIGATION_TIMEOUT_MS, DEFAULT_PORT,
    DEFAULT_REFRESH_INTERVAL_MS, DEFAULT_SETTLE_DELAY_MS,
};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Options shared by every command that renders the target page.
#[derive(Args, Debug, Clone)]
pub struct RelayArgs {
    /// Page rendered on every refresh
    #[arg(long, env = "FEED_RELAY_TARGET_URL")]
    pub target_url: String,

    /// URL prefix of the network response carrying the feed
    #[arg(long, env = "FEED_RELAY_API_PREFIX")]
    pub api_prefix: String,

    /// Wait after navigation for late client-side requests (ms)
    #[arg(long, env = "FEED_RELAY_SETTLE_DELAY_MS", default_value_t = DEFAULT_SETTLE_DELAY_MS)]
    pub settle_delay_ms: u64,

    /// Navigation deadline (ms)
    #[arg(long, env = "FEED_RELAY_NAVIGATION_TIMEOUT_MS", default_value_t = DEFAULT_NAVIGATION_TIMEOUT_MS)]
    pub navigation_timeout_ms: u64,

    /// Browser startup deadline (ms)
    #[arg(long, env = "FEED_RELAY_LAUNCH_TIMEOUT_MS", default_value_t = DEFAULT_LAUNCH_TIMEOUT_MS)]
    pub launch_timeout_ms: u64,

    /// Readiness condition ending navigation (domcontentloaded, load)
    #[arg(long, env = "FEED_RELAY_WAIT_UNTIL", default_value = "domcontentloaded")]
    pub wait_until: WaitCondition,

    /// Which matching response wins (last, first)
    #[arg(long, env = "FEED_RELAY_MATCH_POLICY", default_value = "last")]
    pub match_policy: MatchPolicy,

    /// Chromium binary; discovered automatically when omitted
    #[arg(long, env = "FEED_RELAY_CHROMIUM_PATH")]
    pub chromium_path: Option<PathBuf>,

    /// Run Chromium without its sandbox
    #[arg(long, env = "FEED_RELAY_NO_SANDBOX")]
    pub no_sandbox: bool,
}

/// Options of the HTTP server.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub relay: RelayArgs,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "FEED_RELAY_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Period of the background refresh (ms)
    #[arg(long, env = "FEED_RELAY_REFRESH_INTERVAL_MS", default_value_t = DEFAULT_REFRESH_INTERVAL_MS)]
    pub refresh_interval_ms: u64,
}

impl RelayArgs {
    pub fn into_config(self) -> RelayConfig {
        RelayConfig {
            target_page_url: self.target_url,
            api_url_prefix: self.api_prefix,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            launch_timeout: Duration::from_millis(self.launch_timeout_ms),
            wait_until: self.wait_until,
            match_policy: self.match_policy,
            browser: BrowserOptions {
                chromium_path: self.chromium_path,
                no_sandbox: self.no_sandbox,
            },
            ..RelayConfig::default()
        }
    }
}

impl ServeArgs {
    pub fn into_config(self) -> RelayConfig {
        RelayConfig {
            bind: self.bind,
            port: self.port,
            refresh_interval: Duration::from_millis(self.refresh_interval_ms),
            ..self.relay.into_config()
        }
    }
}

/// Install the global tracing subscriber and route panics through it.
pub fn init_tracing(format: LogFormat, verbose: bool) {
    let default_directive = if verbose {
        "feed_relay=debug"
    } else {
        "feed_relay=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    if installed.is_err() {
        return;
    }

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("panic: {info}");
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        serve: ServeArgs,
    }

    #[test]
    fn test_serve_args_defaults() {
        let h = Harness::try_parse_from([
            "feed-relay",
            "--target-url",
            "https://www.example.com/discover",
            "--api-prefix",
            "https://api.example.com/data",
        ])
        .unwrap();
        let cfg = h.serve.into_config();
        assert_eq!(cfg.target_page_url, "https://www.example.com/discover");
        assert_eq!(cfg.api_url_prefix, "https://api.example.com/data");
        assert_eq!(cfg.refresh_interval, Duration::from_secs(30));
        assert_eq!(cfg.settle_delay, Duration::from_secs(5));
        assert_eq!(cfg.match_policy, MatchPolicy::Last);
        assert!(!cfg.browser.no_sandbox);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_serve_args_overrides() {
        let h = Harness::try_parse_from([
            "feed-relay",
            "--target-url",
            "https://www.example.com/",
            "--api-prefix",
            "https://api.example.com/",
            "--port",
            "8080",
            "--refresh-interval-ms",
            "1000",
            "--wait-until",
            "load",
            "--match-policy",
            "first",
            "--no-sandbox",
        ])
        .unwrap();
        let cfg = h.serve.into_config();
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.refresh_interval, Duration::from_secs(1));
        assert_eq!(cfg.wait_until, WaitCondition::Load);
        assert_eq!(cfg.match_policy, MatchPolicy::First);
        assert!(cfg.browser.no_sandbox);
    }

    #[test]
    fn test_bad_match_policy_rejected() {
        let res = Harness::try_parse_from([
            "feed-relay",
            "--target-url",
            "https://www.example.com/",
            "--api-prefix",
            "https://api.example.com/",
            "--match-policy",
            "largest",
        ]);
        assert!(res.is_err());
    }
}
