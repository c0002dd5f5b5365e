// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types for refresh attempts and configuration.

/// Why a single render-and-extract attempt produced no payload.
///
/// Every variant is absorbed by the refresher (logged, cache untouched)
/// except on the cold path, where it becomes an HTTP 500. Variants carry
/// rendered messages so the type stays `Clone` and one outcome can be
/// handed to every request sharing a cold fetch.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser launch timed out after {0}ms")]
    LaunchTimeout(u64),

    #[error("navigation timed out after {0}ms")]
    NavigationTimeout(u64),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("no response matching {prefix} was observed")]
    ExtractionMiss { prefix: String },

    #[error("refresh attempt panicked: {0}")]
    Panicked(String),
}

impl RefreshError {
    /// Short stable label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Launch(_) => "launch",
            Self::LaunchTimeout(_) => "launch_timeout",
            Self::NavigationTimeout(_) => "navigation_timeout",
            Self::Navigation(_) => "navigation",
            Self::ExtractionMiss { .. } => "extraction_miss",
            Self::Panicked(_) => "panic",
        }
    }
}

/// Invalid or incomplete configuration. Fatal at startup.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required option --{0}")]
    Missing(&'static str),

    #[error("--{option} `{value}` is not a valid http(s) URL: {reason}")]
    InvalidUrl {
        option: &'static str,
        value: String,
        reason: String,
    },

    #[error("--{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("unknown value `{value}` for --{option}")]
    UnknownOption { option: &'static str, value: String },
}
