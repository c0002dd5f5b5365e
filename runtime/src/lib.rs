// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! feed-relay: a scrape-and-cache relay for a client-rendered JSON feed.
//!
//! A headless browser loads the target page, the network response whose
//! URL starts with the configured prefix is captured and decoded, and the
//! resulting JSON is kept in memory and served over HTTP. A background
//! scheduler keeps it fresh; failed refreshes leave the last good payload
//! in place.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod refresher;
pub mod renderer;
pub mod rest;
pub mod scheduler;

pub use cache::{CachedPayload, PayloadCache};
pub use config::RelayConfig;
pub use error::{ConfigError, RefreshError};
pub use refresher::{RefreshOutcome, Refresher};
