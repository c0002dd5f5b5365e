// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! `feed-relay fetch`: render the target page once and print the payload.

use crate::config::RelayConfig;
use crate::refresher::Refresher;
use crate::renderer::chromium::ChromiumRenderer;
use anyhow::Result;
use std::sync::Arc;

/// Run the fetch command.
pub async fn run(config: RelayConfig, pretty: bool) -> Result<()> {
    let renderer = Arc::new(
        ChromiumRenderer::new(config.browser.clone())
            .with_navigation_timeout(config.navigation_timeout),
    );
    let refresher = Refresher::new(&config, renderer);

    let payload = refresher.fetch_once().await?;
    if pretty {
        println!("{}", serde_json::to_string_pretty(&payload.value)?);
    } else {
        println!("{}", payload.raw);
    }
    Ok(())
}
