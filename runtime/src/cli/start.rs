// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Start the relay: scheduler plus HTTP server until a shutdown signal.

use crate::config::RelayConfig;
use crate::refresher::Refresher;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use crate::rest;
use crate::scheduler::Scheduler;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// Run the relay with the given, already validated, configuration.
pub async fn run(config: RelayConfig) -> Result<()> {
    info!("starting feed-relay v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "target={} prefix={} interval={}ms settle={}ms",
        config.target_page_url,
        config.api_url_prefix,
        config.refresh_interval.as_millis(),
        config.settle_delay.as_millis()
    );

    let renderer: Arc<dyn Renderer> = Arc::new(
        ChromiumRenderer::new(config.browser.clone())
            .with_navigation_timeout(config.navigation_timeout),
    );
    let refresher = Arc::new(Refresher::new(&config, renderer));
    let scheduler = Scheduler::spawn(Arc::clone(&refresher), config.refresh_interval);

    let result = rest::serve(&config.listen_addr(), refresher, shutdown_signal()).await;

    scheduler.shutdown().await;
    info!("feed-relay stopped");
    result
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("received shutdown signal");
}
