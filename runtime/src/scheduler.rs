// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Periodic refresh loop.
//!
//! Fires once immediately and then every `period`. Each tick spawns a
//! refresh and moves on without waiting for it; overlap is handled by the
//! refresher's in-flight flag. Ticks are plain wall-clock ticks with no
//! backoff or jitter.

use crate::refresher::{RefreshOutcome, Refresher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};

/// Handle to the running refresh loop.
pub struct Scheduler {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn the loop on the current runtime.
    pub fn spawn(refresher: Arc<Refresher>, period: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let stop = Arc::clone(&shutdown);
        let handle = tokio::spawn(async move {
            tracing::info!("refresh scheduler started: period={}ms", period.as_millis());
            let mut ticker = tokio::time::interval(period);
            let mut refreshes = JoinSet::new();

            loop {
                tokio::select! {
                    _ = stop.notified() => {
                        tracing::info!("refresh scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let refresher = Arc::clone(&refresher);
                        refreshes.spawn(async move { refresher.refresh().await });
                    }
                }
                while let Some(done) = refreshes.try_join_next() {
                    log_finished(done);
                }
            }

            // Let in-flight refreshes finish so no browser is left behind.
            while let Some(done) = refreshes.join_next().await {
                log_finished(done);
            }
            tracing::info!("refresh scheduler stopped");
        });
        Self { shutdown, handle }
    }

    /// Stop ticking and wait for every spawned refresh to finish.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            tracing::error!("refresh scheduler task failed: {e}");
        }
    }
}

fn log_finished(done: Result<RefreshOutcome, tokio::task::JoinError>) {
    match done {
        Ok(RefreshOutcome::Skipped) => tracing::debug!("scheduled tick skipped"),
        Ok(_) => {}
        Err(e) => tracing::error!("refresh task died: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RelayConfig, WaitCondition};
    use crate::error::RefreshError;
    use crate::renderer::{FinishedRequest, RenderSession, Renderer, StaticBody};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::mpsc;

    /// Sessions whose navigation takes `delay` of (virtual) time.
    struct Slow {
        delay: Duration,
        launches: Arc<AtomicU64>,
    }

    struct SlowSession {
        delay: Duration,
        tx: mpsc::UnboundedSender<FinishedRequest>,
        rx: Option<mpsc::UnboundedReceiver<FinishedRequest>>,
    }

    #[async_trait]
    impl Renderer for Slow {
        async fn launch(&self) -> Result<Box<dyn RenderSession>, RefreshError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            Ok(Box::new(SlowSession {
                delay: self.delay,
                tx,
                rx: Some(rx),
            }))
        }
    }

    #[async_trait]
    impl RenderSession for SlowSession {
        fn finished_requests(&mut self) -> Option<mpsc::UnboundedReceiver<FinishedRequest>> {
            self.rx.take()
        }

        async fn navigate(
            &mut self,
            _url: &str,
            _wait: WaitCondition,
            _timeout: Duration,
        ) -> Result<(), RefreshError> {
            tokio::time::sleep(self.delay).await;
            let _ = self.tx.send(FinishedRequest::new(
                "https://api.example.com/data",
                Box::new(StaticBody("[1]".to_string())),
            ));
            Ok(())
        }

        async fn close(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn refresher(delay: Duration) -> (Arc<Refresher>, Arc<AtomicU64>) {
        let launches = Arc::new(AtomicU64::new(0));
        let cfg = RelayConfig {
            target_page_url: "https://www.example.com/".to_string(),
            api_url_prefix: "https://api.example.com/data".to_string(),
            settle_delay: Duration::ZERO,
            ..RelayConfig::default()
        };
        let renderer = Slow {
            delay,
            launches: Arc::clone(&launches),
        };
        (Arc::new(Refresher::new(&cfg, Arc::new(renderer))), launches)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_immediately_then_periodically() {
        let (refresher, launches) = refresher(Duration::from_millis(10));
        let scheduler = Scheduler::spawn(Arc::clone(&refresher), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert!(refresher.cache().snapshot().await.is_some());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(launches.load(Ordering::SeqCst), 3);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_tick_is_dropped() {
        // Each render outlasts the period, so every other tick finds a
        // refresh already in flight.
        let (refresher, launches) = refresher(Duration::from_secs(45));
        let scheduler = Scheduler::spawn(Arc::clone(&refresher), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.stats().skipped, 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_refresh() {
        let (refresher, _) = refresher(Duration::from_secs(20));
        let scheduler = Scheduler::spawn(Arc::clone(&refresher), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(refresher.is_refreshing());

        scheduler.shutdown().await;
        assert!(!refresher.is_refreshing());
        assert!(refresher.cache().snapshot().await.is_some());
    }
}
