// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! Render, extract, and cache: one refresh cycle end to end.
//!
//! The refresher owns the [`PayloadCache`]. Two paths write to it:
//!
//! - [`Refresher::refresh`]: the scheduled path. Guarded by an in-flight
//!   flag; a call that finds a refresh already running is dropped.
//! - [`Refresher::cold_fetch`]: the cold-start path used by the HTTP
//!   endpoint. Independent of the in-flight flag, so it can race a
//!   scheduled refresh, but concurrent cold requests share one fetch.
//!
//! A failed attempt never empties the cache and never surfaces as an error
//! on the scheduled path.

use crate::cache::{CachedPayload, PayloadCache};
use crate::config::{MatchPolicy, RelayConfig, WaitCondition};
use crate::error::RefreshError;
use crate::extract::{Extracted, Extraction, Extractor};
use crate::renderer::{FinishedRequest, RenderSession, Renderer};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<CachedPayload>, RefreshError>>>;

/// What started a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Cold,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Cold => "cold",
        }
    }
}

/// Result of a scheduled refresh call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache now holds a new payload.
    Updated { generation: u64 },
    /// The attempt ran and failed; the cache is unchanged.
    Failed(RefreshError),
    /// Another scheduled refresh was in flight; nothing ran.
    Skipped,
}

/// Counters exposed on `/health`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub skipped: u64,
    pub launches: u64,
    pub closes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
    launches: AtomicU64,
    closes: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RefreshStats {
        RefreshStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            launches: self.launches.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
        }
    }
}

/// Timing and matching parameters for one render cycle.
#[derive(Debug, Clone)]
struct CycleSettings {
    target_url: String,
    wait_until: WaitCondition,
    navigation_timeout: Duration,
    settle_delay: Duration,
    launch_timeout: Duration,
    match_policy: MatchPolicy,
}

/// Clears the in-flight flag when dropped, including on panic.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owner of the cached payload and of every render cycle.
pub struct Refresher {
    renderer: Arc<dyn Renderer>,
    extractor: Extractor,
    settings: CycleSettings,
    cache: PayloadCache,
    in_flight: AtomicBool,
    cold: Mutex<Option<SharedFetch>>,
    counters: Counters,
}

impl Refresher {
    pub fn new(config: &RelayConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            renderer,
            extractor: Extractor::new(config.api_url_prefix.clone()),
            settings: CycleSettings {
                target_url: config.target_page_url.clone(),
                wait_until: config.wait_until,
                navigation_timeout: config.navigation_timeout,
                settle_delay: config.settle_delay,
                launch_timeout: config.launch_timeout,
                match_policy: config.match_policy,
            },
            cache: PayloadCache::new(),
            in_flight: AtomicBool::new(false),
            cold: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// The cache this refresher writes. Read-only to everyone else.
    pub fn cache(&self) -> &PayloadCache {
        &self.cache
    }

    pub fn stats(&self) -> RefreshStats {
        self.counters.snapshot()
    }

    /// Whether a scheduled refresh is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one scheduled refresh unless one is already in flight.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = self.try_begin() else {
            Counters::bump(&self.counters.skipped);
            debug!("refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        };
        match self.attempt(Trigger::Scheduled).await {
            Ok(payload) => RefreshOutcome::Updated {
                generation: payload.generation(),
            },
            Err(e) => RefreshOutcome::Failed(e),
        }
    }

    /// Return the cached payload, fetching it inline when the cache is cold.
    ///
    /// Concurrent callers share a single fetch. The fetch runs on its own
    /// task, so it completes even if every caller goes away, and that task
    /// empties the slot before its result is observable. A later cold
    /// request therefore never sees a finished fetch.
    pub async fn cold_fetch(self: &Arc<Self>) -> Result<Arc<CachedPayload>, RefreshError> {
        if let Some(payload) = self.cache.snapshot().await {
            return Ok(payload);
        }

        let fetch = {
            let mut slot = self.cold.lock().await;
            // A fetch may have finished while we waited for the lock.
            if let Some(payload) = self.cache.snapshot().await {
                return Ok(payload);
            }
            match slot.as_ref() {
                Some(shared) => shared.clone(),
                None => {
                    let this = Arc::clone(self);
                    let task = tokio::spawn(async move {
                        let result = this.attempt(Trigger::Cold).await;
                        *this.cold.lock().await = None;
                        result
                    });
                    let shared = async move {
                        task.await
                            .unwrap_or_else(|e| Err(RefreshError::Panicked(e.to_string())))
                    }
                    .boxed()
                    .shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };

        let result = fetch.clone().await;

        // Only reachable when the fetch task itself died before clearing.
        let mut slot = self.cold.lock().await;
        if slot.as_ref().is_some_and(|s| s.ptr_eq(&fetch)) {
            *slot = None;
        }
        result
    }

    /// Render the target page once and return the extracted payload.
    ///
    /// Does not touch the cache. The render session is closed on every
    /// path out of this function.
    pub async fn fetch_once(&self) -> Result<Extracted, RefreshError> {
        let launch_ms = self.settings.launch_timeout.as_millis() as u64;
        let mut session =
            match tokio::time::timeout(self.settings.launch_timeout, self.renderer.launch()).await {
                Ok(Ok(session)) => session,
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(RefreshError::LaunchTimeout(launch_ms)),
            };
        Counters::bump(&self.counters.launches);

        let outcome = AssertUnwindSafe(self.load_and_extract(session.as_mut()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(RefreshError::Panicked(panic_message(panic.as_ref()))));

        if let Err(e) = session.close().await {
            warn!("render session close failed: {e:#}");
        }
        Counters::bump(&self.counters.closes);

        outcome
    }

    fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.in_flight))
    }

    /// One counted attempt that replaces the cache on success only.
    async fn attempt(&self, trigger: Trigger) -> Result<Arc<CachedPayload>, RefreshError> {
        Counters::bump(&self.counters.attempts);
        let started = Instant::now();
        match self.fetch_once().await {
            Ok(extracted) => {
                let payload = self.cache.replace(extracted).await;
                Counters::bump(&self.counters.successes);
                info!(
                    "{} refresh succeeded: generation={} elapsed_ms={}",
                    trigger.as_str(),
                    payload.generation(),
                    started.elapsed().as_millis()
                );
                Ok(payload)
            }
            Err(e) => {
                Counters::bump(&self.counters.failures);
                warn!(
                    "{} refresh failed ({}), keeping previous payload: {e} elapsed_ms={}",
                    trigger.as_str(),
                    e.kind(),
                    started.elapsed().as_millis()
                );
                Err(e)
            }
        }
    }

    async fn load_and_extract(
        &self,
        session: &mut dyn RenderSession,
    ) -> Result<Extracted, RefreshError> {
        let mut requests = session.finished_requests();
        let mut extraction = Extraction::new(self.settings.match_policy);

        let settle_delay = self.settings.settle_delay;
        let load = async {
            session
                .navigate(
                    &self.settings.target_url,
                    self.settings.wait_until,
                    self.settings.navigation_timeout,
                )
                .await?;
            tokio::time::sleep(settle_delay).await;
            Ok::<(), RefreshError>(())
        };
        tokio::pin!(load);

        let loaded = loop {
            tokio::select! {
                res = &mut load => break res,
                Some(request) = next_request(&mut requests) => {
                    self.offer(&mut extraction, &request).await;
                }
            }
        };
        loaded?;

        // Requests that finished before the settle delay ran out but were
        // not yet consumed still count.
        if let Some(rx) = requests.as_mut() {
            while let Ok(request) = rx.try_recv() {
                self.offer(&mut extraction, &request).await;
            }
        }

        debug!("{} matching response(s) decoded", extraction.matched());
        extraction
            .into_payload()
            .ok_or_else(|| RefreshError::ExtractionMiss {
                prefix: self.extractor.prefix().to_string(),
            })
    }

    async fn offer(&self, extraction: &mut Extraction, request: &FinishedRequest) {
        if let Some(extracted) = self.extractor.try_extract(request).await {
            extraction.offer(extracted);
        }
    }
}

async fn next_request(
    requests: &mut Option<mpsc::UnboundedReceiver<FinishedRequest>>,
) -> Option<FinishedRequest> {
    match requests {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
