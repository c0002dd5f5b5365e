// Copyright 2026 Feed Relay Contributors
// SPDX-License-Identifier: Apache-2.0

//! The single cached feed payload.
//!
//! The cache starts cold and turns warm on the first successful refresh.
//! Replacement swaps one `Arc` under a write lock, so readers see either
//! the old payload or the new one, never a mix.

use crate::extract::Extracted;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An extracted payload together with the exact bytes it arrived as.
#[derive(Debug)]
pub struct CachedPayload {
    value: Value,
    body: Bytes,
    refreshed_at: DateTime<Utc>,
    generation: u64,
}

impl CachedPayload {
    /// The payload as parsed JSON.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The upstream response text, served verbatim on every hit.
    pub fn body(&self) -> Bytes {
        self.body.clone()
    }

    pub fn refreshed_at(&self) -> DateTime<Utc> {
        self.refreshed_at
    }

    /// 1 for the first payload, incremented on every replacement.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Cold/warm state as reported by `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Cold,
    Warm,
}

/// Read-only summary of the cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub state: CacheState,
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Holder of the current payload. Written only by the refresher.
#[derive(Debug, Default)]
pub struct PayloadCache {
    current: RwLock<Option<Arc<CachedPayload>>>,
}

impl PayloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Immutable handle to the current payload, if any.
    pub async fn snapshot(&self) -> Option<Arc<CachedPayload>> {
        self.current.read().await.clone()
    }

    /// Replace the payload and return the new snapshot.
    pub(crate) async fn replace(&self, extracted: Extracted) -> Arc<CachedPayload> {
        let Extracted { value, raw } = extracted;
        let body = Bytes::from(raw);
        let mut current = self.current.write().await;
        let generation = current.as_ref().map_or(1, |p| p.generation + 1);
        let payload = Arc::new(CachedPayload {
            value,
            body,
            refreshed_at: Utc::now(),
            generation,
        });
        *current = Some(Arc::clone(&payload));
        payload
    }

    pub async fn status(&self) -> CacheStatus {
        match self.snapshot().await {
            Some(p) => CacheStatus {
                state: CacheState::Warm,
                generation: p.generation,
                refreshed_at: Some(p.refreshed_at),
            },
            None => CacheStatus {
                state: CacheState::Cold,
                generation: 0,
                refreshed_at: None,
            },
        }
    }
}
