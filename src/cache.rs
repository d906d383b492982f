//! Analysis cache (SPEC_FULL.md §4.11): TTL-expiring, single-flight
//! cache over `AnalysisEngine::analyze` results, keyed by bill id.
//! Grounded on the teacher's `once_cell`/`tokio::sync::Mutex` caching
//! idiom, generalized with a per-key `Notify` so concurrent callers for
//! the same bill share one in-flight computation instead of racing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::error::Result;
use crate::model::Analysis;

#[derive(Clone)]
struct CacheEntry {
    value: Analysis,
    inserted_at: DateTime<Utc>,
}

enum Slot {
    Ready(CacheEntry),
    InFlight(Arc<Notify>),
}

/// TTL + single-flight cache. `get_or_insert_with` is the primary
/// entry point; `get`/`set`/`evict` exist for direct manipulation
/// (tests, explicit invalidation after a bill is re-synced).
pub struct AnalysisCache {
    ttl: Duration,
    slots: Mutex<HashMap<Uuid, Slot>>,
}

impl AnalysisCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, bill_id: Uuid) -> Option<Analysis> {
        let mut slots = self.slots.lock().await;
        match slots.get(&bill_id) {
            Some(Slot::Ready(entry)) => {
                if Utc::now().signed_duration_since(entry.inserted_at).to_std().unwrap_or_default() > self.ttl {
                    slots.remove(&bill_id);
                    None
                } else {
                    Some(entry.value.clone())
                }
            }
            _ => None,
        }
    }

    pub async fn set(&self, bill_id: Uuid, value: Analysis) {
        let mut slots = self.slots.lock().await;
        let previous = slots.insert(
            bill_id,
            Slot::Ready(CacheEntry {
                value,
                inserted_at: Utc::now(),
            }),
        );
        if let Some(Slot::InFlight(notify)) = previous {
            notify.notify_waiters();
        }
    }

    pub async fn evict(&self, bill_id: Uuid) {
        self.slots.lock().await.remove(&bill_id);
    }

    /// Returns the cached value if fresh; otherwise computes it via
    /// `compute`, ensuring only one caller per `bill_id` actually runs
    /// `compute` at a time. Concurrent callers wait on the in-flight
    /// computation and read its result.
    pub async fn get_or_insert_with<F, Fut>(&self, bill_id: Uuid, compute: F) -> Result<Analysis>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Analysis>>,
    {
        loop {
            let notify_to_await = {
                let slots = self.slots.lock().await;
                match slots.get(&bill_id) {
                    Some(Slot::Ready(entry)) => {
                        if Utc::now().signed_duration_since(entry.inserted_at).to_std().unwrap_or_default() <= self.ttl {
                            return Ok(entry.value.clone());
                        }
                        None
                    }
                    Some(Slot::InFlight(notify)) => Some(notify.clone()),
                    None => None,
                }
            };

            if let Some(notify) = notify_to_await {
                notify.notified().await;
                continue;
            }

            let notify = Arc::new(Notify::new());
            {
                let mut slots = self.slots.lock().await;
                slots.insert(bill_id, Slot::InFlight(notify.clone()));
            }

            let result = compute().await;
            let mut slots = self.slots.lock().await;
            match &result {
                Ok(value) => {
                    slots.insert(
                        bill_id,
                        Slot::Ready(CacheEntry {
                            value: value.clone(),
                            inserted_at: Utc::now(),
                        }),
                    );
                }
                Err(_) => {
                    slots.remove(&bill_id);
                }
            }
            drop(slots);
            notify.notify_waiters();
            return result;
        }
    }
}
