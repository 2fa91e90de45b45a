use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::UtcDateTime;

#[derive(Debug)]
struct SlotInner<E> {
    events: Option<Vec<E>>,
    /// Monotonic store time, used for every freshness comparison.
    stored: Option<Instant>,
    /// Wall clock mirrors for status reads.
    last_fetch_at: Option<UtcDateTime>,
    last_success_at: Option<UtcDateTime>,
}

impl<E> Default for SlotInner<E> {
    fn default() -> Self {
        Self {
            events: None,
            stored: None,
            last_fetch_at: None,
            last_success_at: None,
        }
    }
}

/// One cached batch with its freshness bookkeeping.
///
/// All fields mutate together under one lock, so a status read racing a
/// store still sees a consistent (data, lastFetch) pair. A slot is
/// *fresh* while younger than the TTL and *stale-usable* while younger
/// than the stale TTL; beyond that the data is only returned on explicit
/// any-age reads (breaker-open short-circuit).
#[derive(Debug)]
pub struct CacheSlot<E> {
    inner: RwLock<SlotInner<E>>,
}

impl<E: Clone> Default for CacheSlot<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> CacheSlot<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SlotInner::default()),
        }
    }

    pub async fn store(&self, events: Vec<E>) {
        let mut inner = self.inner.write().await;
        let now = UtcDateTime::now();
        inner.events = Some(events);
        inner.stored = Some(Instant::now());
        inner.last_fetch_at = Some(now);
        inner.last_success_at = Some(now);
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = SlotInner::default();
    }

    /// Cached batch if stored within `ttl`.
    pub async fn fresh(&self, ttl: Duration) -> Option<Vec<E>> {
        let inner = self.inner.read().await;
        match (&inner.events, inner.stored) {
            (Some(events), Some(stored)) if stored.elapsed() < ttl => Some(events.clone()),
            _ => None,
        }
    }

    /// Cached batch if stored within `stale_ttl`.
    pub async fn stale_usable(&self, stale_ttl: Duration) -> Option<Vec<E>> {
        self.fresh(stale_ttl).await
    }

    /// Cached batch regardless of age.
    pub async fn any_age(&self) -> Option<Vec<E>> {
        let inner = self.inner.read().await;
        inner.events.clone()
    }

    /// Batch stored after `arrival`, if any. Lets a caller that waited on
    /// an in-flight fetch pick up that fetch's result instead of issuing
    /// its own request.
    pub async fn stored_since(&self, arrival: Instant) -> Option<Vec<E>> {
        let inner = self.inner.read().await;
        match (&inner.events, inner.stored) {
            (Some(events), Some(stored)) if stored > arrival => Some(events.clone()),
            _ => None,
        }
    }

    pub async fn status(&self, ttl: Duration, stale_ttl: Duration) -> SlotStatus {
        let inner = self.inner.read().await;
        let age = inner.stored.map(|stored| stored.elapsed());
        let has_data = inner.events.is_some();
        SlotStatus {
            has_data,
            item_count: inner.events.as_ref().map_or(0, Vec::len),
            last_fetch: inner.last_fetch_at,
            last_success: inner.last_success_at,
            age_seconds: age.map(|age| age.as_secs()),
            is_fresh: has_data && age.is_some_and(|age| age < ttl),
            is_stale: has_data && age.is_some_and(|age| age >= ttl && age < stale_ttl),
        }
    }
}

/// Read-only freshness view of one slot.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatus {
    pub has_data: bool,
    pub item_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<UtcDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<UtcDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<u64>,
    pub is_fresh: bool,
    pub is_stale: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_millis(50);
    const STALE_TTL: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn empty_slot_serves_nothing() {
        let slot: CacheSlot<u32> = CacheSlot::new();
        assert!(slot.fresh(TTL).await.is_none());
        assert!(slot.any_age().await.is_none());

        let status = slot.status(TTL, STALE_TTL).await;
        assert!(!status.has_data);
        assert!(!status.is_fresh);
        assert!(!status.is_stale);
        assert_eq!(status.item_count, 0);
    }

    #[tokio::test]
    async fn fresh_then_stale_then_expired() {
        let slot = CacheSlot::new();
        slot.store(vec![1u32, 2, 3]).await;

        assert_eq!(slot.fresh(TTL).await, Some(vec![1, 2, 3]));
        assert!(slot.status(TTL, STALE_TTL).await.is_fresh);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(slot.fresh(TTL).await.is_none());
        assert_eq!(slot.stale_usable(STALE_TTL).await, Some(vec![1, 2, 3]));
        assert!(slot.status(TTL, STALE_TTL).await.is_stale);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(slot.stale_usable(STALE_TTL).await.is_none());
        assert_eq!(slot.any_age().await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn stored_since_only_sees_later_stores() {
        let slot = CacheSlot::new();
        slot.store(vec![1u32]).await;

        let arrival = Instant::now();
        assert!(slot.stored_since(arrival).await.is_none());

        slot.store(vec![2u32]).await;
        assert_eq!(slot.stored_since(arrival).await, Some(vec![2]));
    }

    #[tokio::test]
    async fn clear_resets_all_bookkeeping() {
        let slot = CacheSlot::new();
        slot.store(vec![1u32]).await;
        slot.clear().await;

        let status = slot.status(TTL, STALE_TTL).await;
        assert!(!status.has_data);
        assert!(status.last_fetch.is_none());
        assert!(status.last_success.is_none());
        assert!(status.age_seconds.is_none());
    }
}
