//! The bounded LRU policy cache, with single-flight coalescing across
//! concurrent callers resolving the same domain.
//!
//! Built on `lruttl::LruCacheWithTtl`, a generic LRU+TTL data structure,
//! but deliberately does not let it expire entries on
//! `max_age`: an entry whose `max_age` has elapsed must remain retrievable
//! so it can still serve as a conditional-fetch witness (its `pol_id` is
//! compared against a fresh TXT lookup). Only a very long backstop TTL and
//! plain LRU capacity bound the cache's lifetime and size.

use dashmap::DashMap;
use mta_sts::{Domain, PolicyBody};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Entries older than this are dropped even as a conditional-fetch
/// witness. Bounds unbounded growth from domains that are queried once
/// and never again, independent of LRU capacity.
const BACKSTOP_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 30);

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub inserted_at: Instant,
    pub pol_id: String,
    pub pol_body: Arc<PolicyBody>,
}

impl CacheEntry {
    pub fn new(pol_id: String, pol_body: Arc<PolicyBody>) -> Self {
        Self {
            inserted_at: Instant::now(),
            pol_id,
            pol_body,
        }
    }

    /// Same id/body, timestamp reset to now — used when a conditional
    /// fetch reports the policy id is unchanged.
    pub fn refreshed(&self) -> Self {
        Self {
            inserted_at: Instant::now(),
            pol_id: self.pol_id.clone(),
            pol_body: self.pol_body.clone(),
        }
    }

    /// True when `T + max_age >= now`, i.e. usable for a policy decision
    /// rather than merely as a conditional-fetch witness.
    pub fn is_live(&self, now: Instant) -> bool {
        self.inserted_at + Duration::from_secs(self.pol_body.max_age) >= now
    }
}

pub struct Cache {
    store: lruttl::LruCacheWithTtl<Domain, CacheEntry>,
    flights: DashMap<Domain, Arc<OnceCell<Option<CacheEntry>>>>,
}

impl Cache {
    pub fn new(capacity: usize) -> Self {
        Self {
            store: lruttl::LruCacheWithTtl::new_named("mta-sts-policy", capacity),
            flights: DashMap::new(),
        }
    }

    pub fn get(&self, domain: &Domain) -> Option<CacheEntry> {
        self.store.get(domain)
    }

    pub fn set(&self, domain: Domain, entry: CacheEntry) {
        self.store.insert(domain, entry, Instant::now() + BACKSTOP_TTL);
    }

    /// Run `compute` for `domain`, guaranteeing that at most one call to
    /// `compute` is in flight per domain at a time; other concurrent
    /// callers for the same domain await that single computation instead
    /// of starting their own.
    ///
    /// `compute` is expected to perform the full get-resolve-store cycle
    /// (it is handed no arguments, so it must close over whatever
    /// cache/resolver state it needs) and return the resulting entry, or
    /// `None` if no usable entry resulted.
    pub async fn get_or_compute<F, Fut>(&self, domain: Domain, compute: F) -> Option<CacheEntry>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<CacheEntry>>,
    {
        let cell = self
            .flights
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell.get_or_init(compute).await.clone();

        // Once this flight has landed, drop its marker so that the next
        // cold call starts a fresh computation rather than replaying this
        // one's (possibly now-stale) result.
        self.flights.remove_if(&domain, |_, v| Arc::ptr_eq(v, &cell));

        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use mta_sts::PolicyMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_entry() -> CacheEntry {
        CacheEntry::new(
            "abc".to_string(),
            Arc::new(PolicyBody {
                mode: PolicyMode::Enforce,
                mx: vec!["mail.example.com".to_string()],
                max_age: 86400,
            }),
        )
    }

    #[test]
    fn get_set_roundtrip() {
        let cache = Cache::new(10);
        let domain = Domain::parse("example.com").unwrap();
        assert!(cache.get(&domain).is_none());
        cache.set(domain.clone(), sample_entry());
        let entry = cache.get(&domain).unwrap();
        assert_eq!(entry.pol_id, "abc");
        assert!(entry.is_live(Instant::now()));
    }

    #[test]
    fn stale_entry_is_not_live_but_still_gettable() {
        let entry = CacheEntry {
            inserted_at: Instant::now() - Duration::from_secs(100),
            pol_id: "abc".to_string(),
            pol_body: Arc::new(PolicyBody {
                mode: PolicyMode::Enforce,
                mx: vec!["mail.example.com".to_string()],
                max_age: 10,
            }),
        };
        assert!(!entry.is_live(Instant::now()));

        let cache = Cache::new(10);
        let domain = Domain::parse("example.com").unwrap();
        cache.set(domain.clone(), entry);
        assert!(cache.get(&domain).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_flight_runs_compute_once() {
        let cache = Arc::new(Cache::new(10));
        let domain = Domain::parse("example.com").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..8 {
            let cache = cache.clone();
            let domain = domain.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(domain, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Some(sample_entry())
                    })
                    .await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn later_cold_call_recomputes() {
        let cache = Cache::new(10);
        let domain = Domain::parse("example.com").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            cache
                .get_or_compute(domain.clone(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some(sample_entry())
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
