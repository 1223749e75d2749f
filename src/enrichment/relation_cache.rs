//! Memoized per-artist concert facts with single-flight fetches.
//!
//! The first caller for an id becomes the leader and performs the remote
//! fetch; callers arriving while it runs block on the same in-flight slot and
//! receive the leader's result. Successes stay cached for the lifetime of the
//! cache object; failures are handed to the current waiters and then
//! forgotten so the next call retries.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::catalog::models::LocationFacts;
use crate::error::FetchError;

/// Remote source of relation facts.
pub trait RelationSource: Send + Sync {
    fn fetch_relation(&self, artist_id: u32) -> Result<LocationFacts, FetchError>;
}

pub type RelationResult = Result<Arc<LocationFacts>, FetchError>;

#[derive(Default)]
struct InFlight {
    result: Mutex<Option<RelationResult>>,
    ready: Condvar,
}

impl InFlight {
    fn complete(&self, result: RelationResult) {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(result);
        self.ready.notify_all();
    }

    fn wait(&self) -> RelationResult {
        let mut slot = self.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

enum Slot {
    Ready(Arc<LocationFacts>),
    InFlight(Arc<InFlight>),
}

enum Role {
    Leader(Arc<InFlight>),
    Waiter(Arc<InFlight>),
}

/// Per-id relation cache. Share it behind an `Arc`.
pub struct RelationCache {
    source: Arc<dyn RelationSource>,
    slots: Mutex<HashMap<u32, Slot>>,
}

/// Releases an abandoned in-flight slot if the leader unwinds mid-fetch.
struct LeaderGuard<'a> {
    cache: &'a RelationCache,
    artist_id: u32,
    flight: Arc<InFlight>,
    finished: bool,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.cache.lock_slots().remove(&self.artist_id);
        self.flight.complete(Err(FetchError::Network(
            "relation fetch aborted".to_string(),
        )));
    }
}

impl RelationCache {
    pub fn new(source: Arc<dyn RelationSource>) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<u32, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, artist_id: u32) -> Result<Role, Arc<LocationFacts>> {
        let mut slots = self.lock_slots();
        let existing = match slots.get(&artist_id) {
            Some(Slot::Ready(facts)) => return Err(Arc::clone(facts)),
            Some(Slot::InFlight(flight)) => Some(Arc::clone(flight)),
            None => None,
        };
        match existing {
            Some(flight) => Ok(Role::Waiter(flight)),
            None => {
                let flight = Arc::new(InFlight::default());
                slots.insert(artist_id, Slot::InFlight(Arc::clone(&flight)));
                Ok(Role::Leader(flight))
            }
        }
    }

    /// Returns the concert facts for `artist_id`, fetching them at most once
    /// concurrently.
    pub fn fetch_relation(&self, artist_id: u32) -> RelationResult {
        let flight = match self.claim(artist_id) {
            Err(cached) => return Ok(cached),
            Ok(Role::Waiter(flight)) => {
                debug!("Relation {artist_id}: joining in-flight fetch");
                return flight.wait();
            }
            Ok(Role::Leader(flight)) => flight,
        };

        let mut guard = LeaderGuard {
            cache: self,
            artist_id,
            flight,
            finished: false,
        };
        debug!("Relation {artist_id}: fetching from source");
        let result = self.source.fetch_relation(artist_id).map(Arc::new);
        {
            let mut slots = self.lock_slots();
            match &result {
                Ok(facts) => {
                    slots.insert(artist_id, Slot::Ready(Arc::clone(facts)));
                }
                Err(error) => {
                    warn!("Relation {artist_id}: fetch failed, not caching: {error}");
                    slots.remove(&artist_id);
                }
            }
        }
        guard.flight.complete(result.clone());
        guard.finished = true;
        result
    }

    /// Installs facts for an id that has no remote relation (locally created artists).
    pub fn seed(&self, artist_id: u32, facts: LocationFacts) {
        self.lock_slots()
            .insert(artist_id, Slot::Ready(Arc::new(facts)));
    }

    /// Number of ids with a cached successful result.
    pub fn cached_len(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use super::{RelationCache, RelationSource};
    use crate::catalog::models::LocationFacts;
    use crate::error::FetchError;

    struct CountingSource {
        calls: AtomicUsize,
        failures_before_success: usize,
        delay: Duration,
    }

    impl CountingSource {
        fn new(failures_before_success: usize, delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures_before_success,
                delay,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RelationSource for CountingSource {
        fn fetch_relation(&self, artist_id: u32) -> Result<LocationFacts, FetchError> {
            let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if call_index < self.failures_before_success {
                return Err(FetchError::HttpStatus(502));
            }
            let mut facts = LocationFacts::new();
            facts.insert(
                format!("city{artist_id}-country"),
                vec!["01-02-2020".to_string()],
            );
            Ok(facts)
        }
    }

    #[test]
    fn test_concurrent_callers_share_one_fetch() {
        let source = Arc::new(CountingSource::new(0, Duration::from_millis(200)));
        let cache = Arc::new(RelationCache::new(source.clone()));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.fetch_relation(7)
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("worker should not panic"))
            .collect();

        assert_eq!(source.calls(), 1);
        let first = results[0].as_ref().expect("fetch should succeed");
        for result in &results {
            let facts = result.as_ref().expect("fetch should succeed");
            assert!(Arc::ptr_eq(first, facts));
        }
    }

    #[test]
    fn test_later_callers_are_served_from_cache() {
        let source = Arc::new(CountingSource::new(0, Duration::ZERO));
        let cache = RelationCache::new(source.clone());
        let first = cache.fetch_relation(1).expect("fetch should succeed");
        let second = cache.fetch_relation(1).expect("fetch should succeed");
        assert_eq!(source.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(cache.cached_len(), 1);
    }

    #[test]
    fn test_failed_fetch_is_not_cached() {
        let source = Arc::new(CountingSource::new(1, Duration::ZERO));
        let cache = RelationCache::new(source.clone());
        assert_eq!(
            cache.fetch_relation(4).expect_err("first call should fail"),
            FetchError::HttpStatus(502)
        );
        assert_eq!(cache.cached_len(), 0);
        assert!(cache.fetch_relation(4).is_ok());
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_waiters_observe_the_leader_failure() {
        let source = Arc::new(CountingSource::new(1, Duration::from_millis(200)));
        let cache = Arc::new(RelationCache::new(source.clone()));
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.fetch_relation(9)
                })
            })
            .collect();
        for handle in handles {
            let result = handle.join().expect("worker should not panic");
            assert_eq!(result, Err(FetchError::HttpStatus(502)));
        }
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_distinct_ids_fetch_independently() {
        let source = Arc::new(CountingSource::new(0, Duration::ZERO));
        let cache = RelationCache::new(source.clone());
        cache.fetch_relation(1).expect("fetch should succeed");
        cache.fetch_relation(2).expect("fetch should succeed");
        assert_eq!(source.calls(), 2);
    }

    #[test]
    fn test_seeded_ids_never_reach_the_source() {
        let source = Arc::new(CountingSource::new(0, Duration::ZERO));
        let cache = RelationCache::new(source.clone());
        let mut facts = LocationFacts::new();
        facts.insert("lyon-france".to_string(), vec!["03-03-2023".to_string()]);
        cache.seed(60, facts.clone());
        assert_eq!(*cache.fetch_relation(60).expect("seeded"), facts);
        assert_eq!(source.calls(), 0);
    }
}
