//! Query cache with single-flight deduplication and an invalidation bus.
//!
//! Derived values are cached under a stable string key. Concurrent
//! requests for the same key share one in-flight fetch; late subscribers
//! receive the same result without triggering a second request.
//!
//! Every cached entry is tied to one logical [`QueryKey`]. The
//! [`InvalidationBus`] keeps a generation counter per key; bumping a
//! counter (after a successful broadcast) stales every entry computed
//! under the old generation, so the next read refreshes.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::debug;

/// Logical cache keys that go stale after a state-changing broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Positions,
    Balances,
    LiquidationInfo,
    UserBids,
    StabilityAssetPool,
    Staked,
    Allocations,
}

impl QueryKey {
    pub const ALL: [QueryKey; 7] = [
        QueryKey::Positions,
        QueryKey::Balances,
        QueryKey::LiquidationInfo,
        QueryKey::UserBids,
        QueryKey::StabilityAssetPool,
        QueryKey::Staked,
        QueryKey::Allocations,
    ];

    fn index(self) -> usize {
        match self {
            QueryKey::Positions => 0,
            QueryKey::Balances => 1,
            QueryKey::LiquidationInfo => 2,
            QueryKey::UserBids => 3,
            QueryKey::StabilityAssetPool => 4,
            QueryKey::Staked => 5,
            QueryKey::Allocations => 6,
        }
    }
}

/// Per-key generation counters. Readers record the generation they
/// computed under; a bump makes those entries stale.
#[derive(Debug)]
pub struct InvalidationBus {
    generations: [AtomicU64; 7],
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self {
            generations: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub fn generation(&self, key: QueryKey) -> u64 {
        self.generations[key.index()].load(Ordering::SeqCst)
    }

    /// Mark one logical key stale.
    pub fn invalidate(&self, key: QueryKey) {
        self.generations[key.index()].fetch_add(1, Ordering::SeqCst);
        debug!(?key, "cache key invalidated");
    }

    /// Mark every logical key stale. Called after a confirmed broadcast.
    pub fn invalidate_all(&self) {
        for key in QueryKey::ALL {
            self.generations[key.index()].fetch_add(1, Ordering::SeqCst);
        }
        debug!("all cache keys invalidated");
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

enum Slot<T> {
    /// A fetch is running; waiters subscribe to the channel.
    InFlight(watch::Receiver<Option<Result<T, String>>>),
    /// Last computed value plus the generation it was computed under.
    Ready {
        value: T,
        cached_at: Instant,
        generation: u64,
    },
}

/// Stable-key cache of derived values with single-flight fetches.
pub struct QueryCache<T: Clone> {
    entries: DashMap<String, Slot<T>>,
    ttl: Duration,
    bus: Arc<InvalidationBus>,
}

impl<T: Clone + Send + Sync + 'static> QueryCache<T> {
    pub fn new(ttl: Duration, bus: Arc<InvalidationBus>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<InvalidationBus> {
        &self.bus
    }

    /// Return the cached value for `key` if fresh, otherwise run `fetch`
    /// exactly once across all concurrent callers and share the result.
    ///
    /// Errors are shared with waiters but never cached; the next call
    /// retries.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        logical: QueryKey,
        fetch: F,
    ) -> anyhow::Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        loop {
            // Inspect the slot without holding the map ref across an await.
            enum Found<T> {
                Fresh(T),
                Wait(watch::Receiver<Option<Result<T, String>>>),
                Missing,
            }

            let found = match self.entries.get(key) {
                Some(slot) => match slot.value() {
                    Slot::Ready {
                        value,
                        cached_at,
                        generation,
                    } => {
                        if cached_at.elapsed() < self.ttl
                            && *generation == self.bus.generation(logical)
                        {
                            Found::Fresh(value.clone())
                        } else {
                            Found::Missing
                        }
                    }
                    Slot::InFlight(rx) => Found::Wait(rx.clone()),
                },
                None => Found::Missing,
            };

            match found {
                Found::Fresh(value) => return Ok(value),
                Found::Wait(mut rx) => {
                    loop {
                        let published = rx.borrow().clone();
                        if let Some(result) = published {
                            return result.map_err(anyhow::Error::msg);
                        }
                        if rx.changed().await.is_err() {
                            // Fetcher dropped without publishing; start over.
                            break;
                        }
                    }
                    continue;
                }
                Found::Missing => {}
            }

            // Claim the fetch by installing an in-flight marker.
            let (tx, rx) = watch::channel(None);
            match self.entries.entry(key.to_string()) {
                dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                    if matches!(occupied.get(), Slot::InFlight(_)) {
                        // Lost the race; loop back and wait on the winner.
                        continue;
                    }
                    occupied.insert(Slot::InFlight(rx));
                }
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    vacant.insert(Slot::InFlight(rx));
                }
            }

            // Generation is captured before the fetch so an invalidation
            // racing the fetch stales this entry immediately.
            let generation = self.bus.generation(logical);
            debug!(key, ?logical, "cache miss, fetching");

            match fetch().await {
                Ok(value) => {
                    let _ = tx.send(Some(Ok(value.clone())));
                    self.entries.insert(
                        key.to_string(),
                        Slot::Ready {
                            value: value.clone(),
                            cached_at: Instant::now(),
                            generation,
                        },
                    );
                    return Ok(value);
                }
                Err(err) => {
                    let _ = tx.send(Some(Err(err.to_string())));
                    self.entries.remove(key);
                    return Err(err);
                }
            }
        }
    }

    /// Drop every cached entry. Mostly useful in tests; production code
    /// goes through the invalidation bus instead.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
