use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    cache_keys::CacheKey,
    error::Error,
    model::{
        ActivityDistribution, AggregateBucket, DistributionBucket,
        DomainKind, MarketOverview, PerformanceSummary, RankedEntity, Record,
        TierShare,
    },
};

/// An immutable cached result; a refresh replaces it, never mutates it.
pub struct CacheEntry<V> {
    pub key: CacheKey,
    pub value: Arc<V>,
    pub fetched_at: DateTime<Utc>,
    refreshed: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// A refresh failed; the value is the last one known.
    StaleServed { reason: String },
}

/// What a caller gets back: the value, when it was fetched, and whether it
/// is the answer to a successful fetch.
pub struct Cached<V> {
    pub value: Arc<V>,
    pub fetched_at: DateTime<Utc>,
    pub freshness: Freshness,
}

impl<V> Cached<V> {
    fn from_entry(entry: &CacheEntry<V>, freshness: Freshness) -> Self {
        Self {
            value: Arc::clone(&entry.value),
            fetched_at: entry.fetched_at,
            freshness,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.freshness, Freshness::StaleServed { .. })
    }
}

impl<V> Clone for Cached<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
            freshness: self.freshness.clone(),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Cached<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cached")
            .field("value", &self.value)
            .field("fetched_at", &self.fetched_at)
            .field("freshness", &self.freshness)
            .finish()
    }
}

/// Observable lifecycle of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fetching,
    Fresh,
    Stale,
}

type Outcome<V> = Result<Cached<V>, Arc<Error>>;

enum Slot<V> {
    Ready {
        entry: Arc<CacheEntry<V>>,
        invalidated: bool,
    },
    Fetching {
        rx: watch::Receiver<Option<Outcome<V>>>,
        previous: Option<Arc<CacheEntry<V>>>,
        invalidated: bool,
    },
}

struct Node<V> {
    slot: Slot<V>,
    last_access: u64,
}

struct Inner<V> {
    nodes: HashMap<CacheKey, Node<V>>,
    tick: u64,
}

/// Memoizes query results per key with at most one fetch in flight per
/// key. Expired entries are refreshed on access; when the refresh fails
/// the previous value is served tagged `StaleServed`.
///
/// Fetches run as spawned tasks, so a caller that stops waiting does not
/// cancel the fetch for the others. Every state transition happens under
/// the store lock.
pub struct CacheCoordinator<V> {
    inner: Arc<Mutex<Inner<V>>>,
    refresh_interval: Duration,
    max_entries: usize,
}

impl<V: Send + Sync + 'static> CacheCoordinator<V> {
    pub fn new(refresh_interval: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                nodes: HashMap::new(),
                tick: 0,
            })),
            refresh_interval,
            max_entries: max_entries.max(1),
        }
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        entry.refreshed.elapsed() > self.refresh_interval
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
    ) -> Result<Cached<V>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        let rx = {
            let mut inner = self.inner.lock().await;
            inner.tick += 1;
            let tick = inner.tick;

            let previous = match inner.nodes.get_mut(&key) {
                None => None,
                Some(node) => {
                    node.last_access = tick;
                    match &node.slot {
                        Slot::Ready { entry, invalidated }
                            if !invalidated && !self.is_expired(entry) =>
                        {
                            debug!("Cache hit {}", key);
                            return Ok(Cached::from_entry(
                                entry,
                                Freshness::Fresh,
                            ));
                        },
                        Slot::Ready { entry, .. } => Some(Arc::clone(entry)),
                        Slot::Fetching { rx, .. } => {
                            debug!("Joining in-flight fetch {}", key);
                            let rx = rx.clone();
                            drop(inner);
                            return Self::wait(rx, &key).await;
                        },
                    }
                },
            };

            match &previous {
                Some(_) => debug!("Cache stale {}, refreshing", key),
                None => debug!("Cache miss {}", key),
            }

            let rx = self.spawn_fetch(key.clone(), fetch);
            inner.nodes.insert(
                key.clone(),
                Node {
                    slot: Slot::Fetching {
                        rx: rx.clone(),
                        previous,
                        invalidated: false,
                    },
                    last_access: tick,
                },
            );
            Self::evict(&mut inner, self.max_entries);

            rx
        };

        Self::wait(rx, &key).await
    }

    async fn wait(
        mut rx: watch::Receiver<Option<Outcome<V>>>,
        key: &CacheKey,
    ) -> Result<Cached<V>, Error> {
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::FetchAbandoned(key.to_string()))?
            .clone();

        match outcome {
            Some(Ok(cached)) => Ok(cached),
            Some(Err(error)) => Err(Error::Shared(error)),
            None => Err(Error::FetchAbandoned(key.to_string())),
        }
    }

    fn spawn_fetch<F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
    ) -> watch::Receiver<Option<Outcome<V>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let store = Arc::clone(&self.inner);
        let max_entries = self.max_entries;
        let task = tokio::spawn(fetch());

        tokio::spawn(async move {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(Error::from(e)),
            };
            let outcome = Self::commit(&store, key, result, max_entries).await;
            tx.send_replace(Some(outcome));
        });

        rx
    }

    async fn commit(
        store: &Mutex<Inner<V>>,
        key: CacheKey,
        result: Result<V, Error>,
        max_entries: usize,
    ) -> Outcome<V> {
        let mut inner = store.lock().await;
        inner.tick += 1;
        let tick = inner.tick;

        let (previous, invalidated, last_access) = match inner.nodes.get(&key) {
            Some(Node {
                slot:
                    Slot::Fetching {
                        previous,
                        invalidated,
                        ..
                    },
                last_access,
            }) => (previous.clone(), *invalidated, *last_access),
            _ => (None, false, tick),
        };

        match result {
            Ok(value) => {
                let entry = Arc::new(CacheEntry {
                    key: key.clone(),
                    value: Arc::new(value),
                    fetched_at: Utc::now(),
                    refreshed: Instant::now(),
                });
                let cached = Cached::from_entry(&entry, Freshness::Fresh);

                debug!("Cache stored {}", key);
                inner.nodes.insert(
                    key,
                    Node {
                        slot: Slot::Ready { entry, invalidated },
                        last_access,
                    },
                );
                Self::evict(&mut inner, max_entries);

                Ok(cached)
            },
            Err(error) => match previous {
                Some(entry) => {
                    warn!(
                        "Refresh of {} failed, serving value from {}: {}",
                        key, entry.fetched_at, error
                    );
                    let cached = Cached::from_entry(
                        &entry,
                        Freshness::StaleServed {
                            reason: error.to_string(),
                        },
                    );
                    inner.nodes.insert(
                        key,
                        Node {
                            slot: Slot::Ready {
                                entry,
                                invalidated,
                            },
                            last_access,
                        },
                    );

                    Ok(cached)
                },
                None => {
                    debug!("Fetch of {} failed: {}", key, error);
                    inner.nodes.remove(&key);
                    Err(Arc::new(error))
                },
            },
        }
    }

    /// Drops least recently used entries beyond `max_entries`. Entries
    /// with a fetch in flight stay.
    fn evict(inner: &mut Inner<V>, max_entries: usize) {
        while inner.nodes.len() > max_entries {
            let oldest = inner
                .nodes
                .iter()
                .filter(|(_, node)| matches!(node.slot, Slot::Ready { .. }))
                .min_by_key(|(_, node)| node.last_access)
                .map(|(key, _)| key.clone());

            match oldest {
                Some(key) => {
                    debug!("Cache evicted {}", key);
                    inner.nodes.remove(&key);
                },
                None => break,
            }
        }
    }

    /// Forces the entry stale so the next access refreshes it. An
    /// in-flight fetch still completes but its result is stored stale.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.lock().await;

        match inner.nodes.get_mut(key) {
            Some(node) => {
                Self::mark_invalidated(&mut node.slot);
                true
            },
            None => false,
        }
    }

    pub async fn invalidate_matching(
        &self,
        domain: DomainKind,
        identifier: Option<&str>,
    ) -> usize {
        let mut inner = self.inner.lock().await;
        let mut count = 0;

        for (key, node) in inner.nodes.iter_mut() {
            if key.matches(domain, identifier) {
                Self::mark_invalidated(&mut node.slot);
                count += 1;
            }
        }

        count
    }

    fn mark_invalidated(slot: &mut Slot<V>) {
        match slot {
            Slot::Ready { invalidated, .. }
            | Slot::Fetching { invalidated, .. } => *invalidated = true,
        }
    }

    pub async fn state(&self, key: &CacheKey) -> CacheState {
        let inner = self.inner.lock().await;

        match inner.nodes.get(key).map(|node| &node.slot) {
            None => CacheState::Empty,
            Some(Slot::Fetching { .. }) => CacheState::Fetching,
            Some(Slot::Ready { entry, invalidated }) => {
                if *invalidated || self.is_expired(entry) {
                    CacheState::Stale
                } else {
                    CacheState::Fresh
                }
            },
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<V> fmt::Debug for CacheCoordinator<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("refresh_interval", &self.refresh_interval)
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

/// One coordinator per result shape served by the façades.
#[derive(Debug)]
pub struct ApiCache {
    pub records: CacheCoordinator<Vec<Record>>,
    pub names: CacheCoordinator<Vec<String>>,
    pub series: CacheCoordinator<Vec<AggregateBucket>>,
    pub distributions: CacheCoordinator<ActivityDistribution>,
    pub distribution_series: CacheCoordinator<Vec<DistributionBucket>>,
    pub rankings: CacheCoordinator<Vec<RankedEntity>>,
    pub performance: CacheCoordinator<Option<PerformanceSummary>>,
    pub tiers: CacheCoordinator<Vec<TierShare>>,
    pub overviews: CacheCoordinator<MarketOverview>,
}

impl ApiCache {
    pub fn new(refresh_interval: Duration, max_entries: usize) -> Self {
        Self {
            records: CacheCoordinator::new(refresh_interval, max_entries),
            names: CacheCoordinator::new(refresh_interval, max_entries),
            series: CacheCoordinator::new(refresh_interval, max_entries),
            distributions: CacheCoordinator::new(refresh_interval, max_entries),
            distribution_series: CacheCoordinator::new(
                refresh_interval,
                max_entries,
            ),
            rankings: CacheCoordinator::new(refresh_interval, max_entries),
            performance: CacheCoordinator::new(refresh_interval, max_entries),
            tiers: CacheCoordinator::new(refresh_interval, max_entries),
            overviews: CacheCoordinator::new(refresh_interval, max_entries),
        }
    }

    /// Marks every entry of `domain` (optionally narrowed to one chain,
    /// exchange or symbol) stale. Returns how many entries were touched.
    pub async fn invalidate_matching(
        &self,
        domain: DomainKind,
        identifier: Option<&str>,
    ) -> usize {
        self.records.invalidate_matching(domain, identifier).await
            + self.names.invalidate_matching(domain, identifier).await
            + self.series.invalidate_matching(domain, identifier).await
            + self.distributions.invalidate_matching(domain, identifier).await
            + self
                .distribution_series
                .invalidate_matching(domain, identifier)
                .await
            + self.rankings.invalidate_matching(domain, identifier).await
            + self.performance.invalidate_matching(domain, identifier).await
            + self.tiers.invalidate_matching(domain, identifier).await
            + self.overviews.invalidate_matching(domain, identifier).await
    }

    pub async fn len(&self) -> usize {
        self.records.len().await
            + self.names.len().await
            + self.series.len().await
            + self.distributions.len().await
            + self.distribution_series.len().await
            + self.rankings.len().await
            + self.performance.len().await
            + self.tiers.len().await
            + self.overviews.len().await
    }
}
