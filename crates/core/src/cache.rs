use crate::api::FetchError;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Deterministic cache identity: a resource name plus its normalized
/// parameter. Two requests for the same logical query must derive the same
/// key; that is what makes in-flight de-duplication possible.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub resource: &'static str,
    pub param: String,
}

impl QueryKey {
    pub fn new(resource: &'static str, param: impl Into<String>) -> Self {
        Self {
            resource,
            param: param.into(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.param)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Idle,
    Pending,
    Fresh,
    Stale,
    Error,
}

/// Point-in-time view of one cache entry, published to subscribers on
/// every status transition. `value` is set only in `Fresh` and `Stale`.
#[derive(Debug, Clone)]
pub struct EntrySnapshot<V> {
    pub status: EntryStatus,
    pub value: Option<V>,
    pub error: Option<FetchError>,
}

#[derive(Debug, Clone)]
pub struct GetOptions<'a> {
    /// When false, `get` is a no-op returning `None`: the parameter needed
    /// to build a meaningful key is not available yet.
    pub enabled: bool,
    /// Tags attached to the entry for bulk invalidation.
    pub tags: &'a [&'a str],
}

impl Default for GetOptions<'_> {
    fn default() -> Self {
        Self {
            enabled: true,
            tags: &[],
        }
    }
}

struct Entry<V> {
    status: EntryStatus,
    value: Option<V>,
    error: Option<FetchError>,
    tags: BTreeSet<String>,
    // One channel per entry: the de-duplication attachment handle while a
    // fetch is in flight, and the subscription feed the rest of the time.
    tx: watch::Sender<EntrySnapshot<V>>,
}

impl<V: Clone> Entry<V> {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(EntrySnapshot {
            status: EntryStatus::Idle,
            value: None,
            error: None,
        });
        Self {
            status: EntryStatus::Idle,
            value: None,
            error: None,
            tags: BTreeSet::new(),
            tx,
        }
    }

    fn publish(&self) {
        self.tx.send_replace(EntrySnapshot {
            status: self.status,
            value: self.value.clone(),
            error: self.error.clone(),
        });
    }
}

enum Plan<V> {
    Hit(V),
    Wait(watch::Receiver<EntrySnapshot<V>>),
    Fetch(watch::Receiver<EntrySnapshot<V>>),
}

/// Keyed asynchronous cache with single-flight fetches and tag-based
/// invalidation. Entries live until `reset`; a shared store outlives any
/// one caller, so an in-flight fetch always completes and populates the
/// entry even if the caller that started it has gone away.
pub struct QueryCache<V> {
    entries: Arc<Mutex<HashMap<QueryKey, Entry<V>>>>,
}

impl<V> Clone for QueryCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> QueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve `key`, de-duplicating concurrent callers. A fresh entry is
    /// served without invoking `fetcher`; a pending entry attaches the
    /// caller to the fetch already in flight; anything else (absent, idle,
    /// stale, error) starts exactly one new fetch. The status check and
    /// the transition to pending happen under a single lock acquisition,
    /// never across an await, so two racing callers cannot both start a
    /// fetch for the same key.
    pub async fn get<F, Fut>(
        &self,
        key: &QueryKey,
        options: GetOptions<'_>,
        fetcher: F,
    ) -> Result<Option<V>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        if !options.enabled {
            return Ok(None);
        }

        let plan = {
            let mut entries = self.lock();
            let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
            entry
                .tags
                .extend(options.tags.iter().map(|t| t.to_string()));

            match (entry.status, &entry.value) {
                (EntryStatus::Fresh, Some(value)) => Plan::Hit(value.clone()),
                (EntryStatus::Pending, _) => Plan::Wait(entry.tx.subscribe()),
                _ => {
                    entry.status = EntryStatus::Pending;
                    entry.error = None;
                    entry.publish();
                    Plan::Fetch(entry.tx.subscribe())
                }
            }
        };

        let mut rx = match plan {
            Plan::Hit(value) => return Ok(Some(value)),
            Plan::Wait(rx) => rx,
            Plan::Fetch(rx) => {
                // The fetch runs detached so it completes and populates
                // the entry even if every interested caller is dropped.
                let fut = fetcher();
                let entries = Arc::clone(&self.entries);
                let key = key.clone();
                tokio::spawn(async move {
                    let result = fut.await;
                    let mut entries =
                        entries.lock().unwrap_or_else(PoisonError::into_inner);
                    let Some(entry) = entries.get_mut(&key) else {
                        // The store was reset mid-flight; drop the result.
                        return;
                    };
                    match result {
                        Ok(value) => {
                            entry.status = EntryStatus::Fresh;
                            entry.value = Some(value);
                            entry.error = None;
                            tracing::debug!(key = %key, "fetch completed");
                        }
                        Err(err) => {
                            entry.status = EntryStatus::Error;
                            entry.value = None;
                            entry.error = Some(err.clone());
                            tracing::warn!(key = %key, error = %err, "fetch failed");
                        }
                    }
                    entry.publish();
                });
                rx
            }
        };

        let snapshot = rx
            .wait_for(|s| s.status != EntryStatus::Pending)
            .await
            .map_err(|_| FetchError {
                kind: crate::api::FetchErrorKind::Transport,
                detail: "cache entry dropped before the fetch completed".to_string(),
            })?
            .clone();

        match snapshot.status {
            EntryStatus::Fresh | EntryStatus::Stale => Ok(snapshot.value),
            _ => Err(snapshot.error.unwrap_or(FetchError {
                kind: crate::api::FetchErrorKind::Transport,
                detail: "fetch failed".to_string(),
            })),
        }
    }

    /// Mark every fresh entry carrying `tag` as stale. A stale entry keeps
    /// its value for optimistic reads via `peek`, but the next `get`
    /// refetches before returning.
    pub fn invalidate_tag(&self, tag: &str) {
        let mut entries = self.lock();
        for (key, entry) in entries.iter_mut() {
            if entry.status == EntryStatus::Fresh && entry.tags.contains(tag) {
                entry.status = EntryStatus::Stale;
                entry.publish();
                tracing::debug!(key = %key, tag, "entry invalidated");
            }
        }
    }

    /// Mark one exact key stale, if it is fresh.
    pub fn invalidate_key(&self, key: &QueryKey) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            if entry.status == EntryStatus::Fresh {
                entry.status = EntryStatus::Stale;
                entry.publish();
                tracing::debug!(key = %key, "entry invalidated");
            }
        }
    }

    /// Last fetched value for a key, fresh or stale, without triggering a
    /// fetch.
    pub fn peek(&self, key: &QueryKey) -> Option<V> {
        let entries = self.lock();
        entries.get(key).and_then(|e| match e.status {
            EntryStatus::Fresh | EntryStatus::Stale => e.value.clone(),
            _ => None,
        })
    }

    /// Current snapshot of a key's entry, if one exists.
    pub fn snapshot(&self, key: &QueryKey) -> Option<EntrySnapshot<V>> {
        let entries = self.lock();
        entries.get(key).map(|e| EntrySnapshot {
            status: e.status,
            value: e.value.clone(),
            error: e.error.clone(),
        })
    }

    /// Observe a key's entry. The receiver yields the current snapshot
    /// immediately and a new one on every status transition. Subscribing
    /// creates the entry (idle) if it does not exist yet.
    pub fn subscribe(&self, key: &QueryKey) -> watch::Receiver<EntrySnapshot<V>> {
        let mut entries = self.lock();
        entries
            .entry(key.clone())
            .or_insert_with(Entry::new)
            .tx
            .subscribe()
    }

    /// Drop every entry. Waiters attached to an in-flight fetch observe an
    /// error; the fetch's result is discarded when it lands.
    pub fn reset(&self) {
        self.lock().clear();
    }

    #[cfg(test)]
    fn status(&self, key: &QueryKey) -> Option<EntryStatus> {
        self.lock().get(key).map(|e| e.status)
    }
}
