use crate::api::StockApi;
use crate::queries::{CacheStore, TAG_RANKING};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// The resync trigger failed. The cache is exactly as it was before the
/// call.
#[derive(Debug, Clone)]
pub struct SyncError {
    pub detail: String,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resync failed: {}", self.detail)
    }
}

impl std::error::Error for SyncError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Pending,
}

/// Issues the remote resync command and, on success, invalidates the
/// ranking partition of the cache so the next read refetches. History
/// entries are left alone: resync invalidation is ranking-scoped.
pub struct SyncCoordinator {
    api: Arc<dyn StockApi>,
    store: Arc<CacheStore>,
    state_tx: watch::Sender<SyncState>,
}

impl SyncCoordinator {
    pub fn new(api: Arc<dyn StockApi>, store: Arc<CacheStore>) -> Self {
        let (state_tx, _rx) = watch::channel(SyncState::Idle);
        Self {
            api,
            store,
            state_tx,
        }
    }

    /// Observe the idle/pending state, e.g. to disable a sync button while
    /// a trigger is in flight.
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Trigger a remote resync. On success every `"ranking"`-tagged cache
    /// entry is marked stale; on failure the cache is untouched and the
    /// caller decides whether to re-trigger. No automatic retry.
    pub async fn trigger(&self) -> Result<(), SyncError> {
        self.state_tx.send_replace(SyncState::Pending);
        let result = self.api.trigger_sync().await;
        self.state_tx.send_replace(SyncState::Idle);

        match result {
            Ok(()) => {
                self.store.rankings.invalidate_tag(TAG_RANKING);
                tracing::info!("resync complete; ranking entries invalidated");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "resync trigger failed");
                Err(SyncError {
                    detail: err.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FetchError, FetchErrorKind};
    use crate::cache::EntryStatus;
    use crate::domain::ranking::{RankingRecord, StockRecord};
    use crate::queries::{history_key, ranking_date_key, ranking_latest_key, StockQueries};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeApi {
        fail_sync: bool,
        fetch_calls: AtomicUsize,
    }

    impl FakeApi {
        fn new(fail_sync: bool) -> Self {
            Self {
                fail_sync,
                fetch_calls: AtomicUsize::new(0),
            }
        }

        fn record(date: &str) -> RankingRecord {
            RankingRecord {
                id: 1,
                stock_id: 7,
                date: date.to_string(),
                rank: 1,
                category: "Technology".to_string(),
                change_amount: 5.0,
                change_rate: 2.5,
                price: 100.0,
                news_summary: String::new(),
                ai_analysis: String::new(),
                stock: StockRecord {
                    id: 7,
                    ticker: "NVDA".to_string(),
                    name: "NVIDIA Corporation".to_string(),
                    sector: "Technology".to_string(),
                    industry: "Semiconductors".to_string(),
                },
            }
        }
    }

    #[async_trait::async_trait]
    impl StockApi for FakeApi {
        async fn fetch_latest(&self) -> Result<Vec<RankingRecord>, FetchError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Self::record("2024-05-02")])
        }

        async fn fetch_for_date(&self, date: &str) -> Result<Vec<RankingRecord>, FetchError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Self::record(date)])
        }

        async fn fetch_history(&self, _ticker: &str) -> Result<Vec<RankingRecord>, FetchError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Self::record("2024-05-02")])
        }

        async fn trigger_sync(&self) -> Result<(), FetchError> {
            if self.fail_sync {
                Err(FetchError {
                    kind: FetchErrorKind::Status(500),
                    detail: "sync job crashed".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    async fn seeded(fail_sync: bool) -> (Arc<FakeApi>, Arc<CacheStore>, SyncCoordinator) {
        let api = Arc::new(FakeApi::new(fail_sync));
        let store = Arc::new(CacheStore::new());
        let queries = StockQueries::new(api.clone(), Arc::clone(&store));

        queries.latest_rankings().await.unwrap();
        queries.rankings_for_date("2024-05-01").await.unwrap();
        queries.stock_history("NVDA").await.unwrap();

        let coordinator = SyncCoordinator::new(api.clone(), Arc::clone(&store));
        (api, store, coordinator)
    }

    #[tokio::test]
    async fn successful_trigger_invalidates_ranking_entries_only() {
        let (_, store, coordinator) = seeded(false).await;

        coordinator.trigger().await.unwrap();

        let status = |key| store.rankings.snapshot(&key).map(|s| s.status);
        assert_eq!(status(ranking_latest_key()), Some(EntryStatus::Stale));
        assert_eq!(status(ranking_date_key("2024-05-01")), Some(EntryStatus::Stale));
        assert_eq!(status(history_key("NVDA")), Some(EntryStatus::Fresh));
    }

    #[tokio::test]
    async fn stale_ranking_entries_refetch_on_next_read() {
        let (api, store, coordinator) = seeded(false).await;
        let before = api.fetch_calls.load(Ordering::SeqCst);

        coordinator.trigger().await.unwrap();

        let queries = StockQueries::new(api.clone(), store);
        queries.latest_rankings().await.unwrap();
        queries.stock_history("NVDA").await.unwrap();

        // The ranking read refetched, the history read was served cached.
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn failed_trigger_leaves_the_cache_untouched() {
        let (api, store, coordinator) = seeded(true).await;
        let before = api.fetch_calls.load(Ordering::SeqCst);

        let err = coordinator.trigger().await.unwrap_err();
        assert!(err.detail.contains("500"));

        let status = |key| store.rankings.snapshot(&key).map(|s| s.status);
        assert_eq!(status(ranking_latest_key()), Some(EntryStatus::Fresh));
        assert_eq!(status(ranking_date_key("2024-05-01")), Some(EntryStatus::Fresh));
        assert_eq!(status(history_key("NVDA")), Some(EntryStatus::Fresh));
        assert_eq!(
            store
                .rankings
                .peek(&ranking_latest_key())
                .map(|r| r.len()),
            Some(1)
        );

        // Reads after the failed trigger are still served from cache.
        let queries = StockQueries::new(api.clone(), store);
        queries.latest_rankings().await.unwrap();
        assert_eq!(api.fetch_calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn state_returns_to_idle_after_trigger() {
        let (_, _, coordinator) = seeded(false).await;
        let state = coordinator.state();
        assert_eq!(*state.borrow(), SyncState::Idle);

        coordinator.trigger().await.unwrap();
        assert_eq!(*state.borrow(), SyncState::Idle);
    }
}
