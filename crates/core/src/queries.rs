use crate::api::{FetchError, StockApi};
use crate::cache::{GetOptions, QueryCache, QueryKey};
use crate::domain::display::{
    to_display_rankings, to_stock_profile_and_history, DisplayRanking, RankHistoryEntry,
    StockProfile,
};
use crate::domain::ranking::RankingRecord;
use std::sync::Arc;

/// Invalidation tag for every ranking-day entry, the latest key included.
pub const TAG_RANKING: &str = "ranking";
/// Invalidation tag for per-ticker history entries.
pub const TAG_HISTORY: &str = "history";

const RESOURCE_RANKING: &str = "ranking";
const RESOURCE_HISTORY: &str = "history";

pub fn ranking_latest_key() -> QueryKey {
    QueryKey::new(RESOURCE_RANKING, "latest")
}

pub fn ranking_date_key(date: &str) -> QueryKey {
    QueryKey::new(RESOURCE_RANKING, date)
}

pub fn history_key(ticker: &str) -> QueryKey {
    QueryKey::new(RESOURCE_HISTORY, ticker)
}

/// All client-side cached state. Constructed empty at startup and passed
/// explicitly to whatever needs it; `reset` restores the empty state for
/// test isolation.
pub struct CacheStore {
    pub rankings: QueryCache<Vec<RankingRecord>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            rankings: QueryCache::new(),
        }
    }

    pub fn reset(&self) {
        self.rankings.reset();
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Cached, projected reads over the ranking service: raw records go
/// through the cache keyed by (resource, parameter), then through the pure
/// projections before reaching the caller.
pub struct StockQueries {
    api: Arc<dyn StockApi>,
    store: Arc<CacheStore>,
}

impl StockQueries {
    pub fn new(api: Arc<dyn StockApi>, store: Arc<CacheStore>) -> Self {
        Self { api, store }
    }

    /// Display rows for the most recent available ranking day.
    pub async fn latest_rankings(&self) -> Result<Vec<DisplayRanking>, FetchError> {
        let api = Arc::clone(&self.api);
        let records = self
            .store
            .rankings
            .get(
                &ranking_latest_key(),
                GetOptions {
                    tags: &[TAG_RANKING],
                    ..Default::default()
                },
                move || async move { api.fetch_latest().await },
            )
            .await?;
        Ok(to_display_rankings(records.as_deref().unwrap_or(&[])))
    }

    /// Display rows for one calendar date. `None` while `date` is empty
    /// (the key parameter is not available yet); an empty day comes back
    /// as `Some` of an empty list.
    pub async fn rankings_for_date(
        &self,
        date: &str,
    ) -> Result<Option<Vec<DisplayRanking>>, FetchError> {
        let enabled = !date.is_empty();
        let api = Arc::clone(&self.api);
        let date_param = date.to_string();
        let records = self
            .store
            .rankings
            .get(
                &ranking_date_key(date),
                GetOptions {
                    enabled,
                    tags: &[TAG_RANKING],
                },
                move || async move { api.fetch_for_date(&date_param).await },
            )
            .await?;
        Ok(records.map(|r| to_display_rankings(&r)))
    }

    /// A ticker's profile and date-ascending rank history. `None` while
    /// `ticker` is empty; an unknown ticker yields the placeholder profile
    /// with an empty history.
    pub async fn stock_history(
        &self,
        ticker: &str,
    ) -> Result<Option<(StockProfile, Vec<RankHistoryEntry>)>, FetchError> {
        let enabled = !ticker.is_empty();
        let api = Arc::clone(&self.api);
        let ticker_param = ticker.to_string();
        let records = self
            .store
            .rankings
            .get(
                &history_key(ticker),
                GetOptions {
                    enabled,
                    tags: &[TAG_HISTORY],
                },
                move || async move { api.fetch_history(&ticker_param).await },
            )
            .await?;
        Ok(records.map(|r| to_stock_profile_and_history(&r, ticker)))
    }
}
