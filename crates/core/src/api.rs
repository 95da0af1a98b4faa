use crate::config::Settings;
use crate::domain::ranking::RankingRecord;
use anyhow::Context;
use std::fmt;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Failure of a single remote fetch. Cloneable so the cache can keep it on
/// the failed entry and hand it to every caller attached to the same
/// in-flight request.
#[derive(Debug, Clone)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Transport-level failure: connect, timeout, TLS.
    Transport,
    /// Non-2xx HTTP status.
    Status(u16),
    /// 2xx response whose body does not decode as ranking records.
    Decode,
}

impl FetchError {
    fn transport(err: impl fmt::Display) -> Self {
        Self {
            kind: FetchErrorKind::Transport,
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FetchErrorKind::Transport => write!(f, "request failed: {}", self.detail),
            FetchErrorKind::Status(code) => write!(f, "HTTP {code}: {}", self.detail),
            FetchErrorKind::Decode => write!(f, "invalid response body: {}", self.detail),
        }
    }
}

impl std::error::Error for FetchError {}

/// The remote ranking service. An empty array is a valid response for
/// every read: an empty ranking day or an unknown ticker is an empty
/// state, never an error.
#[async_trait::async_trait]
pub trait StockApi: Send + Sync {
    /// Rankings for the most recent available date.
    async fn fetch_latest(&self) -> Result<Vec<RankingRecord>, FetchError>;

    /// Rankings for one calendar date. The date string is passed through
    /// as given; validating it is the server's concern.
    async fn fetch_for_date(&self, date: &str) -> Result<Vec<RankingRecord>, FetchError>;

    /// Every ranking appearance of one ticker, in no particular order.
    async fn fetch_history(&self, ticker: &str) -> Result<Vec<RankingRecord>, FetchError>;

    /// Ask the backend to rebuild its ranking data. Success is any 2xx
    /// status; no response body is required.
    async fn trigger_sync(&self) -> Result<(), FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpStockApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStockApi {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings
            .api_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("MOVERS_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build stock api http client")?;

        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_records(
        &self,
        path: &str,
        query: Option<(&str, &str)>,
    ) -> Result<Vec<RankingRecord>, FetchError> {
        let mut req = self.http.get(self.url(path));
        if let Some((name, value)) = query {
            req = req.query(&[(name, value)]);
        }

        let res = req.send().await.map_err(FetchError::transport)?;
        let status = res.status();
        let text = res.text().await.map_err(FetchError::transport)?;

        if !status.is_success() {
            return Err(FetchError {
                kind: FetchErrorKind::Status(status.as_u16()),
                detail: text,
            });
        }

        serde_json::from_str::<Vec<RankingRecord>>(&text).map_err(|e| FetchError {
            kind: FetchErrorKind::Decode,
            detail: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl StockApi for HttpStockApi {
    async fn fetch_latest(&self) -> Result<Vec<RankingRecord>, FetchError> {
        self.get_records("/api/stocks/latest", None).await
    }

    async fn fetch_for_date(&self, date: &str) -> Result<Vec<RankingRecord>, FetchError> {
        self.get_records("/api/stocks/date", Some(("date", date))).await
    }

    async fn fetch_history(&self, ticker: &str) -> Result<Vec<RankingRecord>, FetchError> {
        self.get_records(&format!("/api/stocks/{ticker}"), None).await
    }

    async fn trigger_sync(&self) -> Result<(), FetchError> {
        let res = self
            .http
            .post(self.url("/api/admin/sync"))
            .send()
            .await
            .map_err(FetchError::transport)?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            return Err(FetchError {
                kind: FetchErrorKind::Status(status.as_u16()),
                detail,
            });
        }
        Ok(())
    }
}
