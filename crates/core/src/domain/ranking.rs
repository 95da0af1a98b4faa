use serde::{Deserialize, Serialize};

/// One stock's rank and metrics for a single date+category, exactly as the
/// ranking backend serializes it. For a fixed (date, category) pair the
/// backend guarantees unique ranks in 1..=5.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RankingRecord {
    #[serde(rename = "ID", default)]
    pub id: u64,
    #[serde(rename = "StockID", default)]
    pub stock_id: u64,
    /// Calendar date, zero-padded `YYYY-MM-DD`. No time component; string
    /// order is chronological order.
    pub date: String,
    pub rank: i32,
    #[serde(default)]
    pub category: String,
    pub change_amount: f64,
    pub change_rate: f64,
    pub price: f64,
    #[serde(default)]
    pub news_summary: String,
    #[serde(default)]
    pub ai_analysis: String,
    /// Embedded stock master row. The backend omits it in some joins.
    #[serde(default)]
    pub stock: StockRecord,
}

/// Stock master data. `ticker` is the stable identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StockRecord {
    #[serde(rename = "ID", default)]
    pub id: u64,
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub industry: String,
}
