use crate::domain::ranking::RankingRecord;
use serde::Serialize;

/// Flattened row for ranking list views: the ranking fields plus the
/// embedded stock's ticker and name. Values pass through unmodified;
/// rounding and units are a rendering concern.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayRanking {
    pub rank: i32,
    pub ticker: String,
    pub name: String,
    pub change_rate: f64,
    pub change_amount: f64,
    pub price: f64,
    pub ai_analysis: String,
    pub date: String,
}

/// Stock master fields for a detail view. All-empty except `ticker` when
/// the backend has never ranked the ticker.
#[derive(Debug, Clone, Serialize)]
pub struct StockProfile {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub industry: String,
}

/// One appearance of a ticker in a daily ranking.
#[derive(Debug, Clone, Serialize)]
pub struct RankHistoryEntry {
    pub date: String,
    pub rank: i32,
    pub change_rate: f64,
    pub ai_analysis: String,
}

pub fn to_display_ranking(record: &RankingRecord) -> DisplayRanking {
    DisplayRanking {
        rank: record.rank,
        ticker: record.stock.ticker.clone(),
        name: record.stock.name.clone(),
        change_rate: record.change_rate,
        change_amount: record.change_amount,
        price: record.price,
        ai_analysis: record.ai_analysis.clone(),
        date: record.date.clone(),
    }
}

pub fn to_display_rankings(records: &[RankingRecord]) -> Vec<DisplayRanking> {
    records.iter().map(to_display_ranking).collect()
}

/// Project a ticker's ranking records into its profile and rank history.
/// The history is sorted ascending by date; the fetch order of `records`
/// is not trusted.
pub fn to_stock_profile_and_history(
    records: &[RankingRecord],
    ticker: &str,
) -> (StockProfile, Vec<RankHistoryEntry>) {
    let Some(first) = records.first() else {
        return (
            StockProfile {
                ticker: ticker.to_string(),
                name: String::new(),
                sector: String::new(),
                industry: String::new(),
            },
            Vec::new(),
        );
    };

    // All records for one ticker embed the same stock row.
    let profile = StockProfile {
        ticker: first.stock.ticker.clone(),
        name: first.stock.name.clone(),
        sector: first.stock.sector.clone(),
        industry: first.stock.industry.clone(),
    };

    let mut history: Vec<RankHistoryEntry> = records
        .iter()
        .map(|r| RankHistoryEntry {
            date: r.date.clone(),
            rank: r.rank,
            change_rate: r.change_rate,
            ai_analysis: r.ai_analysis.clone(),
        })
        .collect();

    // Zero-padded YYYY-MM-DD sorts chronologically as a plain string.
    history.sort_by(|a, b| a.date.cmp(&b.date));

    (profile, history)
}
