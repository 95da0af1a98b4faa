use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use movers_core::api::{HttpStockApi, StockApi};
use movers_core::domain::display::{DisplayRanking, RankHistoryEntry, StockProfile};
use movers_core::queries::{CacheStore, StockQueries};
use movers_core::sync::SyncCoordinator;
use movers_core::time::market_date;

#[derive(Debug, Parser)]
#[command(name = "movers")]
struct Args {
    /// Print raw JSON instead of formatted text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Top movers for the most recent available date.
    Latest,
    /// Top movers for a calendar date (defaults to today, US Eastern).
    Date {
        /// Date as YYYY-MM-DD.
        #[arg(long)]
        date: Option<String>,
        /// Shift the date by this many days, e.g. -1 for the previous day.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        offset: i64,
    },
    /// A ticker's profile and ranking history.
    History { ticker: String },
    /// Trigger a backend resync; cached rankings refetch on the next read.
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = movers_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let result = run(&settings, args).await;
    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
    }
    result
}

async fn run(settings: &movers_core::config::Settings, args: Args) -> anyhow::Result<()> {
    let api: Arc<dyn StockApi> = Arc::new(HttpStockApi::from_settings(settings)?);
    let store = Arc::new(CacheStore::new());
    let queries = StockQueries::new(Arc::clone(&api), Arc::clone(&store));

    match args.command {
        Command::Latest => {
            let rows = queries.latest_rankings().await?;
            tracing::debug!(rows = rows.len(), "latest rankings fetched");
            print_rankings(&rows, args.json)?;
        }
        Command::Date { date, offset } => {
            let base = match date {
                Some(d) => d,
                None => market_date::today(chrono::Utc::now())?,
            };
            let date = market_date::add_days(&base, offset);

            let rows = queries
                .rankings_for_date(&date)
                .await?
                .context("date must not be empty")?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", market_date::format_display(&date));
                if rows.is_empty() {
                    println!("  (no rankings for this date)");
                } else {
                    print_rankings(&rows, false)?;
                }
            }
        }
        Command::History { ticker } => {
            let (profile, history) = queries
                .stock_history(&ticker)
                .await?
                .context("ticker must not be empty")?;
            tracing::debug!(ticker = %profile.ticker, appearances = history.len(), "history fetched");
            print_history(&profile, &history, args.json)?;
        }
        Command::Sync => {
            let coordinator = SyncCoordinator::new(api, store);
            coordinator.trigger().await?;
            println!("resync complete");
        }
    }

    Ok(())
}

fn print_rankings(rows: &[DisplayRanking], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }

    for row in rows {
        println!(
            "{:>2}. {:<6} {:<28} {:>9.2} {:>+7.2} ({:+.2}%)",
            row.rank, row.ticker, row.name, row.price, row.change_amount, row.change_rate
        );
        if !row.ai_analysis.is_empty() {
            println!("      {}", row.ai_analysis);
        }
    }
    Ok(())
}

fn print_history(
    profile: &StockProfile,
    history: &[RankHistoryEntry],
    json: bool,
) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "profile": profile,
                "history": history,
            }))?
        );
        return Ok(());
    }

    println!("{} {}", profile.ticker, profile.name);
    if !profile.sector.is_empty() || !profile.industry.is_empty() {
        println!("{} / {}", profile.sector, profile.industry);
    }
    if history.is_empty() {
        println!("  (no ranking appearances)");
        return Ok(());
    }
    for entry in history {
        println!(
            "{}  rank {:>2}  {:+.2}%  {}",
            market_date::format_display(&entry.date),
            entry.rank,
            entry.change_rate,
            entry.ai_analysis
        );
    }
    Ok(())
}

fn init_sentry(settings: &movers_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
