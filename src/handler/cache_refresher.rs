//! Background cache warm-up task
//!
//! Dashboards open on the same handful of queries: the default window of
//! every tracked chain and exchange plus the market overview. This task
//! populates them on startup and re-runs them every refresh interval so
//! the first visitor after an expiry does not pay for the upstream round
//! trip. Failures are logged and never stop the loop.

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::{
    aggregation::MetricSpec,
    configuration::{AppState, State},
    error::Error,
    helpers::TimeWindow,
    model::MetricField,
};

/// Maximum number of concurrent refreshes, keeps the upstream rate limit
/// out of reach.
const MAX_CONCURRENT_REFRESHES: usize = 4;

const TOP_N: usize = 10;
const QUOTES_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
enum WarmQuery {
    Chains,
    FeeSeries(String),
    TransactionCountSeries(String),
    WalletActivityDistribution(String),
    TopWallets(String),
    TopSymbolsByVolume(String),
    Quotes,
    TopByMarketCap,
    MarketCapTiers,
    MarketOverview,
}

impl fmt::Display for WarmQuery {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WarmQuery::Chains => write!(f, "chains"),
            WarmQuery::FeeSeries(chain) => write!(f, "fee_series[{}]", chain),
            WarmQuery::TransactionCountSeries(chain) => {
                write!(f, "transaction_count_series[{}]", chain)
            },
            WarmQuery::WalletActivityDistribution(chain) => {
                write!(f, "wallet_activity_distribution[{}]", chain)
            },
            WarmQuery::TopWallets(chain) => write!(f, "top_wallets[{}]", chain),
            WarmQuery::TopSymbolsByVolume(exchange) => {
                write!(f, "top_symbols_by_volume[{}]", exchange)
            },
            WarmQuery::Quotes => write!(f, "quotes"),
            WarmQuery::TopByMarketCap => write!(f, "top_by_market_cap"),
            WarmQuery::MarketCapTiers => write!(f, "market_cap_tiers"),
            WarmQuery::MarketOverview => write!(f, "market_overview"),
        }
    }
}

/// Main background task for cache warm-up. Runs indefinitely unless
/// `CACHE_WARMUP` is off.
pub async fn cache_refresh_task(app_state: AppState<State>) -> Result<(), Error> {
    if !app_state.config.cache_warmup {
        info!("CACHE_WARMUP disabled, caches fill on demand");
        return Ok(());
    }

    info!("Starting cache refresh background task");
    let mut ticker =
        interval(Duration::from_secs(app_state.config.refresh_interval));

    loop {
        ticker.tick().await;
        refresh_all(&app_state, Utc::now()).await;
    }
}

fn warm_queries(app_state: &AppState<State>) -> Vec<WarmQuery> {
    let config = &app_state.config;
    let mut queries = vec![WarmQuery::Chains];

    for chain in &config.tracked_chains {
        queries.push(WarmQuery::FeeSeries(chain.to_owned()));
        queries.push(WarmQuery::TransactionCountSeries(chain.to_owned()));
        queries.push(WarmQuery::WalletActivityDistribution(chain.to_owned()));
        queries.push(WarmQuery::TopWallets(chain.to_owned()));
    }

    for exchange in &config.tracked_exchanges {
        queries.push(WarmQuery::TopSymbolsByVolume(exchange.to_owned()));
    }

    queries.extend([
        WarmQuery::Quotes,
        WarmQuery::TopByMarketCap,
        WarmQuery::MarketCapTiers,
        WarmQuery::MarketOverview,
    ]);

    queries
}

/// Runs every warm query once. Returns `(succeeded, failed)`.
async fn refresh_all(
    app_state: &AppState<State>,
    now: DateTime<Utc>,
) -> (usize, usize) {
    let window = match TimeWindow::from_period(None, now) {
        Ok(window) => window,
        Err(e) => {
            warn!("Cache refresh skipped: {}", e);
            return (0, 0);
        },
    };

    let queries = warm_queries(app_state);
    debug!(
        "Refreshing {} queries in parallel (max {})",
        queries.len(),
        MAX_CONCURRENT_REFRESHES
    );

    let results: Vec<_> = stream::iter(queries)
        .map(|query| {
            let app_state = app_state.clone();
            async move {
                let result = refresh(&app_state, &query, &window).await;
                (query, result)
            }
        })
        .buffer_unordered(MAX_CONCURRENT_REFRESHES)
        .collect()
        .await;

    let mut succeeded = 0;
    let mut failed = 0;
    for (query, result) in results {
        match result {
            Ok(()) => succeeded += 1,
            Err(e) => {
                failed += 1;
                warn!("Failed to refresh {}: {}", query, e);
            },
        }
    }

    info!(
        "Cache refresh complete: {} succeeded, {} failed",
        succeeded, failed
    );

    (succeeded, failed)
}

async fn refresh(
    app_state: &AppState<State>,
    query: &WarmQuery,
    window: &TimeWindow,
) -> Result<(), Error> {
    let range = window.range;

    match query {
        WarmQuery::Chains => {
            app_state.blockchain.chains().await?;
        },
        WarmQuery::FeeSeries(chain) => {
            app_state
                .blockchain
                .fee_series(
                    chain,
                    window.bucket_spec()?,
                    MetricSpec::Sum(MetricField::Fee),
                )
                .await?;
        },
        WarmQuery::TransactionCountSeries(chain) => {
            app_state
                .blockchain
                .transaction_count_series(chain, window.bucket_spec()?)
                .await?;
        },
        WarmQuery::WalletActivityDistribution(chain) => {
            app_state
                .blockchain
                .wallet_activity_distribution(chain, range)
                .await?;
        },
        WarmQuery::TopWallets(chain) => {
            app_state.blockchain.top_wallets(chain, range, TOP_N).await?;
        },
        WarmQuery::TopSymbolsByVolume(exchange) => {
            app_state
                .exchange
                .top_symbols_by_volume(exchange, range, TOP_N)
                .await?;
        },
        WarmQuery::Quotes => {
            app_state.market.quotes(QUOTES_LIMIT).await?;
        },
        WarmQuery::TopByMarketCap => {
            app_state.market.top_by_market_cap(TOP_N).await?;
        },
        WarmQuery::MarketCapTiers => {
            app_state.market.market_cap_tiers().await?;
        },
        WarmQuery::MarketOverview => {
            app_state.market.overview().await?;
        },
    }

    Ok(())
}
