//! Domain service façades
//!
//! The only surface presentation code calls. Every query validates its
//! input, builds a cache key and goes through the `ApiCache`; on a miss
//! the spawned fetch runs transport, parsing and aggregation.

use std::{future::Future, sync::Arc};

use crate::{
    aggregation::MetricSpec,
    cache::ApiCache,
    error::Error,
    model::{parse, parse_catalog, DomainRecord, Record, RecordKind},
    provider::Transport,
    types::{QueryParams, TimeRange},
};

pub use self::{
    blockchain::BlockchainService, exchange::ExchangeService,
    market::MarketService, portfolio::PortfolioService,
};

mod blockchain;
mod exchange;
mod market;
mod portfolio;

/// Largest `limit` / `n` a query may ask for.
pub const MAX_LIMIT: usize = 1_000;

#[derive(Clone)]
struct Backend {
    transport: Arc<dyn Transport>,
    cache: Arc<ApiCache>,
}

impl Backend {
    fn new(transport: Arc<dyn Transport>, cache: Arc<ApiCache>) -> Self {
        Self { transport, cache }
    }

    /// Fetch and parse `kind` records. The returned future owns everything
    /// it needs so the cache can run it detached from the caller.
    fn load(
        &self,
        kind: RecordKind,
        params: QueryParams,
    ) -> impl Future<Output = Result<Vec<Record>, Error>> + Send + 'static {
        let transport = Arc::clone(&self.transport);

        async move {
            let payload = transport.fetch(kind.endpoint(), &params).await?;
            parse(kind, &payload)
        }
    }

    /// Fetch a list of identifiers such as the served chains.
    fn catalog(
        &self,
        endpoint: &'static str,
    ) -> impl Future<Output = Result<Vec<String>, Error>> + Send + 'static {
        let transport = Arc::clone(&self.transport);

        async move {
            let payload = transport.fetch(endpoint, &QueryParams::new()).await?;
            parse_catalog(&payload)
        }
    }

    /// Like `load`, keeping only records inside `range`, at most `limit`.
    fn load_range(
        &self,
        kind: RecordKind,
        params: QueryParams,
        range: TimeRange,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<Record>, Error>> + Send + 'static {
        let load = self.load(kind, params);

        async move {
            let mut records = load.await?;
            records.retain(|record| range.contains(&record.timestamp()));
            if let Some(limit) = limit {
                records.truncate(limit);
            }
            Ok(records)
        }
    }
}

fn identifier<'a>(name: &str, value: &'a str) -> Result<&'a str, Error> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidQuery(format!("{} must not be empty", name)));
    }

    Ok(value)
}

fn limit(name: &str, value: usize) -> Result<usize, Error> {
    if value == 0 || value > MAX_LIMIT {
        return Err(Error::InvalidQuery(format!(
            "{} must be within 1..={}, got {}",
            name, MAX_LIMIT, value
        )));
    }

    Ok(value)
}

/// Rejects a metric the record kind does not carry before anything is
/// fetched.
fn metric(kind: RecordKind, metric: MetricSpec) -> Result<MetricSpec, Error> {
    match metric.field() {
        Some(field) if !kind.supports(field) => {
            Err(Error::UnsupportedMetric {
                metric: field,
                kind,
            })
        },
        _ => Ok(metric),
    }
}
