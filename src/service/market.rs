use std::sync::Arc;

use super::{limit, Backend};
use crate::{
    aggregation::{market_cap_tiers, market_overview, rank, RankBy},
    cache::{ApiCache, Cached},
    cache_keys::{
        build_key, MARKET_CAP_TIERS, MARKET_OVERVIEW, QUOTES, TOP_BY_MARKET_CAP,
        TOP_BY_VOLUME,
    },
    error::Error,
    model::{
        DomainKind, MarketOverview, MetricField, RankedEntity, Record,
        RecordKind, TierShare,
    },
    provider::Transport,
    types::QueryParams,
};

#[derive(Clone)]
pub struct MarketService {
    backend: Backend,
}

impl MarketService {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<ApiCache>) -> Self {
        Self {
            backend: Backend::new(transport, cache),
        }
    }

    pub async fn quotes(&self, max: usize) -> Result<Cached<Vec<Record>>, Error> {
        let max = limit("limit", max)?;
        let params = QueryParams::new().with("limit", max);
        let key = build_key(DomainKind::Market, QUOTES, &params);
        let load = self.backend.load(RecordKind::MarketQuote, params);

        self.backend
            .cache
            .records
            .get_or_fetch(key, || async move {
                let mut quotes = load.await?;
                quotes.truncate(max);
                Ok(quotes)
            })
            .await
    }

    pub async fn top_by_market_cap(
        &self,
        n: usize,
    ) -> Result<Cached<Vec<RankedEntity>>, Error> {
        self.ranking(TOP_BY_MARKET_CAP, MetricField::MarketCap, n)
            .await
    }

    /// Ranked by 24h volume.
    pub async fn top_by_volume(
        &self,
        n: usize,
    ) -> Result<Cached<Vec<RankedEntity>>, Error> {
        self.ranking(TOP_BY_VOLUME, MetricField::Volume, n).await
    }

    async fn ranking(
        &self,
        name: &str,
        field: MetricField,
        n: usize,
    ) -> Result<Cached<Vec<RankedEntity>>, Error> {
        let n = limit("n", n)?;
        let key =
            build_key(DomainKind::Market, name, &QueryParams::new().with("n", n));
        let load = self.backend.load(RecordKind::MarketQuote, QueryParams::new());

        self.backend
            .cache
            .rankings
            .get_or_fetch(key, || async move {
                rank(&load.await?, RankBy::Sum(field), n)
            })
            .await
    }

    /// Share of the listed market in each capitalization tier.
    pub async fn market_cap_tiers(&self) -> Result<Cached<Vec<TierShare>>, Error> {
        let key = build_key(DomainKind::Market, MARKET_CAP_TIERS, &QueryParams::new());
        let load = self.backend.load(RecordKind::MarketQuote, QueryParams::new());

        self.backend
            .cache
            .tiers
            .get_or_fetch(key, || async move { Ok(market_cap_tiers(&load.await?)) })
            .await
    }

    /// Total capitalization, 24h volume and BTC/ETH dominance.
    pub async fn overview(&self) -> Result<Cached<MarketOverview>, Error> {
        let key = build_key(DomainKind::Market, MARKET_OVERVIEW, &QueryParams::new());
        let load = self.backend.load(RecordKind::MarketQuote, QueryParams::new());

        self.backend
            .cache
            .overviews
            .get_or_fetch(key, || async move { Ok(market_overview(&load.await?)) })
            .await
    }
}
