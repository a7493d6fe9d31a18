use std::sync::Arc;

use super::{identifier, limit, Backend};
use crate::{
    aggregation::{
        aggregate, latest, latest_per_bucket, performance, rank, BucketSpec,
        MetricSpec, RankBy,
    },
    cache::{ApiCache, Cached},
    cache_keys::{
        build_key, PERFORMANCE, PORTFOLIOS, POSITIONS, TOP_HOLDINGS,
        VALUE_SERIES,
    },
    error::Error,
    model::{
        AggregateBucket, DomainKind, MetricField, PerformanceSummary,
        RankedEntity, Record, RecordKind,
    },
    provider::Transport,
    types::QueryParams,
};

const PORTFOLIOS_ENDPOINT: &str = "api/portfolios";
const VALUE: MetricSpec = MetricSpec::Sum(MetricField::PositionValue);

/// Portfolio value per bucket: the newest snapshot of every holding in the
/// bucket, summed. `sample_count` is the number of holdings.
fn valuation(
    records: &[Record],
    spec: &BucketSpec,
) -> Result<Vec<AggregateBucket>, Error> {
    aggregate(&latest_per_bucket(records, spec), spec, &VALUE)
}

/// Holdings of a portfolio. Position snapshots over time make up its
/// valuation history.
#[derive(Clone)]
pub struct PortfolioService {
    backend: Backend,
}

impl PortfolioService {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<ApiCache>) -> Self {
        Self {
            backend: Backend::new(transport, cache),
        }
    }

    fn portfolio_params(portfolio_id: &str) -> Result<QueryParams, Error> {
        Ok(QueryParams::new()
            .with("portfolio_id", identifier("portfolio_id", portfolio_id)?))
    }

    fn history_params(
        portfolio_id: &str,
        spec: &BucketSpec,
    ) -> Result<QueryParams, Error> {
        Ok(Self::portfolio_params(portfolio_id)?
            .with("from", spec.start())
            .with("to", spec.end()))
    }

    /// Portfolios known to the API.
    pub async fn portfolios(&self) -> Result<Cached<Vec<String>>, Error> {
        let key = build_key(DomainKind::Portfolio, PORTFOLIOS, &QueryParams::new());
        let load = self.backend.catalog(PORTFOLIOS_ENDPOINT);

        self.backend.cache.names.get_or_fetch(key, || load).await
    }

    pub async fn positions(
        &self,
        portfolio_id: &str,
    ) -> Result<Cached<Vec<Record>>, Error> {
        let params = Self::portfolio_params(portfolio_id)?;
        let key = build_key(DomainKind::Portfolio, POSITIONS, &params);
        let load = self.backend.load(RecordKind::PortfolioPosition, params);

        self.backend.cache.records.get_or_fetch(key, || load).await
    }

    /// Total portfolio value per bucket.
    pub async fn value_series(
        &self,
        portfolio_id: &str,
        spec: BucketSpec,
    ) -> Result<Cached<Vec<AggregateBucket>>, Error> {
        let params = Self::history_params(portfolio_id, &spec)?;
        let key = build_key(
            DomainKind::Portfolio,
            VALUE_SERIES,
            &params.clone().with("bucket_ms", spec.width_ms()),
        );
        let load = self.backend.load(RecordKind::PortfolioPosition, params);

        self.backend
            .cache
            .series
            .get_or_fetch(key, || async move { valuation(&load.await?, &spec) })
            .await
    }

    /// Return, volatility and drawdown of the bucketed valuation. The value
    /// is `None` when no bucket holds a snapshot.
    pub async fn performance(
        &self,
        portfolio_id: &str,
        spec: BucketSpec,
    ) -> Result<Cached<Option<PerformanceSummary>>, Error> {
        let params = Self::history_params(portfolio_id, &spec)?;
        let key = build_key(
            DomainKind::Portfolio,
            PERFORMANCE,
            &params.clone().with("bucket_ms", spec.width_ms()),
        );
        let load = self.backend.load(RecordKind::PortfolioPosition, params);

        self.backend
            .cache
            .performance
            .get_or_fetch(key, || async move {
                let series = valuation(&load.await?, &spec)?;
                Ok(performance(&series))
            })
            .await
    }

    /// Largest current holdings by value, one entry per symbol valued at
    /// its newest snapshot.
    pub async fn top_holdings(
        &self,
        portfolio_id: &str,
        n: usize,
    ) -> Result<Cached<Vec<RankedEntity>>, Error> {
        let n = limit("n", n)?;
        let params = Self::portfolio_params(portfolio_id)?;
        let key = build_key(
            DomainKind::Portfolio,
            TOP_HOLDINGS,
            &params.clone().with("n", n),
        );
        let load = self.backend.load(RecordKind::PortfolioPosition, params);

        self.backend
            .cache
            .rankings
            .get_or_fetch(key, || async move {
                let current = latest(&load.await?);
                rank(&current, RankBy::Sum(MetricField::PositionValue), n)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, time::Duration};

    use bigdecimal::BigDecimal;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        aggregation::BucketWidth, error::TransportError,
        provider::testing::ScriptedTransport,
    };

    fn day(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap()
    }

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn position(id: &str, at: DateTime<Utc>, symbol: &str, quantity: &str, price: &str) -> Value {
        json!({
            "id": id,
            "timestamp": at.to_rfc3339(),
            "symbol": symbol,
            "quantity": quantity,
            "price": price,
            "cost_basis": "50",
            "allocation": "0.5"
        })
    }

    /// Daily snapshots valued 100, 120, 90 and 99.
    fn history() -> Value {
        let btc = ["60", "80", "50", "59"];
        let data: Vec<Value> = btc
            .iter()
            .enumerate()
            .flat_map(|(index, price)| {
                let at = day(index as u32 + 1);
                [
                    position(&format!("btc-{}", index), at, "BTC", "1", price),
                    position(&format!("eth-{}", index), at, "ETH", "2", "20"),
                ]
            })
            .collect();

        json!({
            "success": true,
            "source": "ledger",
            "portfolio_id": "p-1",
            "data": data
        })
    }

    fn service(transport: ScriptedTransport) -> (PortfolioService, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let cache = Arc::new(ApiCache::new(Duration::from_secs(60), 32));
        (PortfolioService::new(transport.clone(), cache), transport)
    }

    #[tokio::test]
    async fn test_value_series_and_performance() {
        let (service, _) = service(
            ScriptedTransport::new()
                .reply(RecordKind::PortfolioPosition.endpoint(), Ok(history())),
        );
        let spec = BucketSpec::new(BucketWidth::Day, day(1), day(6)).unwrap();

        let series = service.value_series("p-1", spec).await.unwrap();
        let values: Vec<BigDecimal> =
            series.value.iter().map(|bucket| bucket.value.clone()).collect();
        assert_eq!(
            values,
            vec![dec("100"), dec("120"), dec("90"), dec("99"), dec("0")]
        );
        assert_eq!(series.value[4].sample_count, 0);

        let summary = service.performance("p-1", spec).await.unwrap();
        let summary = Option::as_ref(&summary.value).unwrap();
        assert_eq!(summary.initial_value, dec("100"));
        assert_eq!(summary.final_value, dec("99"));
        assert_eq!(summary.percent_return, dec("-1"));
        assert_eq!(summary.max_drawdown, dec("25"));
        assert_eq!(summary.points, 4);
    }

    #[tokio::test]
    async fn test_wide_buckets_value_the_newest_snapshot() {
        let (service, _) = service(
            ScriptedTransport::new()
                .reply(RecordKind::PortfolioPosition.endpoint(), Ok(history())),
        );
        let spec = BucketSpec::new(
            BucketWidth::Custom(TimeDelta::days(3)),
            day(1),
            day(7),
        )
        .unwrap();

        let series = service.value_series("p-1", spec).await.unwrap();
        let values: Vec<(BigDecimal, u64)> = series
            .value
            .iter()
            .map(|bucket| (bucket.value.clone(), bucket.sample_count))
            .collect();
        assert_eq!(values, vec![(dec("90"), 2), (dec("99"), 2)]);

        let summary = service.performance("p-1", spec).await.unwrap();
        let summary = Option::as_ref(&summary.value).unwrap();
        assert_eq!(summary.initial_value, dec("90"));
        assert_eq!(summary.final_value, dec("99"));
        assert_eq!(summary.percent_return, dec("10"));
    }

    #[tokio::test]
    async fn test_performance_without_snapshots_is_none() {
        let (service, _) = service(
            ScriptedTransport::new()
                .reply(RecordKind::PortfolioPosition.endpoint(), Ok(json!([]))),
        );
        let spec = BucketSpec::new(BucketWidth::Day, day(1), day(3)).unwrap();

        let summary = service.performance("p-1", spec).await.unwrap();
        assert!(summary.value.is_none());
    }

    #[tokio::test]
    async fn test_top_holdings_and_positions() {
        let current = json!({
            "source": "ledger",
            "portfolio_id": "p-1",
            "data": [
                position("btc", day(1), "BTC", "0.5", "60000"),
                position("eth", day(1), "ETH", "4", "3000"),
                position("sol", day(1), "SOL", "100", "150"),
            ]
        });
        let (service, transport) = service(
            ScriptedTransport::new()
                .reply(RecordKind::PortfolioPosition.endpoint(), Ok(current)),
        );

        let top = service.top_holdings("p-1", 2).await.unwrap();
        let keys: Vec<&str> = top.value.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(keys, vec!["BTC", "SOL"]);
        assert_eq!(top.value[0].value, dec("30000"));

        let positions = service.positions("p-1").await.unwrap();
        assert_eq!(positions.value.len(), 3);
        let (_, params) = &transport.calls()[1];
        assert!(params.get("from").is_none());
    }

    #[tokio::test]
    async fn test_top_holdings_use_newest_snapshot() {
        let snapshots = json!({
            "source": "ledger",
            "portfolio_id": "p-1",
            "data": [
                position("btc-1", day(1), "BTC", "1", "100"),
                position("btc-2", day(2), "BTC", "1", "10"),
                position("eth-1", day(1), "ETH", "1", "50"),
            ]
        });
        let (service, _) = service(
            ScriptedTransport::new()
                .reply(RecordKind::PortfolioPosition.endpoint(), Ok(snapshots)),
        );

        let top = service.top_holdings("p-1", 5).await.unwrap();
        let entries: Vec<(&str, BigDecimal)> = top
            .value
            .iter()
            .map(|entry| (entry.key.as_str(), entry.value.clone()))
            .collect();

        assert_eq!(entries, vec![("ETH", dec("50")), ("BTC", dec("10"))]);
        assert_eq!(top.value[1].sample_count, 1);
    }

    #[tokio::test]
    async fn test_portfolio_list() {
        let (service, transport) = service(ScriptedTransport::new().reply(
            PORTFOLIOS_ENDPOINT,
            Ok(json!([
                {"id": "port_0", "name": "Main Portfolio"},
                {"id": "port_1", "name": "Long-term Investments"},
            ])),
        ));

        let portfolios = service.portfolios().await.unwrap();

        assert_eq!(*portfolios.value, vec!["port_0", "port_1"]);
        assert_eq!(transport.calls()[0].0, "api/portfolios");
    }

    #[tokio::test]
    async fn test_unknown_portfolio_propagates_status() {
        let (service, _) = service(ScriptedTransport::new().reply(
            RecordKind::PortfolioPosition.endpoint(),
            Err(TransportError::HttpStatus(404)),
        ));

        let error = service.positions("missing").await.unwrap_err();
        assert!(matches!(
            error.root(),
            Error::Transport(TransportError::HttpStatus(404))
        ));
        assert!(matches!(
            service.positions("").await,
            Err(Error::InvalidQuery(_))
        ));
    }
}
