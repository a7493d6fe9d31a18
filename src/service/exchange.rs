use std::sync::Arc;

use super::{identifier, limit, Backend};
use crate::{
    aggregation::{aggregate, rank, BucketSpec, MetricSpec, RankBy},
    cache::{ApiCache, Cached},
    cache_keys::{
        build_key, EXCHANGES, PRICE_SERIES, TICKS, TOP_SYMBOLS_BY_VOLUME,
        VOLUME_SERIES,
    },
    error::Error,
    model::{
        AggregateBucket, DomainKind, MetricField, RankedEntity, Record,
        RecordKind,
    },
    provider::Transport,
    types::{QueryParams, TimeRange},
};

const EXCHANGES_ENDPOINT: &str = "api/exchanges";

#[derive(Clone)]
pub struct ExchangeService {
    backend: Backend,
}

impl ExchangeService {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<ApiCache>) -> Self {
        Self {
            backend: Backend::new(transport, cache),
        }
    }

    fn pair_params(exchange: &str, symbol: &str) -> Result<QueryParams, Error> {
        Ok(QueryParams::new()
            .with("exchange", identifier("exchange", exchange)?)
            .with("symbol", identifier("symbol", symbol)?))
    }

    /// Exchanges the API collects ticks from.
    pub async fn exchanges(&self) -> Result<Cached<Vec<String>>, Error> {
        let key = build_key(DomainKind::Exchange, EXCHANGES, &QueryParams::new());
        let load = self.backend.catalog(EXCHANGES_ENDPOINT);

        self.backend.cache.names.get_or_fetch(key, || load).await
    }

    /// Ticks of one trading pair within `range`.
    pub async fn ticks(
        &self,
        exchange: &str,
        symbol: &str,
        range: TimeRange,
    ) -> Result<Cached<Vec<Record>>, Error> {
        let params = range.apply(Self::pair_params(exchange, symbol)?);
        let key = build_key(DomainKind::Exchange, TICKS, &params);
        let load =
            self.backend
                .load_range(RecordKind::ExchangeTick, params, range, None);

        self.backend.cache.records.get_or_fetch(key, || load).await
    }

    /// Traded volume summed per bucket.
    pub async fn volume_series(
        &self,
        exchange: &str,
        symbol: &str,
        spec: BucketSpec,
    ) -> Result<Cached<Vec<AggregateBucket>>, Error> {
        self.series(
            VOLUME_SERIES,
            exchange,
            symbol,
            spec,
            MetricSpec::Sum(MetricField::Volume),
        )
        .await
    }

    /// Mean closing price per bucket.
    pub async fn price_series(
        &self,
        exchange: &str,
        symbol: &str,
        spec: BucketSpec,
    ) -> Result<Cached<Vec<AggregateBucket>>, Error> {
        self.series(
            PRICE_SERIES,
            exchange,
            symbol,
            spec,
            MetricSpec::Mean(MetricField::Price),
        )
        .await
    }

    async fn series(
        &self,
        name: &str,
        exchange: &str,
        symbol: &str,
        spec: BucketSpec,
        metric: MetricSpec,
    ) -> Result<Cached<Vec<AggregateBucket>>, Error> {
        let params = Self::pair_params(exchange, symbol)?
            .with("from", spec.start())
            .with("to", spec.end());
        let key = build_key(
            DomainKind::Exchange,
            name,
            &params.clone().with("bucket_ms", spec.width_ms()),
        );
        let load = self.backend.load(RecordKind::ExchangeTick, params);

        self.backend
            .cache
            .series
            .get_or_fetch(key, || async move {
                aggregate(&load.await?, &spec, &metric)
            })
            .await
    }

    pub async fn top_symbols_by_volume(
        &self,
        exchange: &str,
        range: TimeRange,
        n: usize,
    ) -> Result<Cached<Vec<RankedEntity>>, Error> {
        let n = limit("n", n)?;
        let params = range.apply(
            QueryParams::new().with("exchange", identifier("exchange", exchange)?),
        );
        let key = build_key(
            DomainKind::Exchange,
            TOP_SYMBOLS_BY_VOLUME,
            &params.clone().with("n", n),
        );
        let load =
            self.backend
                .load_range(RecordKind::ExchangeTick, params, range, None);

        self.backend
            .cache
            .rankings
            .get_or_fetch(key, || async move {
                rank(&load.await?, RankBy::Sum(MetricField::Volume), n)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, time::Duration};

    use bigdecimal::BigDecimal;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        aggregation::BucketWidth, model::DomainRecord,
        provider::testing::ScriptedTransport,
    };

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
    }

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn ticks() -> Value {
        let tick = |id: &str, symbol: &str, minute: u32, close: &str, volume: &str| {
            json!({
                "id": id,
                "timestamp": at(9, minute).to_rfc3339(),
                "symbol": symbol,
                "open": close,
                "high": close,
                "low": close,
                "close": close,
                "volume": volume
            })
        };

        json!({
            "success": true,
            "source": "binance",
            "data": [
                tick("1", "BTC-USDT", 0, "100", "1.5"),
                tick("2", "BTC-USDT", 20, "110", "2.5"),
                tick("3", "ETH-USDT", 40, "10", "30"),
                tick("4", "SOL-USDT", 50, "5", "0.25"),
            ]
        })
    }

    fn service(transport: ScriptedTransport) -> (ExchangeService, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let cache = Arc::new(ApiCache::new(Duration::from_secs(60), 32));
        (ExchangeService::new(transport.clone(), cache), transport)
    }

    #[tokio::test]
    async fn test_volume_and_price_series() {
        let (service, _) = service(
            ScriptedTransport::new()
                .reply(RecordKind::ExchangeTick.endpoint(), Ok(ticks())),
        );
        let spec = BucketSpec::new(
            BucketWidth::Custom(chrono::TimeDelta::minutes(30)),
            at(9, 0),
            at(10, 0),
        )
        .unwrap();

        let volume = service
            .volume_series("binance", "BTC-USDT", spec)
            .await
            .unwrap();
        let price = service
            .price_series("binance", "BTC-USDT", spec)
            .await
            .unwrap();

        // the scripted upstream ignores the symbol filter
        assert_eq!(volume.value[0].value, dec("4.0"));
        assert_eq!(volume.value[1].value, dec("30.25"));
        assert_eq!(price.value[0].value, dec("105"));
        assert_eq!(price.value[0].metric_name, "mean_price");
    }

    #[tokio::test]
    async fn test_ticks_inherit_envelope_source() {
        let (service, transport) = service(
            ScriptedTransport::new()
                .reply(RecordKind::ExchangeTick.endpoint(), Ok(ticks())),
        );
        let range = TimeRange::new(at(9, 0), at(9, 30)).unwrap();

        let result = service.ticks("binance", "BTC-USDT", range).await.unwrap();

        assert_eq!(result.value.len(), 2);
        assert!(result
            .value
            .iter()
            .all(|record| record.header().source == "binance"));
        let (endpoint, params) = &transport.calls()[0];
        assert_eq!(endpoint, "api/exchange/ticks");
        assert!(params.get("symbol").is_some());
    }

    #[tokio::test]
    async fn test_top_symbols_by_volume() {
        let (service, transport) = service(
            ScriptedTransport::new()
                .reply(RecordKind::ExchangeTick.endpoint(), Ok(ticks())),
        );
        let range = TimeRange::new(at(9, 0), at(10, 0)).unwrap();

        let top = service
            .top_symbols_by_volume("binance", range, 2)
            .await
            .unwrap();

        assert_eq!(top.value.len(), 2);
        assert_eq!(top.value[0].key, "ETH-USDT");
        assert_eq!(top.value[1].key, "BTC-USDT");
        assert_eq!(top.value[1].value, dec("4"));
        assert_eq!(top.value[1].sample_count, 2);

        assert!(matches!(
            service.top_symbols_by_volume("binance", range, 0).await,
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            service.ticks("binance", " ", range).await,
            Err(Error::InvalidQuery(_))
        ));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_exchange_catalog() {
        let catalog = json!([
            {"id": "binance", "name": "Binance", "status": "connected"},
            {"id": "upbit", "name": "Upbit", "status": "connected"},
        ]);
        let (service, transport) = service(
            ScriptedTransport::new().reply(EXCHANGES_ENDPOINT, Ok(catalog)),
        );

        let exchanges = service.exchanges().await.unwrap();
        service.exchanges().await.unwrap();

        assert_eq!(*exchanges.value, vec!["binance", "upbit"]);
        assert_eq!(transport.call_count(EXCHANGES_ENDPOINT), 1);
    }
}
