use std::sync::Arc;

use super::{identifier, limit, metric, Backend};
use crate::{
    aggregation::{
        aggregate, distribution, distribution_series, rank, BucketSpec,
        MetricSpec, RankBy,
    },
    cache::{ApiCache, Cached},
    cache_keys::{
        build_key, BLOCKS, CHAINS, CONTRACT_ACTIVITY_DISTRIBUTION, FEE_SERIES,
        TOP_CONTRACTS, TOP_WALLETS, TRANSACTIONS, TRANSACTION_COUNT_SERIES,
        WALLET_ACTIVITY, WALLET_ACTIVITY_DISTRIBUTION,
        WALLET_ACTIVITY_DISTRIBUTION_SERIES,
    },
    error::Error,
    model::{
        ActivityDistribution, AggregateBucket,
        DistributionBucket, DomainKind, MetricField, RankedEntity, Record,
        RecordKind,
    },
    provider::Transport,
    types::{QueryParams, TimeRange},
};

const CHAINS_ENDPOINT: &str = "api/blockchains";

/// Transactions, wallets, contracts and blocks of one chain at a time.
#[derive(Clone)]
pub struct BlockchainService {
    backend: Backend,
}

impl BlockchainService {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<ApiCache>) -> Self {
        Self {
            backend: Backend::new(transport, cache),
        }
    }

    fn chain_params(chain: &str) -> Result<QueryParams, Error> {
        Ok(QueryParams::new().with("chain", identifier("chain", chain)?))
    }

    fn series_params(chain: &str, spec: &BucketSpec) -> Result<QueryParams, Error> {
        Ok(Self::chain_params(chain)?
            .with("from", spec.start())
            .with("to", spec.end()))
    }

    /// Chains the API serves data for.
    pub async fn chains(&self) -> Result<Cached<Vec<String>>, Error> {
        let key = build_key(DomainKind::Blockchain, CHAINS, &QueryParams::new());
        let load = self.backend.catalog(CHAINS_ENDPOINT);

        self.backend.cache.names.get_or_fetch(key, || load).await
    }

    pub async fn transactions(
        &self,
        chain: &str,
        range: TimeRange,
        max: usize,
    ) -> Result<Cached<Vec<Record>>, Error> {
        let max = limit("limit", max)?;
        let params = range.apply(Self::chain_params(chain)?.with("limit", max));
        let key = build_key(DomainKind::Blockchain, TRANSACTIONS, &params);
        let load = self.backend.load_range(
            RecordKind::BlockchainTransaction,
            params,
            range,
            Some(max),
        );

        self.backend.cache.records.get_or_fetch(key, || load).await
    }

    /// Transaction metric per bucket, typically `Sum`/`Mean` of `Fee`.
    pub async fn fee_series(
        &self,
        chain: &str,
        spec: BucketSpec,
        metric_spec: MetricSpec,
    ) -> Result<Cached<Vec<AggregateBucket>>, Error> {
        let metric_spec = metric(RecordKind::BlockchainTransaction, metric_spec)?;
        self.transaction_series(FEE_SERIES, chain, spec, metric_spec)
            .await
    }

    pub async fn transaction_count_series(
        &self,
        chain: &str,
        spec: BucketSpec,
    ) -> Result<Cached<Vec<AggregateBucket>>, Error> {
        self.transaction_series(
            TRANSACTION_COUNT_SERIES,
            chain,
            spec,
            MetricSpec::Count,
        )
        .await
    }

    async fn transaction_series(
        &self,
        name: &str,
        chain: &str,
        spec: BucketSpec,
        metric_spec: MetricSpec,
    ) -> Result<Cached<Vec<AggregateBucket>>, Error> {
        let params = Self::series_params(chain, &spec)?;
        let key = build_key(
            DomainKind::Blockchain,
            name,
            &params
                .clone()
                .with("bucket_ms", spec.width_ms())
                .with("metric", metric_spec.to_string()),
        );
        let load = self
            .backend
            .load(RecordKind::BlockchainTransaction, params);

        self.backend
            .cache
            .series
            .get_or_fetch(key, || async move {
                aggregate(&load.await?, &spec, &metric_spec)
            })
            .await
    }

    pub async fn wallet_activity(
        &self,
        chain: &str,
        range: TimeRange,
        max: usize,
    ) -> Result<Cached<Vec<Record>>, Error> {
        let max = limit("limit", max)?;
        let params = range.apply(Self::chain_params(chain)?.with("limit", max));
        let key = build_key(DomainKind::Blockchain, WALLET_ACTIVITY, &params);
        let load = self.backend.load_range(
            RecordKind::WalletActivity,
            params,
            range,
            Some(max),
        );

        self.backend.cache.records.get_or_fetch(key, || load).await
    }

    pub async fn wallet_activity_distribution(
        &self,
        chain: &str,
        range: TimeRange,
    ) -> Result<Cached<ActivityDistribution>, Error> {
        self.activity_distribution(
            WALLET_ACTIVITY_DISTRIBUTION,
            RecordKind::WalletActivity,
            chain,
            range,
        )
        .await
    }

    pub async fn contract_activity_distribution(
        &self,
        chain: &str,
        range: TimeRange,
    ) -> Result<Cached<ActivityDistribution>, Error> {
        self.activity_distribution(
            CONTRACT_ACTIVITY_DISTRIBUTION,
            RecordKind::ContractActivity,
            chain,
            range,
        )
        .await
    }

    async fn activity_distribution(
        &self,
        name: &str,
        kind: RecordKind,
        chain: &str,
        range: TimeRange,
    ) -> Result<Cached<ActivityDistribution>, Error> {
        let params = range.apply(Self::chain_params(chain)?);
        let key = build_key(DomainKind::Blockchain, name, &params);
        let load = self.backend.load_range(kind, params, range, None);

        self.backend
            .cache
            .distributions
            .get_or_fetch(key, || async move { Ok(distribution(&load.await?)) })
            .await
    }

    /// Wallet activity mix per bucket, for stacked charts.
    pub async fn wallet_activity_distribution_series(
        &self,
        chain: &str,
        spec: BucketSpec,
    ) -> Result<Cached<Vec<DistributionBucket>>, Error> {
        let params = Self::series_params(chain, &spec)?;
        let key = build_key(
            DomainKind::Blockchain,
            WALLET_ACTIVITY_DISTRIBUTION_SERIES,
            &params.clone().with("bucket_ms", spec.width_ms()),
        );
        let load = self.backend.load(RecordKind::WalletActivity, params);

        self.backend
            .cache
            .distribution_series
            .get_or_fetch(key, || async move {
                Ok(distribution_series(&load.await?, &spec))
            })
            .await
    }

    /// Most active wallets by number of activity records.
    pub async fn top_wallets(
        &self,
        chain: &str,
        range: TimeRange,
        n: usize,
    ) -> Result<Cached<Vec<RankedEntity>>, Error> {
        self.ranking(
            TOP_WALLETS,
            RecordKind::WalletActivity,
            RankBy::Count,
            chain,
            range,
            n,
        )
        .await
    }

    /// Contracts ranked by the transactions they saw.
    pub async fn top_contracts(
        &self,
        chain: &str,
        range: TimeRange,
        n: usize,
    ) -> Result<Cached<Vec<RankedEntity>>, Error> {
        self.ranking(
            TOP_CONTRACTS,
            RecordKind::ContractActivity,
            RankBy::Sum(MetricField::TxCount),
            chain,
            range,
            n,
        )
        .await
    }

    async fn ranking(
        &self,
        name: &str,
        kind: RecordKind,
        by: RankBy,
        chain: &str,
        range: TimeRange,
        n: usize,
    ) -> Result<Cached<Vec<RankedEntity>>, Error> {
        let n = limit("n", n)?;
        let params = range.apply(Self::chain_params(chain)?);
        let key = build_key(DomainKind::Blockchain, name, &params.clone().with("n", n));
        let load = self.backend.load_range(kind, params, range, None);

        self.backend
            .cache
            .rankings
            .get_or_fetch(key, || async move { rank(&load.await?, by, n) })
            .await
    }

    /// Latest blocks of `chain`, newest first as the API returns them.
    pub async fn blocks(
        &self,
        chain: &str,
        max: usize,
    ) -> Result<Cached<Vec<Record>>, Error> {
        let max = limit("limit", max)?;
        let params = Self::chain_params(chain)?.with("limit", max);
        let key = build_key(DomainKind::Blockchain, BLOCKS, &params);
        let load = self.backend.load(RecordKind::Block, params);

        self.backend
            .cache
            .records
            .get_or_fetch(key, || async move {
                let mut blocks = load.await?;
                blocks.truncate(max);
                Ok(blocks)
            })
            .await
    }
}
