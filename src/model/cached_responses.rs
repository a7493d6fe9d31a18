use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ActivityType;

/// One fixed-width time interval `[period_start, period_end)` of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateBucket {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub metric_name: String,
    pub value: BigDecimal,
    pub sample_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionEntry {
    pub activity_type: ActivityType,
    pub count: u64,
    pub percentage: BigDecimal,
}

/// Activity classification: counts per type and their share of `total`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityDistribution {
    pub total: u64,
    pub entries: Vec<DistributionEntry>,
}

impl ActivityDistribution {
    pub fn get(&self, activity_type: ActivityType) -> Option<&DistributionEntry> {
        self.entries
            .iter()
            .find(|entry| entry.activity_type == activity_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionBucket {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub distribution: ActivityDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntity {
    pub key: String,
    pub value: BigDecimal,
    pub sample_count: u64,
}

/// Return and risk figures over a value series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub initial_value: BigDecimal,
    pub final_value: BigDecimal,
    pub absolute_return: BigDecimal,
    pub percent_return: BigDecimal,
    pub volatility: BigDecimal,
    pub max_drawdown: BigDecimal,
    pub points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCapTier {
    Large,
    Mid,
    Small,
    Micro,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierShare {
    pub tier: MarketCapTier,
    pub count: u64,
    pub market_cap: BigDecimal,
    pub percentage: BigDecimal,
}

/// Whole-market figures over the listed quotes. Dominance is a share of
/// the total market capitalization, in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOverview {
    pub total_market_cap: BigDecimal,
    pub total_volume_24h: BigDecimal,
    pub btc_dominance: BigDecimal,
    pub eth_dominance: BigDecimal,
    pub asset_count: u64,
}
