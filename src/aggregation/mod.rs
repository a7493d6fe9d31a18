//! Aggregation engine
//!
//! Pure functions from record sequences to derived series, distributions,
//! rankings and summaries. Nothing here performs I/O.

pub use self::{
    buckets::{aggregate, BucketSpec, BucketWidth, MetricSpec, MAX_BUCKETS},
    distribution::{distribution, distribution_series, PERCENTAGE_SCALE},
    performance::{market_cap_tiers, market_overview, performance},
    ranking::{rank, RankBy},
    snapshots::{latest, latest_per_bucket},
};

mod buckets;
mod distribution;
mod performance;
mod ranking;
mod snapshots;
