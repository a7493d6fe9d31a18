use std::collections::HashMap;

use bigdecimal::{BigDecimal, Zero};

use super::buckets::ensure_supported;
use crate::{
    error::Error,
    model::{MetricField, RankedEntity, Record},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankBy {
    /// Number of records per entity.
    Count,
    Sum(MetricField),
}

/// Top `n` entities by `by`, grouped on `Record::entity_key`. Ties are
/// broken by key ascending so repeated calls agree.
pub fn rank(
    records: &[Record],
    by: RankBy,
    n: usize,
) -> Result<Vec<RankedEntity>, Error> {
    if let RankBy::Sum(field) = by {
        ensure_supported(records, field)?;
    }

    let mut totals: HashMap<&str, (BigDecimal, u64)> = HashMap::new();

    for record in records {
        let contribution = match by {
            RankBy::Count => BigDecimal::from(1),
            RankBy::Sum(field) => match record.metric(field) {
                Some(value) => value,
                None => continue,
            },
        };

        let (value, samples) = totals
            .entry(record.entity_key())
            .or_insert_with(|| (BigDecimal::zero(), 0));
        *value += contribution;
        *samples += 1;
    }

    let mut ranked: Vec<RankedEntity> = totals
        .into_iter()
        .map(|(key, (value, sample_count))| RankedEntity {
            key: key.to_owned(),
            value,
            sample_count,
        })
        .collect();

    ranked.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.key.cmp(&b.key)));
    ranked.truncate(n);

    Ok(ranked)
}
