use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, Zero};

use super::BucketSpec;
use crate::model::{
    ActivityDistribution, ActivityType, DistributionBucket, DistributionEntry,
    DomainRecord, Record,
};

/// Decimal places kept on percentages.
pub const PERCENTAGE_SCALE: i64 = 4;

pub(crate) fn percentage(part: u64, total: u64) -> BigDecimal {
    if total == 0 {
        return BigDecimal::zero();
    }

    (BigDecimal::from(part) * BigDecimal::from(100) / BigDecimal::from(total))
        .round(PERCENTAGE_SCALE)
}

/// Groups records by activity type. Records that carry no activity type
/// are not classified and do not count towards `total`.
pub fn distribution<'a, I>(records: I) -> ActivityDistribution
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut counts: BTreeMap<ActivityType, u64> = BTreeMap::new();

    for activity_type in records.into_iter().filter_map(Record::activity_type) {
        *counts.entry(activity_type).or_default() += 1;
    }

    let total = counts.values().sum();
    let mut entries: Vec<DistributionEntry> = counts
        .into_iter()
        .map(|(activity_type, count)| DistributionEntry {
            activity_type,
            count,
            percentage: percentage(count, total),
        })
        .collect();

    entries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(a.activity_type.cmp(&b.activity_type))
    });

    ActivityDistribution { total, entries }
}

/// One distribution per bucket of `spec`; records outside the range are
/// skipped.
pub fn distribution_series(
    records: &[Record],
    spec: &BucketSpec,
) -> Vec<DistributionBucket> {
    let mut grouped: Vec<Vec<&Record>> = vec![Vec::new(); spec.len()];

    for record in records {
        if let Some(index) = spec.index_of(record.timestamp()) {
            grouped[index].push(record);
        }
    }

    spec.ranges()
        .into_iter()
        .zip(grouped)
        .map(|((period_start, period_end), bucket)| DistributionBucket {
            period_start,
            period_end,
            distribution: distribution(bucket),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::{
        aggregation::BucketWidth,
        model::{RecordHeader, WalletActivity},
    };

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    fn activity(id: &str, hour: u32, activity_type: ActivityType) -> Record {
        Record::WalletActivity(WalletActivity {
            header: RecordHeader {
                id: id.to_owned(),
                timestamp: at(hour),
                source: String::from("ethereum"),
            },
            address: String::from("0xabc"),
            activity_type,
            amount: BigDecimal::from(1),
            direction: None,
        })
    }

    #[test]
    fn test_distribution_counts_and_percentages() {
        let records = vec![
            activity("1", 1, ActivityType::Transfer),
            activity("2", 1, ActivityType::Stake),
            activity("3", 1, ActivityType::ContractCall),
            activity("4", 1, ActivityType::Transfer),
        ];

        let result = distribution(&records);
        assert_eq!(result.total, 4);

        let order: Vec<ActivityType> = result
            .entries
            .iter()
            .map(|entry| entry.activity_type)
            .collect();
        assert_eq!(
            order,
            vec![
                ActivityType::Transfer,
                ActivityType::ContractCall,
                ActivityType::Stake
            ]
        );

        let transfer = result.get(ActivityType::Transfer).unwrap();
        assert_eq!(transfer.count, 2);
        assert_eq!(transfer.percentage, BigDecimal::from(50));
        assert_eq!(
            result.get(ActivityType::ContractCall).unwrap().percentage,
            BigDecimal::from(25)
        );
        assert_eq!(
            result.get(ActivityType::Stake).unwrap().percentage,
            BigDecimal::from(25)
        );
    }

    #[test]
    fn test_percentages_sum_within_tolerance() {
        let records = vec![
            activity("1", 1, ActivityType::Transfer),
            activity("2", 1, ActivityType::Stake),
            activity("3", 1, ActivityType::ContractCall),
        ];

        let result = distribution(&records);
        let sum: BigDecimal = result
            .entries
            .iter()
            .map(|entry| entry.percentage.clone())
            .sum();
        let drift = (sum - BigDecimal::from(100)).abs();

        assert!(drift <= BigDecimal::from_str("0.01").unwrap());
        assert_eq!(
            result.entries[0].percentage,
            BigDecimal::from_str("33.3333").unwrap()
        );
    }

    #[test]
    fn test_empty_distribution() {
        let result = distribution(&Vec::<Record>::new());

        assert_eq!(result.total, 0);
        assert!(result.entries.is_empty());
        assert_eq!(percentage(0, 0), BigDecimal::zero());
    }

    #[test]
    fn test_distribution_series_per_bucket() {
        let records = vec![
            activity("1", 1, ActivityType::Transfer),
            activity("2", 1, ActivityType::Stake),
            activity("3", 3, ActivityType::Stake),
            activity("4", 9, ActivityType::Stake),
        ];
        let spec = BucketSpec::new(BucketWidth::Hour, at(0), at(4)).unwrap();

        let series = distribution_series(&records, &spec);

        assert_eq!(series.len(), 4);
        assert_eq!(series[0].distribution.total, 0);
        assert_eq!(series[1].distribution.total, 2);
        assert_eq!(series[3].distribution.entries[0].count, 1);
        assert_eq!(
            series[3].distribution.entries[0].percentage,
            BigDecimal::from(100)
        );
    }
}
