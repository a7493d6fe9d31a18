use std::fmt;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    error::Error,
    model::{AggregateBucket, DomainRecord, MetricField, Record},
};

/// Upper bound on buckets per series; wider requests are rejected.
pub const MAX_BUCKETS: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketWidth {
    Minute,
    Hour,
    Day,
    Week,
    Custom(TimeDelta),
}

impl BucketWidth {
    pub fn duration(&self) -> TimeDelta {
        match self {
            BucketWidth::Minute => TimeDelta::minutes(1),
            BucketWidth::Hour => TimeDelta::hours(1),
            BucketWidth::Day => TimeDelta::days(1),
            BucketWidth::Week => TimeDelta::weeks(1),
            BucketWidth::Custom(width) => *width,
        }
    }
}

/// Fixed-width buckets covering `[start, end)`. The last bucket is cut
/// at `end` when the range is not a multiple of the width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpec {
    width_ms: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl BucketSpec {
    pub fn new(
        width: BucketWidth,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let width_ms = width.duration().num_milliseconds();
        if width_ms < 1_000 {
            return Err(Error::InvalidBucketSpec(String::from(
                "bucket width must be at least one second",
            )));
        }

        if start >= end {
            return Err(Error::InvalidBucketSpec(format!(
                "start {} must precede end {}",
                start, end
            )));
        }

        let spec = Self {
            width_ms,
            start,
            end,
        };

        if spec.len() as i64 > MAX_BUCKETS {
            return Err(Error::InvalidBucketSpec(format!(
                "{} buckets requested, at most {} allowed",
                spec.len(),
                MAX_BUCKETS
            )));
        }

        Ok(spec)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn width(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.width_ms)
    }

    /// Exact width, the form used in cache keys.
    pub fn width_ms(&self) -> i64 {
        self.width_ms
    }

    /// `ceil((end - start) / width)`
    pub fn len(&self) -> usize {
        let span = (self.end - self.start).num_milliseconds();
        let count = span / self.width_ms + i64::from(span % self.width_ms != 0);
        count.max(1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn ranges(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        (0..self.len())
            .map(|index| {
                // index * width stays below the span for every bucket but
                // the first, so only the bucket end can leave the calendar
                let offset = TimeDelta::milliseconds(self.width_ms * index as i64);
                let period_start = self.start + offset;
                let period_end = period_start
                    .checked_add_signed(self.width())
                    .map_or(self.end, |period_end| period_end.min(self.end));
                (period_start, period_end)
            })
            .collect()
    }

    /// Bucket containing `instant`, `None` outside `[start, end)`.
    pub fn index_of(&self, instant: DateTime<Utc>) -> Option<usize> {
        if instant < self.start || instant >= self.end {
            return None;
        }

        let offset = (instant - self.start).num_milliseconds();
        let index = (offset / self.width_ms) as usize;

        Some(index.min(self.len() - 1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricSpec {
    Count,
    Sum(MetricField),
    Mean(MetricField),
}

impl MetricSpec {
    pub fn field(&self) -> Option<MetricField> {
        match self {
            MetricSpec::Count => None,
            MetricSpec::Sum(field) | MetricSpec::Mean(field) => Some(*field),
        }
    }
}

impl fmt::Display for MetricSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetricSpec::Count => write!(f, "count"),
            MetricSpec::Sum(field) => write!(f, "sum_{}", field),
            MetricSpec::Mean(field) => write!(f, "mean_{}", field),
        }
    }
}

/// Rejects `field` when any record's kind does not carry it.
pub(crate) fn ensure_supported(
    records: &[Record],
    field: MetricField,
) -> Result<(), Error> {
    match records.iter().find(|record| !record.kind().supports(field)) {
        Some(record) => Err(Error::UnsupportedMetric {
            metric: field,
            kind: record.kind(),
        }),
        None => Ok(()),
    }
}

/// Reduces `records` into one bucket per `spec` range, empty buckets
/// included. Records outside the range are skipped. A record whose
/// optional metric is absent (a contract without reported volume) is
/// not sampled for `Sum`/`Mean`.
pub fn aggregate(
    records: &[Record],
    spec: &BucketSpec,
    metric: &MetricSpec,
) -> Result<Vec<AggregateBucket>, Error> {
    if let Some(field) = metric.field() {
        ensure_supported(records, field)?;
    }

    let mut sums = vec![BigDecimal::zero(); spec.len()];
    let mut samples = vec![0_u64; spec.len()];

    for record in records {
        let Some(index) = spec.index_of(record.timestamp()) else {
            continue;
        };

        match metric.field() {
            None => {
                sums[index] += BigDecimal::from(1);
            },
            Some(field) => match record.metric(field) {
                Some(value) => sums[index] += value,
                None => continue,
            },
        }

        samples[index] += 1;
    }

    let metric_name = metric.to_string();

    Ok(spec
        .ranges()
        .into_iter()
        .zip(sums.into_iter().zip(samples))
        .map(|((period_start, period_end), (sum, sample_count))| {
            let value = match metric {
                MetricSpec::Mean(_) if sample_count > 0 => {
                    sum / BigDecimal::from(sample_count)
                },
                MetricSpec::Mean(_) => BigDecimal::zero(),
                _ => sum,
            };

            AggregateBucket {
                period_start,
                period_end,
                metric_name: metric_name.clone(),
                value,
                sample_count,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;

    use super::*;
    use crate::model::{BlockchainTransaction, RecordHeader, RecordKind};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
    }

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn tx(id: &str, timestamp: DateTime<Utc>, fee: &str) -> Record {
        Record::BlockchainTransaction(BlockchainTransaction {
            header: RecordHeader {
                id: id.to_owned(),
                timestamp,
                source: String::from("ethereum"),
            },
            chain: String::from("ethereum"),
            fee: dec(fee),
            block_size: 1,
            from_address: format!("0x{}", id),
            to_address: String::from("0xdef"),
            value_transferred: dec("1"),
        })
    }

    #[test]
    fn test_hourly_fee_sum_and_mean() {
        let records = vec![
            tx("a", at(10, 0), "1.0"),
            tx("b", at(10, 30), "2.0"),
            tx("c", at(11, 15), "3.0"),
        ];
        let spec = BucketSpec::new(BucketWidth::Hour, at(10, 0), at(12, 0)).unwrap();

        let sums =
            aggregate(&records, &spec, &MetricSpec::Sum(MetricField::Fee))
                .unwrap();
        let means =
            aggregate(&records, &spec, &MetricSpec::Mean(MetricField::Fee))
                .unwrap();

        assert_eq!(sums.len(), 2);
        assert_eq!((sums[0].period_start, sums[0].period_end), (at(10, 0), at(11, 0)));
        assert_eq!(sums[0].sample_count, 2);
        assert_eq!(sums[0].value, dec("3.0"));
        assert_eq!(means[0].value, dec("1.5"));

        assert_eq!((sums[1].period_start, sums[1].period_end), (at(11, 0), at(12, 0)));
        assert_eq!(sums[1].sample_count, 1);
        assert_eq!(sums[1].value, dec("3.0"));
        assert_eq!(means[1].value, dec("3.0"));
        assert_eq!(means[1].metric_name, "mean_fee");
    }

    #[test]
    fn test_empty_range_yields_zero_buckets() {
        let spec = BucketSpec::new(BucketWidth::Hour, at(0, 0), at(6, 0)).unwrap();

        for metric in [
            MetricSpec::Count,
            MetricSpec::Sum(MetricField::Fee),
            MetricSpec::Mean(MetricField::Fee),
        ] {
            let buckets = aggregate(&[], &spec, &metric).unwrap();
            assert_eq!(buckets.len(), 6);
            assert!(buckets
                .iter()
                .all(|bucket| bucket.sample_count == 0 && bucket.value.is_zero()));
        }
    }

    #[test]
    fn test_bucket_count_is_ceiling_and_contiguous() {
        let cases = [
            (BucketWidth::Hour, at(10, 0), at(12, 0), 2),
            (BucketWidth::Hour, at(10, 0), at(12, 1), 3),
            (BucketWidth::Minute, at(10, 0), at(10, 0) + TimeDelta::seconds(1), 1),
            (BucketWidth::Custom(TimeDelta::minutes(25)), at(0, 0), at(2, 0), 5),
            (BucketWidth::Day, at(0, 0), at(0, 0) + TimeDelta::days(30), 30),
        ];

        for (width, start, end, expected) in cases {
            let spec = BucketSpec::new(width, start, end).unwrap();
            let ranges = spec.ranges();

            assert_eq!(ranges.len(), expected);
            assert_eq!(ranges.first().unwrap().0, start);
            assert_eq!(ranges.last().unwrap().1, end);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].1, pair[1].0);
                assert!(pair[0].0 < pair[1].0);
            }
        }
    }

    #[test]
    fn test_width_beyond_calendar_is_one_bucket() {
        let records = vec![tx("a", at(10, 30), "2")];

        for width in [TimeDelta::MAX, TimeDelta::weeks(20_000_000)] {
            let spec =
                BucketSpec::new(BucketWidth::Custom(width), at(10, 0), at(12, 0))
                    .unwrap();
            assert_eq!(spec.ranges(), vec![(at(10, 0), at(12, 0))]);

            let buckets =
                aggregate(&records, &spec, &MetricSpec::Sum(MetricField::Fee))
                    .unwrap();
            assert_eq!(buckets.len(), 1);
            assert_eq!(buckets[0].value, dec("2"));
            assert_eq!(buckets[0].period_end, at(12, 0));
        }
    }

    #[test]
    fn test_sample_counts_cover_in_range_records() {
        let records = vec![
            tx("early", at(9, 59), "1"),
            tx("a", at(10, 0), "1"),
            tx("b", at(10, 59), "1"),
            tx("c", at(13, 20), "1"),
            tx("d", at(15, 59), "1"),
            tx("end", at(16, 0), "1"),
        ];
        let spec = BucketSpec::new(
            BucketWidth::Custom(TimeDelta::minutes(90)),
            at(10, 0),
            at(16, 0),
        )
        .unwrap();

        let buckets = aggregate(&records, &spec, &MetricSpec::Count).unwrap();
        let sampled: u64 = buckets.iter().map(|bucket| bucket.sample_count).sum();

        assert_eq!(sampled, 4);
        assert_eq!(buckets[0].value, BigDecimal::from(2));
    }

    #[test]
    fn test_invalid_specs_and_metrics() {
        assert!(matches!(
            BucketSpec::new(BucketWidth::Hour, at(12, 0), at(10, 0)),
            Err(Error::InvalidBucketSpec(_))
        ));
        assert!(matches!(
            BucketSpec::new(BucketWidth::Custom(TimeDelta::zero()), at(10, 0), at(12, 0)),
            Err(Error::InvalidBucketSpec(_))
        ));
        assert!(matches!(
            BucketSpec::new(
                BucketWidth::Minute,
                at(0, 0),
                at(0, 0) + TimeDelta::days(365)
            ),
            Err(Error::InvalidBucketSpec(_))
        ));

        let spec = BucketSpec::new(BucketWidth::Hour, at(10, 0), at(12, 0)).unwrap();
        let records = vec![tx("a", at(10, 0), "1")];
        match aggregate(&records, &spec, &MetricSpec::Sum(MetricField::Price)) {
            Err(Error::UnsupportedMetric { metric, kind }) => {
                assert_eq!(metric, MetricField::Price);
                assert_eq!(kind, RecordKind::BlockchainTransaction);
            },
            other => panic!("expected unsupported metric, got {:?}", other),
        }
    }
}
