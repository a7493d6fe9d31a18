use chrono::{DateTime, DurationRound, TimeDelta, Utc};

use crate::{
    aggregation::{BucketSpec, BucketWidth},
    error::Error,
    types::TimeRange,
};

pub const DEFAULT_PERIOD: &str = "1m";

/// Next full hour at or after `now`. Windows built within the same hour
/// share their bounds and with them their cache keys.
fn align(now: DateTime<Utc>) -> DateTime<Utc> {
    let alignment = TimeDelta::hours(1);
    match now.duration_trunc(alignment) {
        Ok(hour) if hour < now => hour.checked_add_signed(alignment).unwrap_or(now),
        Ok(hour) => hour,
        Err(_) => now,
    }
}

/// Look-back window plus the bucket width dashboards chart it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub range: TimeRange,
    pub width: BucketWidth,
}

impl TimeWindow {
    /// Parse a dashboard period (`1d`, `1w`, `1m`, `3m`, `1y`) ending at the
    /// hour following `now`. Default is one month if no period is given.
    pub fn from_period(
        period: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let (look_back, width) =
            match period.map(str::trim).unwrap_or(DEFAULT_PERIOD) {
                "1d" => (TimeDelta::days(1), BucketWidth::Hour),
                "1w" => (
                    TimeDelta::weeks(1),
                    BucketWidth::Custom(TimeDelta::hours(6)),
                ),
                "1m" => (TimeDelta::days(30), BucketWidth::Day),
                "3m" => (
                    TimeDelta::days(90),
                    BucketWidth::Custom(TimeDelta::days(3)),
                ),
                "1y" => (
                    TimeDelta::days(365),
                    BucketWidth::Custom(TimeDelta::days(12)),
                ),
                p => {
                    return Err(Error::InvalidQuery(format!(
                        "period '{}'. Valid options: 1d, 1w, 1m, 3m, 1y",
                        p
                    )));
                },
            };

        let end = align(now);

        Ok(Self {
            range: TimeRange::new(end - look_back, end)?,
            width,
        })
    }

    /// Everything since `start`, in roughly thirty buckets of at least a
    /// day each.
    pub fn since(
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        let end = align(now);
        let range = TimeRange::new(start, end)?;
        let days = (end - start).num_days().max(30) / 30;

        Ok(Self {
            range,
            width: BucketWidth::Custom(TimeDelta::days(days)),
        })
    }

    pub fn bucket_spec(&self) -> Result<BucketSpec, Error> {
        BucketSpec::new(self.width, self.range.start, self.range.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_from_period_widths() {
        let cases = [
            ("1d", 24),
            ("1w", 28),
            ("1m", 30),
            ("3m", 30),
            ("1y", 31),
        ];

        for (period, buckets) in cases {
            let window = TimeWindow::from_period(Some(period), now()).unwrap();
            assert_eq!(window.range.end, now());
            assert_eq!(window.bucket_spec().unwrap().len(), buckets, "{}", period);
        }
    }

    #[test]
    fn test_from_period_default_and_invalid() {
        let window = TimeWindow::from_period(None, now()).unwrap();
        assert_eq!(window.width, BucketWidth::Day);
        assert_eq!(window.range.start, now() - TimeDelta::days(30));

        assert!(matches!(
            TimeWindow::from_period(Some("5y"), now()),
            Err(Error::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_windows_within_an_hour_share_bounds() {
        let early = now() + TimeDelta::minutes(1);
        let late = now() + TimeDelta::minutes(59) + TimeDelta::seconds(59);

        let a = TimeWindow::from_period(Some("1d"), early).unwrap();
        let b = TimeWindow::from_period(Some("1d"), late).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.range.end, now() + TimeDelta::hours(1));

        let start = now() - TimeDelta::days(10);
        assert_eq!(
            TimeWindow::since(start, early).unwrap(),
            TimeWindow::since(start, late).unwrap()
        );
    }

    #[test]
    fn test_since_uses_at_least_daily_buckets() {
        let window =
            TimeWindow::since(now() - TimeDelta::days(10), now()).unwrap();
        assert_eq!(window.width, BucketWidth::Custom(TimeDelta::days(1)));

        let window =
            TimeWindow::since(now() - TimeDelta::days(300), now()).unwrap();
        assert_eq!(window.bucket_spec().unwrap().len(), 30);

        assert!(TimeWindow::since(now(), now()).is_err());
    }
}
