use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::Error;

/// Untyped response body as returned by the analytics API.
pub type RawPayload = serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Time(DateTime<Utc>),
}

impl ParamValue {
    /// Representation used in cache keys. Two values share a canonical
    /// form only when they go over the wire identically: `Int(10)`,
    /// `Str("10")` and `Str(" 10 ")` collapse, `Str("007")` does not.
    /// Instants render as unix seconds with any sub-second part kept.
    pub fn canonical(&self) -> String {
        match self {
            ParamValue::Str(value) => value.trim().to_owned(),
            ParamValue::Int(value) => value.to_string(),
            ParamValue::Bool(value) => value.to_string(),
            ParamValue::Time(value) => match value.timestamp_subsec_nanos() {
                0 => value.timestamp().to_string(),
                nanos => {
                    let fraction = format!("{:09}", nanos);
                    format!("{}.{}", value.timestamp(), fraction.trim_end_matches('0'))
                },
            },
        }
    }

    /// Representation sent over the wire.
    pub fn to_wire(&self) -> String {
        match self {
            ParamValue::Str(value) => value.trim().to_owned(),
            ParamValue::Int(value) => value.to_string(),
            ParamValue::Bool(value) => value.to_string(),
            ParamValue::Time(value) => {
                value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            },
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        ParamValue::Time(value)
    }
}

/// Query parameters keyed by their normalized (trimmed, lower-case) name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        key: &str,
        value: impl Into<ParamValue>,
    ) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.0.insert(key.trim().to_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(&key.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn canonical(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(
                self.0.iter().map(|(key, value)| (key, value.canonical())),
            )
            .finish()
    }

    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(key, value)| (key.to_owned(), value.to_wire()))
            .collect()
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, Error> {
        if start >= end {
            return Err(Error::InvalidQuery(format!(
                "time range start {} must precede end {}",
                start, end
            )));
        }

        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.start && *instant < self.end
    }

    pub fn apply(&self, params: QueryParams) -> QueryParams {
        params.with("from", self.start).with("to", self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    #[test]
    fn test_canonical_ignores_order_and_key_case() {
        let a = QueryParams::new()
            .with("chain", "ethereum")
            .with("limit", 100_i64);
        let b = QueryParams::new()
            .with(" LIMIT", "100")
            .with("Chain", "ethereum");

        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), "chain=ethereum&limit=100");
    }

    #[test]
    fn test_canonical_time_matches_unix_seconds() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let a = QueryParams::new().with("from", t);
        let b = QueryParams::new().with("from", t.timestamp());

        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_canonical_keeps_sub_second_instants_apart() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let a = QueryParams::new().with("to", t + TimeDelta::milliseconds(1200));
        let b = QueryParams::new().with("to", t + TimeDelta::milliseconds(1999));

        assert_ne!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), format!("to={}.2", t.timestamp() + 1));
        assert_eq!(
            a.to_query_pairs(),
            vec![("to".to_owned(), "2024-01-01T10:00:01.200Z".to_owned())]
        );
    }

    #[test]
    fn test_canonical_only_folds_identical_wire_values() {
        let padded = QueryParams::new().with("height", "007");
        let plain = QueryParams::new().with("height", "7");
        let number = QueryParams::new().with("height", 7_i64);

        assert_ne!(padded.canonical(), plain.canonical());
        assert_ne!(padded.to_query_pairs(), plain.to_query_pairs());
        assert_eq!(plain.canonical(), number.canonical());
        assert_eq!(plain.to_query_pairs(), number.to_query_pairs());
    }

    #[test]
    fn test_canonical_keeps_value_case() {
        let a = QueryParams::new().with("address", "So1AbC");
        let b = QueryParams::new().with("address", "so1abc");

        assert_ne!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_canonical_escapes_separators() {
        let a = QueryParams::new().with("symbol", "BTC&limit=1");
        let b = QueryParams::new()
            .with("symbol", "BTC")
            .with("limit", 1_i64);

        assert_ne!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_wire_time_is_rfc3339() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let pairs = QueryParams::new().with("from", t).to_query_pairs();

        assert_eq!(
            pairs,
            vec![("from".to_owned(), "2024-01-01T10:00:00Z".to_owned())]
        );
    }

    #[test]
    fn test_time_range_rejects_inverted_bounds() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        assert!(TimeRange::new(t, t).is_err());
        let range = TimeRange::new(t, t + chrono::Duration::hours(1)).unwrap();
        assert!(range.contains(&t));
        assert!(!range.contains(&range.end));
    }
}
