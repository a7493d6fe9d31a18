use std::collections::BTreeMap;

use super::BucketSpec;
use crate::model::{DomainRecord, Record};

/// Newest record per entity. A later record in input order wins a
/// timestamp tie.
pub fn latest(records: &[Record]) -> Vec<Record> {
    let mut newest: BTreeMap<&str, &Record> = BTreeMap::new();

    for record in records {
        keep_newer(&mut newest, record.entity_key(), record);
    }

    newest.into_values().cloned().collect()
}

/// Newest record per entity within each bucket of `spec`. Records outside
/// the range are dropped.
pub fn latest_per_bucket(records: &[Record], spec: &BucketSpec) -> Vec<Record> {
    let mut newest: BTreeMap<(usize, &str), &Record> = BTreeMap::new();

    for record in records {
        if let Some(index) = spec.index_of(record.timestamp()) {
            keep_newer(&mut newest, (index, record.entity_key()), record);
        }
    }

    newest.into_values().cloned().collect()
}

fn keep_newer<'a, K: Ord>(
    newest: &mut BTreeMap<K, &'a Record>,
    key: K,
    record: &'a Record,
) {
    let replace = newest
        .get(&key)
        .map_or(true, |current| current.timestamp() <= record.timestamp());

    if replace {
        newest.insert(key, record);
    }
}
