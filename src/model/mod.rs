//! Domain model module
//!
//! Typed entities per domain, the closed `Record` set used for dispatch,
//! and the derived shapes produced by the aggregation engine.

mod cached_responses;
mod models;
mod parse;
mod record;

pub use cached_responses::*;
pub use models::*;
pub use parse::{parse, parse_catalog};
pub use record::{
    ActivityType, DomainKind, DomainRecord, MetricField, Record, RecordHeader,
    RecordKind,
};
