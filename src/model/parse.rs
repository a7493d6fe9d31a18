//! Raw payload to typed entity conversion.
//!
//! Parsing is pure and all-or-nothing: the first missing or malformed
//! required field rejects the whole payload with `Error::Validation`,
//! naming the element index and field (`[3].fee`). Unknown fields are
//! ignored.

use std::{collections::HashSet, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use super::{
    ActivityType, Block, BlockchainTransaction, ContractActivity,
    DomainRecord, ExchangeTick, MarketQuote, PortfolioPosition, Record,
    RecordHeader, RecordKind, TransferDirection, WalletActivity,
};
use crate::{error::Error, types::RawPayload};

const MISSING: &str = "missing required field";

pub fn parse(kind: RecordKind, payload: &RawPayload) -> Result<Vec<Record>, Error> {
    let (items, envelope) = match payload {
        Value::Null => return Ok(vec![]),
        Value::Array(items) => (items, None),
        Value::Object(object) => (unwrap_envelope(object)?, Some(object)),
        _ => {
            return Err(Error::validation(
                "$",
                "expected an array or an object envelope",
            ));
        },
    };

    let mut records = Vec::with_capacity(items.len());
    let mut seen = HashSet::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let object = item.as_object().ok_or_else(|| {
            Error::validation(format!("[{}]", index), "expected an object")
        })?;
        let fields = Fields {
            index,
            object,
            envelope,
        };

        let record = match kind {
            RecordKind::BlockchainTransaction => {
                Record::BlockchainTransaction(blockchain_transaction(&fields)?)
            },
            RecordKind::WalletActivity => {
                Record::WalletActivity(wallet_activity(&fields)?)
            },
            RecordKind::ContractActivity => {
                Record::ContractActivity(contract_activity(&fields)?)
            },
            RecordKind::Block => Record::Block(block(&fields)?),
            RecordKind::ExchangeTick => {
                Record::ExchangeTick(exchange_tick(&fields)?)
            },
            RecordKind::PortfolioPosition => {
                Record::PortfolioPosition(portfolio_position(&fields)?)
            },
            RecordKind::MarketQuote => {
                Record::MarketQuote(market_quote(&fields)?)
            },
        };

        if !seen.insert((record.source().to_owned(), record.id().to_owned())) {
            return Err(fields.invalid("id", "duplicate id"));
        }

        records.push(record);
    }

    Ok(records)
}

/// Identifier list such as the tracked blockchains: plain strings, or
/// objects carrying an `id`.
pub fn parse_catalog(payload: &RawPayload) -> Result<Vec<String>, Error> {
    let items = match payload {
        Value::Null => return Ok(vec![]),
        Value::Array(items) => items,
        Value::Object(object) => unwrap_envelope(object)?,
        _ => {
            return Err(Error::validation(
                "$",
                "expected an array or an object envelope",
            ));
        },
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let id = match item {
                Value::String(id) => Some(id.as_str()),
                Value::Object(object) => object.get("id").and_then(Value::as_str),
                _ => None,
            };

            match id.map(str::trim) {
                Some(id) if !id.is_empty() => Ok(id.to_owned()),
                _ => Err(Error::validation(
                    format!("[{}].id", index),
                    MISSING,
                )),
            }
        })
        .collect()
}

fn unwrap_envelope(object: &Map<String, Value>) -> Result<&Vec<Value>, Error> {
    if let Some(Value::Bool(false)) = object.get("success") {
        let message = object
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("upstream reported failure");
        return Err(Error::validation("success", message));
    }

    match object.get("data") {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None => {
            Err(Error::validation("data", "missing record list"))
        },
        Some(_) => Err(Error::validation("data", "expected an array")),
    }
}

// =============================================================================
// Per-kind field mappings
// =============================================================================

fn blockchain_transaction(
    fields: &Fields,
) -> Result<BlockchainTransaction, Error> {
    Ok(BlockchainTransaction {
        header: fields.header()?,
        chain: fields.string(fields.named(&["chain", "blockchain_id"]))?,
        fee: fields.decimal("fee")?,
        block_size: fields.count("block_size")?,
        from_address: fields.string("from_address")?,
        to_address: fields.string("to_address")?,
        value_transferred: fields
            .decimal(fields.named(&["value_transferred", "value"]))?,
    })
}

fn wallet_activity(fields: &Fields) -> Result<WalletActivity, Error> {
    let direction = match fields.opt_string("direction")?.as_deref() {
        None => None,
        Some("in") => Some(TransferDirection::In),
        Some("out") => Some(TransferDirection::Out),
        Some(other) => {
            return Err(fields.invalid(
                "direction",
                &format!("expected `in` or `out`, got `{}`", other),
            ));
        },
    };

    Ok(WalletActivity {
        header: fields.header()?,
        address: fields.string("address")?,
        activity_type: ActivityType::classify(&fields.string("activity_type")?),
        amount: fields.decimal("amount")?,
        direction,
    })
}

fn contract_activity(fields: &Fields) -> Result<ContractActivity, Error> {
    Ok(ContractActivity {
        header: fields.header()?,
        contract_address: fields.string("contract_address")?,
        activity_type: ActivityType::classify(&fields.string("activity_type")?),
        user_count: fields.count(fields.named(&["user_count", "unique_users"]))?,
        tx_count: fields
            .count(fields.named(&["tx_count", "transaction_count"]))?,
        volume: fields.opt_decimal("volume")?,
    })
}

fn block(fields: &Fields) -> Result<Block, Error> {
    Ok(Block {
        header: fields.header()?,
        chain: fields.string(fields.named(&["chain", "blockchain_id"]))?,
        height: fields.count("height")?,
        hash: fields.string("hash")?,
        tx_count: fields.count(fields.named(&["tx_count", "transactions"]))?,
        size: fields.decimal("size")?,
        miner: fields.opt_string("miner")?,
    })
}

fn exchange_tick(fields: &Fields) -> Result<ExchangeTick, Error> {
    Ok(ExchangeTick {
        header: fields.header()?,
        symbol: fields.string("symbol")?,
        open: fields.decimal("open")?,
        high: fields.decimal("high")?,
        low: fields.decimal("low")?,
        close: fields.decimal("close")?,
        volume: fields.decimal("volume")?,
        bid_depth: fields.opt_decimal("bid_depth")?,
        ask_depth: fields.opt_decimal("ask_depth")?,
    })
}

fn portfolio_position(fields: &Fields) -> Result<PortfolioPosition, Error> {
    let allocation = fields.decimal("allocation")?;
    if allocation < BigDecimal::from(0) || allocation > BigDecimal::from(1) {
        return Err(fields.invalid("allocation", "must be within 0..=1"));
    }

    Ok(PortfolioPosition {
        header: fields.header()?,
        portfolio_id: fields.string("portfolio_id")?,
        symbol: fields.string("symbol")?,
        quantity: fields.decimal("quantity")?,
        price: fields.decimal("price")?,
        cost_basis: fields.decimal("cost_basis")?,
        allocation,
    })
}

fn market_quote(fields: &Fields) -> Result<MarketQuote, Error> {
    Ok(MarketQuote {
        header: fields.header()?,
        symbol: fields.string("symbol")?,
        name: fields.string("name")?,
        price: fields.decimal("price")?,
        market_cap: fields.decimal("market_cap")?,
        volume_24h: fields.decimal("volume_24h")?,
        change_24h: fields.decimal("change_24h")?,
    })
}

// =============================================================================
// Field accessors
// =============================================================================

/// One payload element. Fields missing on the element fall back to the
/// envelope object, so `{"source": "binance", "data": [...]}` works.
struct Fields<'a> {
    index: usize,
    object: &'a Map<String, Value>,
    envelope: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn invalid(&self, field: &str, reason: &str) -> Error {
        Error::validation(format!("[{}].{}", self.index, field), reason)
    }

    fn value(&self, field: &str) -> Option<&'a Value> {
        let own = self.object.get(field).filter(|value| !value.is_null());
        match own {
            Some(value) => Some(value),
            None if field == "id" || field == "timestamp" => None,
            None => self
                .envelope
                .and_then(|envelope| envelope.get(field))
                .filter(|value| !value.is_null()),
        }
    }

    /// First of `names` present on the element, for fields the upstream
    /// has published under more than one name.
    fn named<'n>(&self, names: &[&'n str]) -> &'n str {
        names
            .iter()
            .copied()
            .find(|name| self.value(name).is_some())
            .unwrap_or(names[0])
    }

    fn header(&self) -> Result<RecordHeader, Error> {
        Ok(RecordHeader {
            id: self.string("id")?,
            timestamp: self.timestamp("timestamp")?,
            source: self.string("source")?,
        })
    }

    fn string(&self, field: &str) -> Result<String, Error> {
        self.opt_string(field)?
            .ok_or_else(|| self.invalid(field, MISSING))
    }

    fn opt_string(&self, field: &str) -> Result<Option<String>, Error> {
        match self.value(field) {
            None => Ok(None),
            Some(Value::String(value)) if value.trim().is_empty() => {
                Err(self.invalid(field, "must not be empty"))
            },
            Some(Value::String(value)) => Ok(Some(value.trim().to_owned())),
            Some(_) => Err(self.invalid(field, "expected a string")),
        }
    }

    fn decimal(&self, field: &str) -> Result<BigDecimal, Error> {
        self.opt_decimal(field)?
            .ok_or_else(|| self.invalid(field, MISSING))
    }

    fn opt_decimal(&self, field: &str) -> Result<Option<BigDecimal>, Error> {
        let text = match self.value(field) {
            None => return Ok(None),
            Some(Value::String(value)) => value.trim().to_owned(),
            // exact JSON text, never routed through f64
            Some(Value::Number(value)) => value.to_string(),
            Some(_) => return Err(self.invalid(field, "expected a decimal")),
        };

        BigDecimal::from_str(&text)
            .map(Some)
            .map_err(|e| self.invalid(field, &e.to_string()))
    }

    fn count(&self, field: &str) -> Result<i64, Error> {
        let value = match self.value(field) {
            None => return Err(self.invalid(field, MISSING)),
            Some(Value::Number(value)) => value.as_i64(),
            Some(Value::String(value)) => value.trim().parse::<i64>().ok(),
            Some(_) => None,
        }
        .ok_or_else(|| self.invalid(field, "expected an integer"))?;

        if value < 0 {
            return Err(self.invalid(field, "must not be negative"));
        }

        Ok(value)
    }

    fn timestamp(&self, field: &str) -> Result<DateTime<Utc>, Error> {
        match self.value(field) {
            None => Err(self.invalid(field, MISSING)),
            Some(Value::String(value)) => parse_timestamp(value.trim())
                .ok_or_else(|| self.invalid(field, "malformed timestamp")),
            Some(Value::Number(value)) => value
                .as_i64()
                .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
                .ok_or_else(|| self.invalid(field, "malformed timestamp")),
            Some(_) => Err(self.invalid(field, "malformed timestamp")),
        }
    }
}

/// RFC 3339, or an ISO-8601 local time without offset taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
