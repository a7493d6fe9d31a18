use std::{fmt, io, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    Block, BlockchainTransaction, ContractActivity, ExchangeTick,
    MarketQuote, PortfolioPosition, WalletActivity,
};

// =============================================================================
// Domain / record kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DomainKind {
    Blockchain,
    Exchange,
    Portfolio,
    Market,
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DomainKind::Blockchain => write!(f, "blockchain"),
            DomainKind::Exchange => write!(f, "exchange"),
            DomainKind::Portfolio => write!(f, "portfolio"),
            DomainKind::Market => write!(f, "market"),
        }
    }
}

impl FromStr for DomainKind {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<DomainKind, Self::Err> {
        match value {
            "blockchain" => Ok(DomainKind::Blockchain),
            "exchange" => Ok(DomainKind::Exchange),
            "portfolio" => Ok(DomainKind::Portfolio),
            "market" => Ok(DomainKind::Market),
            _ => Err(io::Error::other("Domain not supported")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    BlockchainTransaction,
    WalletActivity,
    ContractActivity,
    Block,
    ExchangeTick,
    PortfolioPosition,
    MarketQuote,
}

impl RecordKind {
    pub fn domain(&self) -> DomainKind {
        match self {
            RecordKind::BlockchainTransaction
            | RecordKind::WalletActivity
            | RecordKind::ContractActivity
            | RecordKind::Block => DomainKind::Blockchain,
            RecordKind::ExchangeTick => DomainKind::Exchange,
            RecordKind::PortfolioPosition => DomainKind::Portfolio,
            RecordKind::MarketQuote => DomainKind::Market,
        }
    }

    /// Remote resource path, relative to the API base URL.
    pub fn endpoint(&self) -> &'static str {
        match self {
            RecordKind::BlockchainTransaction => "api/blockchain/transactions",
            RecordKind::WalletActivity => "api/blockchain/wallet-activity",
            RecordKind::ContractActivity => "api/blockchain/contract-activity",
            RecordKind::Block => "api/blockchain/blocks",
            RecordKind::ExchangeTick => "api/exchange/ticks",
            RecordKind::PortfolioPosition => "api/portfolio/positions",
            RecordKind::MarketQuote => "api/market/quotes",
        }
    }

    pub fn supports(&self, field: MetricField) -> bool {
        use MetricField::*;

        match self {
            RecordKind::BlockchainTransaction => {
                matches!(field, Fee | ValueTransferred | BlockSize)
            },
            RecordKind::WalletActivity => matches!(field, Amount),
            RecordKind::ContractActivity => {
                matches!(field, TxCount | UserCount | Volume)
            },
            RecordKind::Block => matches!(field, TxCount | BlockSize),
            RecordKind::ExchangeTick => matches!(field, Price | Volume),
            RecordKind::PortfolioPosition => {
                matches!(field, Price | Amount | PositionValue)
            },
            RecordKind::MarketQuote => {
                matches!(field, Price | Volume | MarketCap)
            },
        }
    }
}

// =============================================================================
// Shared record attributes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordHeader {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

pub trait DomainRecord {
    fn header(&self) -> &RecordHeader;

    fn id(&self) -> &str {
        &self.header().id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.header().timestamp
    }

    fn source(&self) -> &str {
        &self.header().source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityType {
    Transfer,
    ContractCall,
    Stake,
    Unknown,
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ActivityType::Transfer => write!(f, "transfer"),
            ActivityType::ContractCall => write!(f, "contract-call"),
            ActivityType::Stake => write!(f, "stake"),
            ActivityType::Unknown => write!(f, "unknown"),
        }
    }
}

impl ActivityType {
    /// Never fails: activity names the upstream adds later classify as
    /// `Unknown`.
    pub fn classify(value: &str) -> ActivityType {
        match value.trim().to_lowercase().as_str() {
            "transfer" => ActivityType::Transfer,
            "contract-call" | "contract_call" | "swap" | "mint" | "burn"
            | "liquidity" => ActivityType::ContractCall,
            "stake" | "unstake" | "delegate" => ActivityType::Stake,
            _ => ActivityType::Unknown,
        }
    }
}

/// Numeric attributes the aggregation engine can reduce over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricField {
    Fee,
    ValueTransferred,
    BlockSize,
    Amount,
    Volume,
    TxCount,
    UserCount,
    Price,
    PositionValue,
    MarketCap,
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MetricField::Fee => "fee",
            MetricField::ValueTransferred => "value_transferred",
            MetricField::BlockSize => "block_size",
            MetricField::Amount => "amount",
            MetricField::Volume => "volume",
            MetricField::TxCount => "tx_count",
            MetricField::UserCount => "user_count",
            MetricField::Price => "price",
            MetricField::PositionValue => "position_value",
            MetricField::MarketCap => "market_cap",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Closed set of domain entities
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    BlockchainTransaction(BlockchainTransaction),
    WalletActivity(WalletActivity),
    ContractActivity(ContractActivity),
    Block(Block),
    ExchangeTick(ExchangeTick),
    PortfolioPosition(PortfolioPosition),
    MarketQuote(MarketQuote),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::BlockchainTransaction(_) => {
                RecordKind::BlockchainTransaction
            },
            Record::WalletActivity(_) => RecordKind::WalletActivity,
            Record::ContractActivity(_) => RecordKind::ContractActivity,
            Record::Block(_) => RecordKind::Block,
            Record::ExchangeTick(_) => RecordKind::ExchangeTick,
            Record::PortfolioPosition(_) => RecordKind::PortfolioPosition,
            Record::MarketQuote(_) => RecordKind::MarketQuote,
        }
    }

    /// `None` when the record kind does not carry `field`.
    pub fn metric(&self, field: MetricField) -> Option<BigDecimal> {
        match (self, field) {
            (Record::BlockchainTransaction(tx), MetricField::Fee) => {
                Some(tx.fee.clone())
            },
            (
                Record::BlockchainTransaction(tx),
                MetricField::ValueTransferred,
            ) => Some(tx.value_transferred.clone()),
            (Record::BlockchainTransaction(tx), MetricField::BlockSize) => {
                Some(BigDecimal::from(tx.block_size))
            },
            (Record::WalletActivity(activity), MetricField::Amount) => {
                Some(activity.amount.clone())
            },
            (Record::ContractActivity(activity), MetricField::TxCount) => {
                Some(BigDecimal::from(activity.tx_count))
            },
            (Record::ContractActivity(activity), MetricField::UserCount) => {
                Some(BigDecimal::from(activity.user_count))
            },
            (Record::ContractActivity(activity), MetricField::Volume) => {
                activity.volume.clone()
            },
            (Record::Block(block), MetricField::TxCount) => {
                Some(BigDecimal::from(block.tx_count))
            },
            (Record::Block(block), MetricField::BlockSize) => {
                Some(block.size.clone())
            },
            (Record::ExchangeTick(tick), MetricField::Price) => {
                Some(tick.close.clone())
            },
            (Record::ExchangeTick(tick), MetricField::Volume) => {
                Some(tick.volume.clone())
            },
            (Record::PortfolioPosition(position), MetricField::Price) => {
                Some(position.price.clone())
            },
            (Record::PortfolioPosition(position), MetricField::Amount) => {
                Some(position.quantity.clone())
            },
            (
                Record::PortfolioPosition(position),
                MetricField::PositionValue,
            ) => Some(position.value()),
            (Record::MarketQuote(quote), MetricField::Price) => {
                Some(quote.price.clone())
            },
            (Record::MarketQuote(quote), MetricField::Volume) => {
                Some(quote.volume_24h.clone())
            },
            (Record::MarketQuote(quote), MetricField::MarketCap) => {
                Some(quote.market_cap.clone())
            },
            _ => None,
        }
    }

    pub fn activity_type(&self) -> Option<ActivityType> {
        match self {
            Record::WalletActivity(activity) => Some(activity.activity_type),
            Record::ContractActivity(activity) => Some(activity.activity_type),
            _ => None,
        }
    }

    /// Grouping key for rankings: the wallet, contract, sender, miner or
    /// symbol the record describes.
    pub fn entity_key(&self) -> &str {
        match self {
            Record::BlockchainTransaction(tx) => &tx.from_address,
            Record::WalletActivity(activity) => &activity.address,
            Record::ContractActivity(activity) => &activity.contract_address,
            Record::Block(block) => {
                block.miner.as_deref().unwrap_or(&block.header.id)
            },
            Record::ExchangeTick(tick) => &tick.symbol,
            Record::PortfolioPosition(position) => &position.symbol,
            Record::MarketQuote(quote) => &quote.symbol,
        }
    }
}

impl DomainRecord for Record {
    fn header(&self) -> &RecordHeader {
        match self {
            Record::BlockchainTransaction(item) => item.header(),
            Record::WalletActivity(item) => item.header(),
            Record::ContractActivity(item) => item.header(),
            Record::Block(item) => item.header(),
            Record::ExchangeTick(item) => item.header(),
            Record::PortfolioPosition(item) => item.header(),
            Record::MarketQuote(item) => item.header(),
        }
    }
}
