//! Consolidated domain entities
//!
//! All entity structs organized by domain sections. Entities are built
//! only by `parse` and never mutated afterwards.

use std::fmt;

use bigdecimal::BigDecimal;
use serde::Serialize;

use super::{ActivityType, DomainRecord, RecordHeader};

// =============================================================================
// BLOCKCHAIN DOMAIN
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockchainTransaction {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub chain: String,
    pub fee: BigDecimal,
    pub block_size: i64,
    pub from_address: String,
    pub to_address: String,
    pub value_transferred: BigDecimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    In,
    Out,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransferDirection::In => write!(f, "in"),
            TransferDirection::Out => write!(f, "out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletActivity {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub address: String,
    pub activity_type: ActivityType,
    pub amount: BigDecimal,
    pub direction: Option<TransferDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractActivity {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub contract_address: String,
    pub activity_type: ActivityType,
    pub user_count: i64,
    pub tx_count: i64,
    pub volume: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub chain: String,
    pub height: i64,
    pub hash: String,
    pub tx_count: i64,
    pub size: BigDecimal,
    pub miner: Option<String>,
}

// =============================================================================
// EXCHANGE DOMAIN
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeTick {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub symbol: String,
    pub open: BigDecimal,
    pub high: BigDecimal,
    pub low: BigDecimal,
    pub close: BigDecimal,
    pub volume: BigDecimal,
    pub bid_depth: Option<BigDecimal>,
    pub ask_depth: Option<BigDecimal>,
}

// =============================================================================
// PORTFOLIO DOMAIN
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioPosition {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub portfolio_id: String,
    pub symbol: String,
    pub quantity: BigDecimal,
    pub price: BigDecimal,
    pub cost_basis: BigDecimal,
    /// Target weight of the position, `0..=1`.
    pub allocation: BigDecimal,
}

impl PortfolioPosition {
    pub fn value(&self) -> BigDecimal {
        &self.quantity * &self.price
    }

    pub fn profit_loss(&self) -> BigDecimal {
        self.value() - &self.cost_basis
    }
}

// =============================================================================
// MARKET DOMAIN
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketQuote {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub symbol: String,
    pub name: String,
    pub price: BigDecimal,
    pub market_cap: BigDecimal,
    pub volume_24h: BigDecimal,
    pub change_24h: BigDecimal,
}

macro_rules! impl_domain_record {
    ($($entity:ty),* $(,)?) => {
        $(
            impl DomainRecord for $entity {
                fn header(&self) -> &RecordHeader {
                    &self.header
                }
            }
        )*
    };
}

impl_domain_record!(
    BlockchainTransaction,
    WalletActivity,
    ContractActivity,
    Block,
    ExchangeTick,
    PortfolioPosition,
    MarketQuote,
);
