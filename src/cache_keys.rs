//! Centralized cache key constants
//!
//! Query names used by the service façades and the cache refresher are
//! defined here to prevent drift between the two.

use std::fmt;

use crate::{model::DomainKind, types::QueryParams};

// Blockchain queries
pub const CHAINS: &str = "chains";
pub const TRANSACTIONS: &str = "transactions";
pub const FEE_SERIES: &str = "fee_series";
pub const TRANSACTION_COUNT_SERIES: &str = "transaction_count_series";
pub const WALLET_ACTIVITY: &str = "wallet_activity";
pub const WALLET_ACTIVITY_DISTRIBUTION: &str = "wallet_activity_distribution";
pub const WALLET_ACTIVITY_DISTRIBUTION_SERIES: &str =
    "wallet_activity_distribution_series";
pub const TOP_WALLETS: &str = "top_wallets";
pub const CONTRACT_ACTIVITY_DISTRIBUTION: &str =
    "contract_activity_distribution";
pub const TOP_CONTRACTS: &str = "top_contracts";
pub const BLOCKS: &str = "blocks";

// Exchange queries
pub const EXCHANGES: &str = "exchanges";
pub const TICKS: &str = "ticks";
pub const VOLUME_SERIES: &str = "volume_series";
pub const PRICE_SERIES: &str = "price_series";
pub const TOP_SYMBOLS_BY_VOLUME: &str = "top_symbols_by_volume";

// Portfolio queries
pub const PORTFOLIOS: &str = "portfolios";
pub const POSITIONS: &str = "positions";
pub const VALUE_SERIES: &str = "value_series";
pub const PERFORMANCE: &str = "performance";
pub const TOP_HOLDINGS: &str = "top_holdings";

// Market queries
pub const QUOTES: &str = "quotes";
pub const TOP_BY_MARKET_CAP: &str = "top_by_market_cap";
pub const TOP_BY_VOLUME: &str = "top_by_volume";
pub const MARKET_CAP_TIERS: &str = "market_cap_tiers";
pub const MARKET_OVERVIEW: &str = "market_overview";

/// Identity of one cached query: the domain plus `name?canonical-params`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub domain: DomainKind,
    pub query: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.query)
    }
}

impl CacheKey {
    /// Whether a push for `domain` (and optionally one identifier such as a
    /// chain or exchange) concerns this entry.
    pub fn matches(&self, domain: DomainKind, identifier: Option<&str>) -> bool {
        if self.domain != domain {
            return false;
        }

        let Some(identifier) = identifier else {
            return true;
        };

        let params = match self.query.split_once('?') {
            Some((_, params)) => params,
            None => return false,
        };

        url::form_urlencoded::parse(params.as_bytes())
            .any(|(_, value)| value.eq_ignore_ascii_case(identifier))
    }
}

pub fn build_key(
    domain: DomainKind,
    name: &str,
    params: &QueryParams,
) -> CacheKey {
    CacheKey {
        domain,
        query: format!("{}?{}", name, params.canonical()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_params_build_equal_keys() {
        let a = build_key(
            DomainKind::Blockchain,
            TRANSACTIONS,
            &QueryParams::new().with("chain", "ethereum").with("limit", 50_i64),
        );
        let b = build_key(
            DomainKind::Blockchain,
            TRANSACTIONS,
            &QueryParams::new().with("Limit", "50").with("chain", "ethereum"),
        );

        assert_eq!(a, b);
        assert_eq!(a.to_string(), "blockchain/transactions?chain=ethereum&limit=50");
    }

    #[test]
    fn test_domain_and_name_separate_keys() {
        let params = QueryParams::new().with("limit", 10_i64);

        assert_ne!(
            build_key(DomainKind::Market, QUOTES, &params),
            build_key(DomainKind::Exchange, QUOTES, &params)
        );
        assert_ne!(
            build_key(DomainKind::Market, QUOTES, &params),
            build_key(DomainKind::Market, TOP_BY_VOLUME, &params)
        );
    }

    #[test]
    fn test_matches_push_targets() {
        let key = build_key(
            DomainKind::Exchange,
            TICKS,
            &QueryParams::new()
                .with("exchange", "binance")
                .with("symbol", "BTC/USDT"),
        );

        assert!(key.matches(DomainKind::Exchange, None));
        assert!(key.matches(DomainKind::Exchange, Some("Binance")));
        assert!(key.matches(DomainKind::Exchange, Some("BTC/USDT")));
        assert!(!key.matches(DomainKind::Exchange, Some("kraken")));
        assert!(!key.matches(DomainKind::Market, None));
    }
}
