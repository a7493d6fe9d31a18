use bigdecimal::{BigDecimal, Zero};

use super::distribution::{percentage, PERCENTAGE_SCALE};
use crate::model::{
    AggregateBucket, MarketCapTier, MarketOverview, PerformanceSummary,
    Record, TierShare,
};

const TEN_BILLION: i64 = 10_000_000_000;
const ONE_BILLION: i64 = 1_000_000_000;
const HUNDRED_MILLION: i64 = 100_000_000;

fn percent_of(part: &BigDecimal, whole: &BigDecimal) -> BigDecimal {
    if whole.is_zero() {
        return BigDecimal::zero();
    }

    (part * BigDecimal::from(100) / whole).round(PERCENTAGE_SCALE)
}

/// Return and risk figures over a value series. Buckets without samples
/// are gaps, not zero valuations, and are skipped. `None` when no bucket
/// has a value.
///
/// Volatility is the population standard deviation of period-over-period
/// returns in percent; max drawdown the deepest fall from a running peak
/// in percent.
pub fn performance(series: &[AggregateBucket]) -> Option<PerformanceSummary> {
    let values: Vec<&BigDecimal> = series
        .iter()
        .filter(|bucket| bucket.sample_count > 0)
        .map(|bucket| &bucket.value)
        .collect();

    let initial_value = (*values.first()?).clone();
    let final_value = (*values.last()?).clone();
    let absolute_return = &final_value - &initial_value;
    let percent_return = percent_of(&absolute_return, &initial_value);

    let returns: Vec<BigDecimal> = values
        .windows(2)
        .filter(|pair| !pair[0].is_zero())
        .map(|pair| (pair[1] - pair[0]) * BigDecimal::from(100) / pair[0])
        .collect();

    let volatility = if returns.len() < 2 {
        BigDecimal::zero()
    } else {
        let n = BigDecimal::from(returns.len() as u64);
        let mean = returns.iter().sum::<BigDecimal>() / &n;
        let variance = returns
            .iter()
            .map(|r| {
                let deviation = r - &mean;
                &deviation * &deviation
            })
            .sum::<BigDecimal>()
            / &n;
        variance
            .sqrt()
            .unwrap_or_else(BigDecimal::zero)
            .round(PERCENTAGE_SCALE)
    };

    let mut peak = values[0];
    let mut max_drawdown = BigDecimal::zero();
    for value in &values {
        if *value > peak {
            peak = *value;
        }
        let drawdown = percent_of(&(peak - *value), peak);
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
    }

    Some(PerformanceSummary {
        initial_value,
        final_value,
        absolute_return,
        percent_return,
        volatility,
        max_drawdown,
        points: values.len(),
    })
}

impl MarketCapTier {
    pub fn of(market_cap: &BigDecimal) -> MarketCapTier {
        if *market_cap > BigDecimal::from(TEN_BILLION) {
            MarketCapTier::Large
        } else if *market_cap >= BigDecimal::from(ONE_BILLION) {
            MarketCapTier::Mid
        } else if *market_cap >= BigDecimal::from(HUNDRED_MILLION) {
            MarketCapTier::Small
        } else {
            MarketCapTier::Micro
        }
    }
}

/// Share of market quotes per capitalisation tier, all four tiers
/// reported in order. Non-quote records are ignored.
pub fn market_cap_tiers(records: &[Record]) -> Vec<TierShare> {
    let tiers = [
        MarketCapTier::Large,
        MarketCapTier::Mid,
        MarketCapTier::Small,
        MarketCapTier::Micro,
    ];
    let mut shares: Vec<TierShare> = tiers
        .iter()
        .map(|tier| TierShare {
            tier: *tier,
            count: 0,
            market_cap: BigDecimal::zero(),
            percentage: BigDecimal::zero(),
        })
        .collect();

    let quotes = records.iter().filter_map(|record| match record {
        Record::MarketQuote(quote) => Some(quote),
        _ => None,
    });

    let mut total = 0;
    for quote in quotes {
        let tier = MarketCapTier::of(&quote.market_cap);
        if let Some(share) = shares.iter_mut().find(|share| share.tier == tier) {
            share.count += 1;
            share.market_cap += &quote.market_cap;
            total += 1;
        }
    }

    for share in shares.iter_mut() {
        share.percentage = percentage(share.count, total);
    }

    shares
}

/// Totals and BTC/ETH dominance over every quote in `records`.
pub fn market_overview(records: &[Record]) -> MarketOverview {
    let mut total_market_cap = BigDecimal::zero();
    let mut total_volume_24h = BigDecimal::zero();
    let mut btc = BigDecimal::zero();
    let mut eth = BigDecimal::zero();
    let mut asset_count = 0;

    for record in records {
        let Record::MarketQuote(quote) = record else {
            continue;
        };

        total_market_cap += &quote.market_cap;
        total_volume_24h += &quote.volume_24h;
        asset_count += 1;

        if quote.symbol.eq_ignore_ascii_case("BTC") {
            btc += &quote.market_cap;
        } else if quote.symbol.eq_ignore_ascii_case("ETH") {
            eth += &quote.market_cap;
        }
    }

    MarketOverview {
        btc_dominance: percent_of(&btc, &total_market_cap),
        eth_dominance: percent_of(&eth, &total_market_cap),
        total_market_cap,
        total_volume_24h,
        asset_count,
    }
}
