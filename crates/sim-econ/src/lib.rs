#![deny(warnings)]

//! Economic models: return rates, instrument prices and accrual for Decade Investor.
//!
//! This crate provides:
//! - Yearly compound accrual for fixed-rate classes
//! - Bounded symmetric perturbation of annual rates at year boundaries
//! - A bounded log-normal random walk for priced instruments
//! - An injectable [`RandomSource`] so tests can replay fixed draws

mod random;

pub use random::{RandomSource, ScriptedRandom, SeededRandom};

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{FixedAsset, GameConfig, InstrumentKind, InstrumentSpec, Symbol};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Lowest price an instrument can fall to.
pub const MIN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Errors produced by economic helpers.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    /// Prices must be strictly positive.
    #[error("invalid price")]
    InvalidPrice,
    /// Numeric conversion to or from floating point failed.
    #[error("non-finite numeric conversion")]
    NonFinite,
}

/// One year of simple interest on `principal` at `rate_pct` percent.
///
/// Example:
/// let p = annual_accrual(Decimal::new(50_000, 0), Decimal::new(4, 0));
/// assert_eq!(p, Decimal::new(2_000, 0));
pub fn annual_accrual(principal: Decimal, rate_pct: Decimal) -> Decimal {
    principal * rate_pct / Decimal::ONE_HUNDRED
}

/// Scale a rate by `1 + u` and floor the result at zero.
///
/// `u` is the relative perturbation, expected within `[-jitter, jitter]`.
pub fn perturb_rate(rate_pct: Decimal, u: f64) -> Result<Decimal, EconError> {
    let factor = Decimal::from_f64(1.0 + u).ok_or(EconError::NonFinite)?;
    Ok((rate_pct * factor).round_dp(4).max(Decimal::ZERO))
}

/// Draw one tick's log return for an instrument.
///
/// `dt_years` is the simulated time the tick covers; mean and deviation are
/// scaled by `dt` and `sqrt(dt)` so the walk does not depend on tick rate.
/// The draw is clamped to `[-max_move, max_move]`.
pub fn log_return(
    rng: &mut dyn RandomSource,
    drift: f64,
    volatility: f64,
    dt_years: f64,
    max_move: f64,
) -> f64 {
    if dt_years <= 0.0 || !dt_years.is_finite() {
        return 0.0;
    }
    let r = rng.normal(drift * dt_years, volatility * dt_years.sqrt());
    if !r.is_finite() {
        return 0.0;
    }
    r.clamp(-max_move, max_move)
}

/// Apply a log return to a price, rounding to cents and flooring at [`MIN_PRICE`].
pub fn apply_return(price: Decimal, log_ret: f64) -> Result<Decimal, EconError> {
    if price <= Decimal::ZERO {
        return Err(EconError::InvalidPrice);
    }
    let factor = Decimal::from_f64(log_ret.exp()).ok_or(EconError::NonFinite)?;
    Ok((price * factor).round_dp(2).max(MIN_PRICE))
}

/// Percentage change from `reference` to `price`, rounded to two places.
pub fn change_pct(reference: Decimal, price: Decimal) -> Decimal {
    if reference <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    ((price - reference) / reference * Decimal::ONE_HUNDRED).round_dp(2)
}

/// Live state of a priced instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub spec: InstrumentSpec,
    pub price: Decimal,
    /// Price at the last simulated month boundary.
    pub reference_price: Decimal,
}

impl Quote {
    fn new(spec: InstrumentSpec) -> Self {
        let price = spec.initial_price;
        Self {
            spec,
            price,
            reference_price: price,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.spec.symbol
    }

    pub fn kind(&self) -> InstrumentKind {
        self.spec.kind
    }

    /// The 24-hour-equivalent change shown next to the price.
    pub fn change_24h(&self) -> Decimal {
        change_pct(self.reference_price, self.price)
    }
}

/// Rates for the fixed-rate classes plus quotes for priced instruments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Market {
    rates: BTreeMap<FixedAsset, Decimal>,
    quotes: BTreeMap<Symbol, Quote>,
    rate_jitter: f64,
    max_move: f64,
}

impl Market {
    pub fn from_config(cfg: &GameConfig) -> Self {
        let rates = FixedAsset::ALL
            .iter()
            .map(|&a| (a, cfg.base_rates.get(a)))
            .collect();
        let quotes = cfg
            .instruments
            .iter()
            .map(|spec| (spec.symbol.clone(), Quote::new(spec.clone())))
            .collect();
        Self {
            rates,
            quotes,
            rate_jitter: cfg.rate_jitter,
            max_move: cfg.max_price_move,
        }
    }

    /// Current annual rate in percent.
    pub fn rate(&self, asset: FixedAsset) -> Decimal {
        self.rates.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn rates(&self) -> impl Iterator<Item = (FixedAsset, Decimal)> + '_ {
        self.rates.iter().map(|(&a, &r)| (a, r))
    }

    pub fn quote(&self, symbol: &Symbol) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    pub fn quotes(&self) -> impl Iterator<Item = &Quote> {
        self.quotes.values()
    }

    pub fn price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.quotes.get(symbol).map(|q| q.price)
    }

    /// Override a price directly (scenario setup and tests).
    pub fn set_price(&mut self, symbol: &Symbol, price: Decimal) -> Result<(), EconError> {
        if price <= Decimal::ZERO {
            return Err(EconError::InvalidPrice);
        }
        let q = self.quotes.get_mut(symbol).ok_or(EconError::InvalidPrice)?;
        q.price = price;
        Ok(())
    }

    /// Year-boundary perturbation of every fixed-rate class.
    pub fn perturb_rates(&mut self, rng: &mut dyn RandomSource) -> Result<(), EconError> {
        let jitter = self.rate_jitter;
        for (asset, rate) in self.rates.iter_mut() {
            let u = rng.uniform(-jitter, jitter);
            let next = perturb_rate(*rate, u)?;
            debug!(%asset, from = %rate, to = %next, "rate perturbed");
            *rate = next;
        }
        Ok(())
    }

    /// Advance every instrument's price by one tick covering `dt_years`.
    pub fn step_prices(&mut self, dt_years: f64, rng: &mut dyn RandomSource) -> Result<(), EconError> {
        if dt_years <= 0.0 {
            return Ok(());
        }
        let max_move = self.max_move;
        for q in self.quotes.values_mut() {
            let r = log_return(rng, q.spec.drift, q.spec.volatility, dt_years, max_move);
            q.price = apply_return(q.price, r)?;
        }
        Ok(())
    }

    /// Start a new 24h-equivalent window at the current prices.
    pub fn roll_reference_prices(&mut self) {
        for q in self.quotes.values_mut() {
            q.reference_price = q.price;
        }
    }

    /// Mean price change across instruments, for log summaries.
    pub fn mean_change_pct(&self) -> f64 {
        if self.quotes.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .quotes
            .values()
            .filter_map(|q| q.change_24h().to_f64())
            .sum();
        sum / self.quotes.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn market() -> Market {
        Market::from_config(&GameConfig::default())
    }

    #[test]
    fn accrual_is_simple_yearly_interest() {
        let p = annual_accrual(Decimal::new(50_000, 0), Decimal::new(4, 0));
        assert_eq!(p, Decimal::new(2_000, 0));
        assert_eq!(annual_accrual(Decimal::ZERO, Decimal::new(12, 0)), Decimal::ZERO);
    }

    #[test]
    fn perturbation_floors_at_zero() {
        assert_eq!(perturb_rate(Decimal::new(4, 0), -1.5).unwrap(), Decimal::ZERO);
        assert_eq!(perturb_rate(Decimal::new(4, 0), 0.0).unwrap(), Decimal::new(4, 0));
        assert_eq!(perturb_rate(Decimal::new(10, 0), 0.1).unwrap(), Decimal::new(11, 0));
    }

    #[test]
    fn market_starts_at_base_rates_and_prices() {
        let m = market();
        assert_eq!(m.rate(FixedAsset::Savings), Decimal::new(4, 0));
        assert_eq!(m.rate(FixedAsset::FixedDeposit), Decimal::new(65, 1));
        let btc = m.quote(&Symbol::from("BTC")).unwrap();
        assert_eq!(btc.price, Decimal::new(30_000, 0));
        assert_eq!(btc.change_24h(), Decimal::ZERO);
        assert_eq!(btc.kind(), InstrumentKind::Crypto);
    }

    #[test]
    fn neutral_source_keeps_rates() {
        let mut m = market();
        let mut rng = ScriptedRandom::neutral();
        m.perturb_rates(&mut rng).unwrap();
        assert_eq!(m.rate(FixedAsset::IndexFund), Decimal::new(12, 0));
    }

    #[test]
    fn extreme_draws_hit_the_jitter_bounds() {
        let mut m = market();
        let mut rng = ScriptedRandom::neutral().with_units(vec![1.0]);
        m.perturb_rates(&mut rng).unwrap();
        assert_eq!(m.rate(FixedAsset::Savings), Decimal::new(44, 1));
        let mut rng = ScriptedRandom::neutral().with_units(vec![0.0]);
        m.perturb_rates(&mut rng).unwrap();
        assert_eq!(m.rate(FixedAsset::Savings), Decimal::new(396, 2));
    }

    #[test]
    fn price_moves_are_clamped() {
        let mut m = market();
        let sym = Symbol::from("SOL");
        // a 50-sigma draw must still be bounded by max_move
        let mut rng = ScriptedRandom::neutral().with_scores(vec![50.0]);
        m.step_prices(1.0, &mut rng).unwrap();
        let p = m.price(&sym).unwrap().to_f64().unwrap();
        let bound = 50.0 * 0.25f64.exp();
        assert!(p <= bound + 0.01, "{p} > {bound}");
        assert!(m.quote(&sym).unwrap().change_24h() > Decimal::ZERO);
        m.roll_reference_prices();
        assert_eq!(m.quote(&sym).unwrap().change_24h(), Decimal::ZERO);
    }

    #[test]
    fn zero_dt_is_noop() {
        let mut m = market();
        let before = m.price(&Symbol::from("TECH"));
        let mut rng = SeededRandom::new(9);
        m.step_prices(0.0, &mut rng).unwrap();
        assert_eq!(m.price(&Symbol::from("TECH")), before);
    }

    #[test]
    fn prices_never_fall_below_floor() {
        let p = apply_return(Decimal::new(1, 2), -0.25).unwrap();
        assert_eq!(p, MIN_PRICE);
        assert_eq!(apply_return(Decimal::ZERO, 0.1), Err(EconError::InvalidPrice));
    }

    #[test]
    fn set_price_validates() {
        let mut m = market();
        let s = Symbol::from("TECH");
        m.set_price(&s, Decimal::new(100, 0)).unwrap();
        assert_eq!(m.price(&s), Some(Decimal::new(100, 0)));
        assert!(m.set_price(&s, Decimal::ZERO).is_err());
        assert!(m.set_price(&Symbol::from("NOPE"), Decimal::ONE).is_err());
    }

    #[test]
    fn seeded_walk_is_reproducible() {
        let mut a = market();
        let mut b = market();
        let mut ra = SeededRandom::new(42);
        let mut rb = SeededRandom::new(42);
        for _ in 0..50 {
            a.step_prices(1.0 / 120.0, &mut ra).unwrap();
            b.step_prices(1.0 / 120.0, &mut rb).unwrap();
        }
        for q in a.quotes() {
            assert_eq!(Some(q.price), b.price(q.symbol()));
        }
    }

    proptest! {
        #[test]
        fn perturbation_stays_within_ten_percent(rate in 0i64..5_000, seed in 0u64..1_000) {
            let rate = Decimal::new(rate, 2);
            let mut rng = SeededRandom::new(seed);
            let u = rng.uniform(-0.1, 0.1);
            let next = perturb_rate(rate, u).unwrap();
            let lo = (rate * Decimal::new(9, 1)).round_dp(4);
            let hi = (rate * Decimal::new(11, 1)).round_dp(4);
            prop_assert!(next >= lo - Decimal::new(1, 4));
            prop_assert!(next <= hi + Decimal::new(1, 4));
            prop_assert!(next >= Decimal::ZERO);
        }

        #[test]
        fn log_return_bounded(seed in 0u64..10_000, dt in 0.0001f64..2.0) {
            let mut rng = SeededRandom::new(seed);
            let r = log_return(&mut rng, 0.3, 1.1, dt, 0.25);
            prop_assert!((-0.25..=0.25).contains(&r));
        }
    }
}
