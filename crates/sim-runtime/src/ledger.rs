//! Player portfolio: cash, fixed-rate positions and instrument holdings.

use bevy_ecs::prelude::Resource;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{FixedAsset, GameError, Symbol};
use sim_econ::{annual_accrual, Market};
use std::collections::BTreeMap;
use tracing::debug;

/// Principal committed to a fixed-rate class and the profit accrued on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub principal: Decimal,
    pub profit: Decimal,
}

impl Position {
    pub fn total(&self) -> Decimal {
        self.principal + self.profit
    }
}

/// Owned units of a priced instrument and their average purchase price.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub quantity: u64,
    pub avg_cost: Decimal,
}

#[derive(Resource, Clone, Debug, Serialize, Deserialize)]
pub struct Ledger {
    cash: Decimal,
    positions: BTreeMap<FixedAsset, Position>,
    holdings: BTreeMap<Symbol, Holding>,
}

impl Ledger {
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
            holdings: BTreeMap::new(),
        }
    }

    /// Cash balance; negative means debt.
    pub fn cash(&self) -> Decimal {
        self.cash
    }

    /// Add (or, with a negative amount, remove) cash without any check.
    pub fn adjust_cash(&mut self, delta: Decimal) {
        self.cash += delta;
    }

    pub fn position(&self, asset: FixedAsset) -> Position {
        self.positions.get(&asset).copied().unwrap_or_default()
    }

    pub fn positions(&self) -> impl Iterator<Item = (FixedAsset, Position)> + '_ {
        self.positions.iter().map(|(&a, &p)| (a, p))
    }

    pub fn holding(&self, symbol: &Symbol) -> Option<Holding> {
        self.holdings.get(symbol).copied()
    }

    pub fn holdings(&self) -> impl Iterator<Item = (&Symbol, Holding)> {
        self.holdings.iter().map(|(s, &h)| (s, h))
    }

    pub fn quantity(&self, symbol: &Symbol) -> u64 {
        self.holdings.get(symbol).map_or(0, |h| h.quantity)
    }

    /// Move `amount` of cash into a fixed-rate class.
    pub fn invest(&mut self, asset: FixedAsset, amount: Decimal) -> Result<(), GameError> {
        if amount <= Decimal::ZERO || amount > self.cash {
            return Err(GameError::InvalidAmount(amount));
        }
        self.cash -= amount;
        self.positions.entry(asset).or_default().principal += amount;
        debug!(%asset, %amount, "invested");
        Ok(())
    }

    /// Take `amount` out of a fixed-rate class back into cash.
    ///
    /// Principal and profit are drawn down pro-rata to their share of the
    /// position; a fully drained position is removed.
    pub fn withdraw(&mut self, asset: FixedAsset, amount: Decimal) -> Result<(), GameError> {
        if amount <= Decimal::ZERO {
            return Err(GameError::InvalidAmount(amount));
        }
        let pos = self.position(asset);
        let total = pos.total();
        if amount > total {
            return Err(GameError::InsufficientFunds {
                needed: amount,
                available: total,
            });
        }
        if amount == total {
            self.positions.remove(&asset);
        } else {
            let mut from_principal = (pos.principal * amount / total)
                .round_dp(2)
                .clamp(Decimal::ZERO, pos.principal.min(amount));
            let mut from_profit = amount - from_principal;
            if from_profit > pos.profit {
                from_profit = pos.profit;
                from_principal = amount - from_profit;
            }
            let entry = self.positions.entry(asset).or_default();
            entry.principal -= from_principal;
            entry.profit -= from_profit;
        }
        self.cash += amount;
        debug!(%asset, %amount, "withdrew");
        Ok(())
    }

    /// Buy `quantity` units at the market price. Returns the cost paid.
    pub fn buy(
        &mut self,
        market: &Market,
        symbol: &Symbol,
        quantity: u64,
    ) -> Result<Decimal, GameError> {
        if quantity == 0 {
            return Err(GameError::InvalidAmount(Decimal::ZERO));
        }
        let price = market
            .price(symbol)
            .ok_or_else(|| GameError::InvalidSymbol(symbol.clone()))?;
        let cost = price * Decimal::from(quantity);
        if cost > self.cash {
            return Err(GameError::InsufficientFunds {
                needed: cost,
                available: self.cash,
            });
        }
        self.cash -= cost;
        let h = self.holdings.entry(symbol.clone()).or_insert(Holding {
            quantity: 0,
            avg_cost: Decimal::ZERO,
        });
        let held = Decimal::from(h.quantity);
        h.avg_cost = ((h.avg_cost * held + cost) / (held + Decimal::from(quantity))).round_dp(4);
        h.quantity += quantity;
        debug!(%symbol, quantity, %price, "bought");
        Ok(cost)
    }

    /// Sell `quantity` units at the market price. Returns the proceeds.
    pub fn sell(
        &mut self,
        market: &Market,
        symbol: &Symbol,
        quantity: u64,
    ) -> Result<Decimal, GameError> {
        if quantity == 0 {
            return Err(GameError::InvalidAmount(Decimal::ZERO));
        }
        let price = market
            .price(symbol)
            .ok_or_else(|| GameError::InvalidSymbol(symbol.clone()))?;
        let owned = self.quantity(symbol);
        if quantity > owned {
            return Err(GameError::InsufficientHoldings {
                symbol: symbol.clone(),
                requested: quantity,
                owned,
            });
        }
        let proceeds = price * Decimal::from(quantity);
        if quantity == owned {
            self.holdings.remove(symbol);
        } else if let Some(h) = self.holdings.get_mut(symbol) {
            h.quantity -= quantity;
        }
        self.cash += proceeds;
        debug!(%symbol, quantity, %price, "sold");
        Ok(proceeds)
    }

    /// Book one year of return on every fixed-rate position at the
    /// market's current rates. Returns the total accrued.
    pub fn accrue_year(&mut self, market: &Market) -> Decimal {
        let mut total = Decimal::ZERO;
        for (asset, pos) in self.positions.iter_mut() {
            let gain = annual_accrual(pos.principal, market.rate(*asset));
            pos.profit += gain;
            total += gain;
        }
        total
    }

    pub fn position_value(&self, asset: FixedAsset) -> Decimal {
        self.position(asset).total()
    }

    /// Market value of a holding; zero when nothing is owned.
    pub fn holding_value(&self, market: &Market, symbol: &Symbol) -> Decimal {
        match (self.holdings.get(symbol), market.price(symbol)) {
            (Some(h), Some(price)) => price * Decimal::from(h.quantity),
            _ => Decimal::ZERO,
        }
    }

    /// Unrealized gain: `(price - avg_cost) * quantity`.
    pub fn holding_profit(&self, market: &Market, symbol: &Symbol) -> Decimal {
        match (self.holdings.get(symbol), market.price(symbol)) {
            (Some(h), Some(price)) => (price - h.avg_cost) * Decimal::from(h.quantity),
            _ => Decimal::ZERO,
        }
    }

    /// Value of everything except cash.
    pub fn invested_value(&self, market: &Market) -> Decimal {
        let fixed: Decimal = self.positions.values().map(Position::total).sum();
        let priced: Decimal = self
            .holdings
            .keys()
            .map(|s| self.holding_value(market, s))
            .sum();
        fixed + priced
    }

    pub fn net_worth(&self, market: &Market) -> Decimal {
        self.cash + self.invested_value(market)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sim_core::GameConfig;

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn market() -> Market {
        Market::from_config(&GameConfig::default())
    }

    fn xyz_market(price: i64) -> Market {
        let mut cfg = GameConfig::default();
        let mut spec = cfg.instruments[0].clone();
        spec.symbol = Symbol::from("XYZ");
        spec.initial_price = d(price);
        cfg.instruments.push(spec);
        Market::from_config(&cfg)
    }

    #[test]
    fn invest_moves_cash_to_principal() {
        let mut l = Ledger::new(d(100_000));
        l.invest(FixedAsset::Savings, d(50_000)).unwrap();
        assert_eq!(l.cash(), d(50_000));
        assert_eq!(l.position(FixedAsset::Savings).principal, d(50_000));
        assert_eq!(l.position(FixedAsset::Savings).profit, Decimal::ZERO);
    }

    #[test]
    fn invest_rejects_bad_amounts() {
        let mut l = Ledger::new(d(1_000));
        assert_eq!(
            l.invest(FixedAsset::Gold, Decimal::ZERO),
            Err(GameError::InvalidAmount(Decimal::ZERO))
        );
        assert!(l.invest(FixedAsset::Gold, d(-5)).is_err());
        assert!(l.invest(FixedAsset::Gold, d(1_001)).is_err());
        assert_eq!(l.cash(), d(1_000));
        assert_eq!(l.positions().count(), 0);
    }

    #[test]
    fn invest_fails_while_in_debt() {
        let mut l = Ledger::new(d(-10));
        assert!(matches!(
            l.invest(FixedAsset::Savings, d(1)),
            Err(GameError::InvalidAmount(_))
        ));
    }

    #[test]
    fn over_withdraw_fails_and_leaves_state() {
        let mut l = Ledger::new(d(10_000));
        l.invest(FixedAsset::IndexFund, d(4_000)).unwrap();
        let before = l.clone();
        let err = l.withdraw(FixedAsset::IndexFund, d(4_001)).unwrap_err();
        assert!(matches!(err, GameError::InsufficientFunds { .. }));
        assert_eq!(l.cash(), before.cash());
        assert_eq!(l.position(FixedAsset::IndexFund), before.position(FixedAsset::IndexFund));
        assert!(l.withdraw(FixedAsset::Savings, d(1)).is_err());
        assert!(matches!(
            l.withdraw(FixedAsset::IndexFund, Decimal::ZERO),
            Err(GameError::InvalidAmount(_))
        ));
    }

    #[test]
    fn withdraw_is_pro_rata() {
        let mut l = Ledger::new(d(1_000));
        l.invest(FixedAsset::Savings, d(1_000)).unwrap();
        let m = market();
        // 4% of 1000
        assert_eq!(l.accrue_year(&m), d(40));
        // principal 1000, profit 40: take half
        l.withdraw(FixedAsset::Savings, d(520)).unwrap();
        let p = l.position(FixedAsset::Savings);
        assert_eq!(p.principal, d(500));
        assert_eq!(p.profit, d(20));
        assert_eq!(l.cash(), d(520));
        l.withdraw(FixedAsset::Savings, d(520)).unwrap();
        assert_eq!(l.positions().count(), 0);
        assert_eq!(l.cash(), d(1_040));
    }

    #[test]
    fn sub_cent_withdraw_never_grows_profit() {
        let mut l = Ledger::new(Decimal::ZERO);
        l.positions.insert(
            FixedAsset::Savings,
            Position {
                principal: d(99),
                profit: d(1),
            },
        );
        let amount = Decimal::new(6, 3);
        l.withdraw(FixedAsset::Savings, amount).unwrap();
        let p = l.position(FixedAsset::Savings);
        assert_eq!(p.profit, d(1));
        assert_eq!(p.principal, d(99) - amount);
        assert_eq!(p.total(), d(100) - amount);
        assert_eq!(l.cash(), amount);
    }

    #[test]
    fn buy_beyond_cash_is_rejected() {
        let m = xyz_market(100);
        let mut l = Ledger::new(d(500));
        let err = l.buy(&m, &Symbol::from("XYZ"), 10).unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientFunds {
                needed: d(1_000),
                available: d(500)
            }
        );
        assert_eq!(l.cash(), d(500));
        assert_eq!(l.quantity(&Symbol::from("XYZ")), 0);
    }

    #[test]
    fn buy_and_sell_track_average_cost() {
        let mut m = xyz_market(100);
        let s = Symbol::from("XYZ");
        let mut l = Ledger::new(d(10_000));
        assert_eq!(l.buy(&m, &s, 10).unwrap(), d(1_000));
        m.set_price(&s, d(200)).unwrap();
        l.buy(&m, &s, 10).unwrap();
        let h = l.holding(&s).unwrap();
        assert_eq!(h.quantity, 20);
        assert_eq!(h.avg_cost, d(150));
        assert_eq!(l.holding_value(&m, &s), d(4_000));
        assert_eq!(l.holding_profit(&m, &s), d(1_000));
        assert_eq!(l.sell(&m, &s, 5).unwrap(), d(1_000));
        assert_eq!(l.holding(&s).unwrap().avg_cost, d(150));
        assert_eq!(l.holding_profit(&m, &s), d(750));
        l.sell(&m, &s, 15).unwrap();
        assert!(l.holding(&s).is_none());
        assert_eq!(l.cash(), d(10_000 - 1_000 - 2_000 + 4_000));
    }

    #[test]
    fn oversell_and_unknown_symbols() {
        let m = xyz_market(100);
        let s = Symbol::from("XYZ");
        let mut l = Ledger::new(d(1_000));
        l.buy(&m, &s, 2).unwrap();
        assert!(matches!(
            l.sell(&m, &s, 3),
            Err(GameError::InsufficientHoldings { requested: 3, owned: 2, .. })
        ));
        assert!(matches!(
            l.buy(&m, &Symbol::from("NOPE"), 1),
            Err(GameError::InvalidSymbol(_))
        ));
        assert!(matches!(l.sell(&m, &s, 0), Err(GameError::InvalidAmount(_))));
    }

    #[test]
    fn net_worth_revalues_on_price_change() {
        let mut m = xyz_market(100);
        let s = Symbol::from("XYZ");
        let mut l = Ledger::new(d(2_000));
        l.buy(&m, &s, 10).unwrap();
        l.invest(FixedAsset::Gold, d(500)).unwrap();
        assert_eq!(l.net_worth(&m), d(2_000));
        m.set_price(&s, d(50)).unwrap();
        assert_eq!(l.net_worth(&m), d(1_500));
        assert_eq!(l.invested_value(&m), d(1_000));
    }

    proptest! {
        #[test]
        fn invest_then_withdraw_conserves_cash(cash in 1i64..1_000_000, frac in 1i64..=100) {
            let cash = Decimal::new(cash, 0);
            let amount = (cash * Decimal::new(frac, 2)).round_dp(2).max(Decimal::new(1, 2));
            let mut l = Ledger::new(cash);
            l.invest(FixedAsset::FixedDeposit, amount).unwrap();
            prop_assert_eq!(l.cash() + l.position_value(FixedAsset::FixedDeposit), cash);
            l.withdraw(FixedAsset::FixedDeposit, amount).unwrap();
            prop_assert_eq!(l.cash(), cash);
        }

        #[test]
        fn partial_withdraw_keeps_total(principal in 100i64..100_000, pct in 1i64..99) {
            let m = market();
            let mut l = Ledger::new(Decimal::new(principal, 0));
            l.invest(FixedAsset::IndexFund, Decimal::new(principal, 0)).unwrap();
            l.accrue_year(&m);
            let total = l.position_value(FixedAsset::IndexFund);
            let take = (total * Decimal::new(pct, 2)).round_dp(2);
            l.withdraw(FixedAsset::IndexFund, take).unwrap();
            let p = l.position(FixedAsset::IndexFund);
            prop_assert_eq!(p.total(), total - take);
            prop_assert!(p.principal >= Decimal::ZERO && p.profit >= Decimal::ZERO);
        }
    }
}
