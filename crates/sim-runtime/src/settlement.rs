//! Resolving outstanding events against cash or liquidated holdings.

use crate::events::PendingEvent;
use crate::ledger::Ledger;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{AssetId, EventKind, GameError, GameEvent};
use sim_econ::Market;
use tracing::info;

/// Result of a sell-to-pay step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Settlement {
    /// Cash now covered the cost and the event was paid.
    Settled(GameEvent),
    /// The event is still outstanding; `shortfall` more cash is needed.
    Outstanding { shortfall: Decimal },
}

fn expect_kind(pending: &PendingEvent, expected: EventKind) -> Result<&GameEvent, GameError> {
    let event = pending.0.as_ref().ok_or(GameError::NoPendingEvent)?;
    if event.kind != expected {
        return Err(GameError::EventKindMismatch {
            expected,
            actual: event.kind,
        });
    }
    Ok(event)
}

/// Clear an income event; its cash was credited when it was generated.
pub fn acknowledge_income(pending: &mut PendingEvent) -> Result<GameEvent, GameError> {
    expect_kind(pending, EventKind::Income)?;
    pending.0.take().ok_or(GameError::NoPendingEvent)
}

/// Pay the outstanding expense from cash. Cash may go negative.
pub fn pay_with_cash(
    ledger: &mut Ledger,
    pending: &mut PendingEvent,
) -> Result<GameEvent, GameError> {
    let cost = expect_kind(pending, EventKind::Expense)?.cost;
    ledger.adjust_cash(-cost);
    let event = pending.0.take().ok_or(GameError::NoPendingEvent)?;
    info!(id = event.id, %cost, cash = %ledger.cash(), "expense paid");
    Ok(event)
}

/// Liquidate `amount` of an asset toward the outstanding expense and pay it
/// once cash covers the cost.
///
/// Fixed-rate classes are withdrawn exactly. Instruments are sold in whole
/// units: the smallest count whose proceeds reach `amount`.
pub fn sell_and_pay(
    ledger: &mut Ledger,
    market: &Market,
    pending: &mut PendingEvent,
    asset: &AssetId,
    amount: Decimal,
) -> Result<Settlement, GameError> {
    let cost = expect_kind(pending, EventKind::Expense)?.cost;
    if amount <= Decimal::ZERO {
        return Err(GameError::InvalidAmount(amount));
    }
    match asset {
        AssetId::Fixed(a) => {
            if amount > ledger.position_value(*a) {
                return Err(GameError::InvalidAmount(amount));
            }
            ledger.withdraw(*a, amount)?;
        }
        AssetId::Instrument(symbol) => {
            let price = market
                .price(symbol)
                .ok_or_else(|| GameError::InvalidSymbol(symbol.clone()))?;
            if amount > ledger.holding_value(market, symbol) {
                return Err(GameError::InvalidAmount(amount));
            }
            let units = units_covering(amount, price).min(ledger.quantity(symbol));
            ledger.sell(market, symbol, units)?;
        }
    }
    if ledger.cash() >= cost {
        return pay_with_cash(ledger, pending).map(Settlement::Settled);
    }
    Ok(Settlement::Outstanding {
        shortfall: cost - ledger.cash(),
    })
}

/// Smallest whole number of units worth at least `amount` at `price`.
fn units_covering(amount: Decimal, price: Decimal) -> u64 {
    let units = (amount / price).ceil();
    units.to_u64().unwrap_or(u64::MAX).max(1)
}
