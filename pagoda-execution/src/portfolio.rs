use crate::{position::Position, trade::Trade};
use fnv::FnvHashMap;
use pagoda_instrument::{Side, security::Security};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Cash ledger plus open positions.
///
/// Identity: `total_value == cash + sum(total_amount * last_price)` at every
/// observation point.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Portfolio {
    pub capital_base: Decimal,
    pub cash: Decimal,
    pub positions: FnvHashMap<Security, Position>,
}

impl Portfolio {
    pub fn new(capital_base: Decimal) -> Self {
        Self {
            capital_base,
            cash: capital_base,
            positions: FnvHashMap::default(),
        }
    }

    pub fn position(&self, security: &Security) -> Option<&Position> {
        self.positions.get(security)
    }

    /// Total shares currently held; zero when no position exists.
    pub fn total_amount(&self, security: &Security) -> i64 {
        self.positions
            .get(security)
            .map(|position| position.total_amount)
            .unwrap_or(0)
    }

    /// Shares sellable today under T+1.
    pub fn closeable_amount(&self, security: &Security) -> i64 {
        self.positions
            .get(security)
            .map(|position| position.closeable_amount)
            .unwrap_or(0)
    }

    pub fn total_value(&self) -> Decimal {
        self.cash
            + self
                .positions
                .values()
                .map(Position::market_value)
                .sum::<Decimal>()
    }

    pub fn returns_since_inception(&self) -> Decimal {
        if self.capital_base.is_zero() {
            return Decimal::ZERO;
        }
        self.total_value() / self.capital_base - Decimal::ONE
    }

    /// Fold a fill into cash and positions. Sells return the realised P&L.
    pub fn apply_trade(&mut self, trade: &Trade) -> Decimal {
        let position = self
            .positions
            .entry(trade.security.clone())
            .or_insert_with(|| Position::new(trade.security.clone()));

        match trade.side {
            Side::Buy => {
                self.cash -= trade.value() + trade.fees();
                position.apply_buy(trade.amount, trade.price, trade.fees());
                Decimal::ZERO
            }
            Side::Sell => {
                let realised =
                    (trade.price - position.avg_cost) * Decimal::from(trade.amount) - trade.fees();
                self.cash += trade.value() - trade.fees();
                position.apply_sell(trade.amount, trade.price);
                if position.total_amount == 0 {
                    self.positions.remove(&trade.security);
                }
                debug!(security = %trade.security, %realised, "realised P&L on sell");
                realised
            }
        }
    }

    /// Credit (or debit) the cash ledger directly, eg/ for dividend payouts.
    pub fn post_cash(&mut self, delta: Decimal) {
        self.cash += delta;
    }

    /// T+1 refresh at before-open of each trade day.
    pub fn refresh_closeable(&mut self) {
        for position in self.positions.values_mut() {
            position.refresh_closeable();
        }
    }

    /// Mark positions to the supplied close prices; securities without a price keep
    /// their previous mark.
    pub fn mark_to_market(&mut self, mut price_of: impl FnMut(&Security) -> Option<Decimal>) {
        for position in self.positions.values_mut() {
            if let Some(price) = price_of(&position.security) {
                position.last_price = price;
            }
        }
    }

    /// Validate the per-position invariants; used by driver integrity checks.
    pub fn invariants_hold(&self) -> bool {
        self.positions.values().all(|position| {
            0 <= position.closeable_amount && position.closeable_amount <= position.total_amount
        })
    }
}
