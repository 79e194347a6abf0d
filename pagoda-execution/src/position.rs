use pagoda_instrument::security::Security;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single-security holding.
///
/// `closeable_amount` tracks the T+1 rule: shares acquired today are excluded until the
/// next trade day's before-open refresh. Invariant: `0 <= closeable_amount <= total_amount`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub security: Security,
    pub total_amount: i64,
    pub closeable_amount: i64,
    pub avg_cost: Decimal,
    pub last_price: Decimal,
}

impl Position {
    pub fn new(security: Security) -> Self {
        Self {
            security,
            total_amount: 0,
            closeable_amount: 0,
            avg_cost: Decimal::ZERO,
            last_price: Decimal::ZERO,
        }
    }

    pub fn market_value(&self) -> Decimal {
        Decimal::from(self.total_amount) * self.last_price
    }

    /// Fold a buy fill into the cost basis; fees are capitalised.
    pub fn apply_buy(&mut self, amount: i64, price: Decimal, fees: Decimal) {
        let new_total = self.total_amount + amount;
        self.avg_cost = (self.avg_cost * Decimal::from(self.total_amount)
            + price * Decimal::from(amount)
            + fees)
            / Decimal::from(new_total);
        self.total_amount = new_total;
        self.last_price = price;
    }

    /// Remove sold shares; cost basis is unchanged and the caller records realised P&L.
    pub fn apply_sell(&mut self, amount: i64, price: Decimal) {
        debug_assert!(amount <= self.closeable_amount);
        self.total_amount -= amount;
        self.closeable_amount -= amount;
        self.last_price = price;
        if self.total_amount == 0 {
            self.avg_cost = Decimal::ZERO;
        }
    }

    /// Scale the share count by a split factor; cost basis scales inversely so the
    /// position's cost value is preserved.
    pub fn apply_split(&mut self, scale_factor: Decimal) {
        if self.total_amount == 0 {
            return;
        }
        let old_total = self.total_amount;
        let new_total = (Decimal::from(old_total) * scale_factor)
            .round()
            .try_into()
            .unwrap_or(old_total);
        let new_closeable = (Decimal::from(self.closeable_amount) * scale_factor)
            .round()
            .try_into()
            .unwrap_or(self.closeable_amount);

        self.avg_cost = self.avg_cost * Decimal::from(old_total) / Decimal::from(new_total);
        self.total_amount = new_total;
        self.closeable_amount = new_closeable.min(new_total);
    }

    /// T+1 refresh at before-open: everything held overnight becomes closeable.
    pub fn refresh_closeable(&mut self) {
        self.closeable_amount = self.total_amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position::new(Security::parse("601318.XSHG").unwrap())
    }

    #[test]
    fn test_buy_cost_basis_includes_fees() {
        let mut position = position();
        position.apply_buy(100, dec!(10.0), dec!(5));
        assert_eq!(position.total_amount, 100);
        assert_eq!(position.closeable_amount, 0);
        assert_eq!(position.avg_cost, dec!(10.05));

        position.apply_buy(100, dec!(12.0), dec!(5));
        assert_eq!(position.total_amount, 200);
        // (1005 + 1205) / 200
        assert_eq!(position.avg_cost, dec!(11.05));
    }

    #[test]
    fn test_sell_keeps_cost_basis() {
        let mut position = position();
        position.apply_buy(200, dec!(10.0), dec!(0));
        position.refresh_closeable();
        position.apply_sell(100, dec!(11.0));

        assert_eq!(position.total_amount, 100);
        assert_eq!(position.closeable_amount, 100);
        assert_eq!(position.avg_cost, dec!(10.0));
    }

    #[test]
    fn test_split_preserves_cost_value() {
        let mut position = position();
        position.apply_buy(1000, dec!(10.0), dec!(0));
        position.refresh_closeable();
        position.apply_split(dec!(5));

        assert_eq!(position.total_amount, 5000);
        assert_eq!(position.closeable_amount, 5000);
        assert_eq!(position.avg_cost, dec!(2.0));
    }

    #[test]
    fn test_t_plus_one_excludes_today_buys() {
        let mut position = position();
        position.apply_buy(100, dec!(10.0), dec!(0));
        assert_eq!(position.closeable_amount, 0);
        position.refresh_closeable();
        assert_eq!(position.closeable_amount, 100);

        // New buys after the refresh stay locked until tomorrow
        position.apply_buy(100, dec!(10.0), dec!(0));
        assert_eq!(position.total_amount, 200);
        assert_eq!(position.closeable_amount, 100);
    }
}
