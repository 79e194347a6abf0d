use chrono::NaiveDateTime;
use derive_more::{Constructor, Display, From};
use pagoda_instrument::{Side, security::Security};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Unique order identifier.
#[derive(
    Debug,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Deserialize,
    Serialize,
    Display,
    From,
    Constructor,
)]
pub struct OrderId(pub SmolStr);

impl OrderId {
    pub fn from_seq(seq: u64) -> Self {
        Self(SmolStr::new(format!("order-{seq}")))
    }
}

/// Pricing style of an order.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStyle {
    /// Match at the adjusted reference price, protected by an optional percent override.
    Market { protect_percent: Option<Decimal> },
    /// Match no worse than the given price.
    Limit { price: Decimal },
}

impl OrderStyle {
    pub fn market() -> Self {
        Self::Market {
            protect_percent: None,
        }
    }

    pub fn limit(price: Decimal) -> Self {
        Self::Limit { price }
    }
}

/// Lifecycle state of an [`Order`]. Terminal states are never mutated again.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Submitted,
    Filled,
    Partial,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// An order submitted by a strategy callback.
///
/// Invariants: `filled_amount <= amount`, and a non-zero `filled_amount` implies a
/// positive `avg_fill_price`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub security: Security,
    pub side: Side,
    pub style: OrderStyle,
    pub amount: i64,
    pub submitted_at: NaiveDateTime,
    pub status: OrderStatus,
    pub filled_amount: i64,
    pub avg_fill_price: Decimal,
    pub commission: Decimal,
    pub tax: Decimal,
}

impl Order {
    pub fn new(
        id: OrderId,
        security: Security,
        side: Side,
        style: OrderStyle,
        amount: i64,
        submitted_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            security,
            side,
            style,
            amount,
            submitted_at,
            status: OrderStatus::New,
            filled_amount: 0,
            avg_fill_price: Decimal::ZERO,
            commission: Decimal::ZERO,
            tax: Decimal::ZERO,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a fill, keeping the order invariants intact.
    pub fn record_fill(&mut self, amount: i64, price: Decimal, commission: Decimal, tax: Decimal) {
        debug_assert!(amount > 0 && self.filled_amount + amount <= self.amount);
        let filled_value = self.avg_fill_price * Decimal::from(self.filled_amount)
            + price * Decimal::from(amount);
        self.filled_amount += amount;
        self.avg_fill_price = filled_value / Decimal::from(self.filled_amount);
        self.commission += commission;
        self.tax += tax;
        self.status = if self.filled_amount == self.amount {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(amount: i64) -> Order {
        Order::new(
            OrderId::from_seq(1),
            Security::parse("000001.XSHE").unwrap(),
            Side::Buy,
            OrderStyle::market(),
            amount,
            chrono::NaiveDate::from_ymd_opt(2024, 6, 12)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_record_fill_full() {
        let mut order = order(100);
        order.record_fill(100, dec!(10.0), dec!(5), dec!(0));

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_amount, 100);
        assert_eq!(order.avg_fill_price, dec!(10.0));
        assert!(order.is_terminal());
    }

    #[test]
    fn test_record_fill_partial_averages_price() {
        let mut order = order(300);
        order.record_fill(100, dec!(10.0), dec!(5), dec!(0));
        order.record_fill(100, dec!(11.0), dec!(5), dec!(0));

        assert_eq!(order.status, OrderStatus::Partial);
        assert_eq!(order.filled_amount, 200);
        assert_eq!(order.avg_fill_price, dec!(10.5));
        assert_eq!(order.commission, dec!(10));
    }
}
