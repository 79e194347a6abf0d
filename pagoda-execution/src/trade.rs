use crate::order::OrderId;
use chrono::NaiveDateTime;
use derive_more::Constructor;
use pagoda_instrument::{Side, security::Security};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A fill produced by the matching engine or reported by a broker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Trade {
    pub time: NaiveDateTime,
    pub security: Security,
    pub side: Side,
    pub amount: i64,
    pub price: Decimal,
    pub commission: Decimal,
    pub tax: Decimal,
    pub order_id: OrderId,
}

impl Trade {
    /// Gross traded value, excluding fees.
    pub fn value(&self) -> Decimal {
        self.price * Decimal::from(self.amount)
    }

    /// Commission plus stamp tax.
    pub fn fees(&self) -> Decimal {
        self.commission + self.tax
    }
}

impl Display for Trade {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ security: {}, side: {}, amount: {}, price: {}, time: {} }}",
            self.security, self.side, self.amount, self.price, self.time
        )
    }
}
