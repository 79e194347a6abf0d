use crate::{
    exchange::Exchange,
    security::{Security, SecurityKind},
};
use serde::{Deserialize, Serialize};

/// Minimum lot and increment step for order amounts of one instrument class.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
pub struct LotRule {
    pub min_lot: i64,
    pub step: i64,
}

impl LotRule {
    pub const fn new(min_lot: i64, step: i64) -> Self {
        Self { min_lot, step }
    }
}

/// Infer the [`LotRule`] for a security from its venue and code prefix.
///
/// Defaults: main-board 100/100, STAR-market 200/1, convertible bond 10/10,
/// Beijing 100/1.
pub fn infer_lot_rule(security: &Security) -> LotRule {
    if security.exchange() == Exchange::Beijing {
        return LotRule::new(100, 1);
    }

    match security.kind() {
        SecurityKind::Star => LotRule::new(200, 1),
        SecurityKind::ConvertibleBond => LotRule::new(10, 10),
        SecurityKind::Stock | SecurityKind::Fund => LotRule::new(100, 100),
    }
}

/// Round a raw order amount down to a valid exchange amount.
///
/// Buys floor to `min_lot + k * step` and collapse to 0 below the minimum lot. Sells
/// may place an odd lot equal to the full closeable amount when that is below the
/// minimum lot; otherwise they floor to the nearest step.
pub fn adjust_order_amount(security: &Security, amount: i64, is_buy: bool, closeable: i64) -> i64 {
    let LotRule { min_lot, step } = infer_lot_rule(security);

    if is_buy {
        if amount < min_lot {
            return 0;
        }
        min_lot + (amount - min_lot) / step * step
    } else {
        let amount = amount.min(closeable);
        if amount <= 0 {
            return 0;
        }
        // T+1 leftovers below one lot may only be sold in full
        if closeable < min_lot {
            return closeable;
        }
        if amount < min_lot {
            return amount;
        }
        amount / step * step
    }
}
