use crate::{
    Side,
    security::{Security, SecurityKind},
};
use rust_decimal::Decimal;

/// Minimum price increment for a security at a given reference price.
///
/// ETFs and listed funds quote in 0.001; shares quote in 0.01 at or above 1 yuan and
/// 0.001 below it. Convertible bonds quote in 0.001.
pub fn min_price_step(security: &Security, reference_price: Decimal) -> Decimal {
    match security.kind() {
        SecurityKind::Fund | SecurityKind::ConvertibleBond => Decimal::new(1, 3),
        SecurityKind::Stock | SecurityKind::Star => {
            if reference_price >= Decimal::ONE {
                Decimal::new(1, 2)
            } else {
                Decimal::new(1, 3)
            }
        }
    }
}

/// Round a price onto the tick grid; buys round up to the next tick, sells round down.
pub fn round_to_tick(price: Decimal, tick: Decimal, side: Side) -> Decimal {
    if tick <= Decimal::ZERO {
        return price;
    }
    let ticks = price / tick;
    let ticks = match side {
        Side::Buy => ticks.ceil(),
        Side::Sell => ticks.floor(),
    };
    (ticks * tick).normalize()
}

/// Round a price to the security's tick at the given reference price.
pub fn round_price(security: &Security, price: Decimal, side: Side) -> Decimal {
    round_to_tick(price, min_price_step(security, price), side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn security(id: &str) -> Security {
        Security::parse(id).unwrap()
    }

    #[test]
    fn test_min_price_step_etf() {
        assert_eq!(min_price_step(&security("510050.XSHG"), dec!(3.0)), dec!(0.001));
    }

    #[test]
    fn test_min_price_step_share_brackets() {
        assert_eq!(min_price_step(&security("600000.XSHG"), dec!(12.0)), dec!(0.01));
        assert_eq!(min_price_step(&security("600000.XSHG"), dec!(0.8)), dec!(0.001));
    }

    #[test]
    fn test_round_to_tick_directional() {
        assert_eq!(round_to_tick(dec!(10.013), dec!(0.01), Side::Buy), dec!(10.02));
        assert_eq!(round_to_tick(dec!(10.017), dec!(0.01), Side::Sell), dec!(10.01));
        // Already on the grid
        assert_eq!(round_to_tick(dec!(10.01), dec!(0.01), Side::Buy), dec!(10.01));
        assert_eq!(round_to_tick(dec!(10.01), dec!(0.01), Side::Sell), dec!(10.01));
    }
}
