use chrono::NaiveDate;
use derive_more::Constructor;
use pagoda_instrument::security::Security;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tax treatment class of a security's dividends.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionSecurityType {
    /// Dividend withholding applies (20%).
    Stock,
    /// Funds/ETFs pay out untaxed.
    Fund,
}

/// A cash dividend and/or share split taking effect on `ex_date`.
///
/// `bonus_pre_tax` is quoted per `per_base` shares (1 for funds, 10 for stocks).
/// `scale_factor` is the post-split share multiple; 1 when no split occurs.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct CorporateAction {
    pub security: Security,
    pub ex_date: NaiveDate,
    pub per_base: u32,
    pub bonus_pre_tax: Decimal,
    pub scale_factor: Decimal,
    pub security_type: ActionSecurityType,
}

impl CorporateAction {
    pub fn has_split(&self) -> bool {
        self.scale_factor != Decimal::ONE
    }

    pub fn has_dividend(&self) -> bool {
        self.bonus_pre_tax > Decimal::ZERO
    }
}
