use chrono::NaiveDate;
use fnv::FnvHashSet;
use pagoda_data::{
    action::{ActionSecurityType, CorporateAction},
    provider::DataProvider,
};
use pagoda_execution::portfolio::Portfolio;
use pagoda_instrument::security::Security;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Dividend withholding rate for stock-type securities; funds pay out untaxed.
pub fn stock_dividend_tax_rate() -> Decimal {
    Decimal::new(20, 2)
}

/// The effect a corporate action had on the portfolio.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CashDividend,
    Split,
}

/// Record of one applied corporate-action effect, reportable alongside trades.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActionRecord {
    pub security: Security,
    pub kind: ActionKind,
    pub ex_date: NaiveDate,
    pub applied_on: NaiveDate,
    /// After-tax cash credited; zero for pure splits.
    pub cash_in: Decimal,
    pub shares_before: i64,
    pub shares_after: i64,
}

/// Applies cash dividends and share splits at before-open of each ex-date.
///
/// Events on halted securities are deferred and carried forward to the first unhalted
/// trade day on which the position is still open; closing the position first drops the
/// event.
#[derive(Debug, Default)]
pub struct ActionEngine {
    loaded: FnvHashSet<Security>,
    pending: BTreeMap<NaiveDate, Vec<CorporateAction>>,
    deferred: Vec<CorporateAction>,
    records: Vec<ActionRecord>,
}

impl ActionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the window's corporate actions for a security once, the first time the
    /// engine sees it held. Provider failures degrade to "no actions" with a warning.
    pub fn ensure_loaded(
        &mut self,
        provider: &dyn DataProvider,
        security: &Security,
        start: NaiveDate,
        end: NaiveDate,
    ) {
        if !self.loaded.insert(security.clone()) {
            return;
        }
        match provider.get_split_dividend(security, start, end) {
            Ok(actions) => {
                for action in actions {
                    self.pending.entry(action.ex_date).or_default().push(action);
                }
            }
            Err(error) => {
                warn!(security = %security, %error, "corporate actions unavailable; treating as none");
            }
        }
    }

    /// All records produced so far, in application order.
    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    fn tax_multiplier(security_type: ActionSecurityType) -> Decimal {
        match security_type {
            ActionSecurityType::Stock => Decimal::ONE - stock_dividend_tax_rate(),
            ActionSecurityType::Fund => Decimal::ONE,
        }
    }

    /// Apply this day's due events (fresh ex-dates plus carried deferrals) to the
    /// portfolio. Returns the records added by this call.
    pub fn apply_for_day(
        &mut self,
        day: NaiveDate,
        portfolio: &mut Portfolio,
        is_halted: impl Fn(&Security) -> bool,
    ) -> Vec<ActionRecord> {
        let mut due: Vec<CorporateAction> = std::mem::take(&mut self.deferred);
        due.extend(self.pending.remove(&day).unwrap_or_default());
        // Stale ex-dates from before the security was held never apply
        self.pending.retain(|ex_date, _| *ex_date > day);

        let mut applied = Vec::new();
        for action in due {
            let held = portfolio.total_amount(&action.security);
            if held <= 0 {
                // Position closed before the event could apply
                continue;
            }

            if is_halted(&action.security) {
                info!(
                    security = %action.security,
                    ex_date = %action.ex_date,
                    deferred_to_after = %day,
                    "security halted on ex-date; corporate action deferred"
                );
                self.deferred.push(action);
                continue;
            }

            applied.extend(Self::apply_one(&action, day, portfolio));
        }

        self.records.extend(applied.iter().cloned());
        applied
    }

    /// Split first (cost basis scales inversely), then the cash dividend computed on
    /// the pre-split share count.
    fn apply_one(
        action: &CorporateAction,
        day: NaiveDate,
        portfolio: &mut Portfolio,
    ) -> Vec<ActionRecord> {
        let mut records = Vec::new();
        let shares_before = portfolio.total_amount(&action.security);

        if action.has_split() {
            if let Some(position) = portfolio.positions.get_mut(&action.security) {
                position.apply_split(action.scale_factor);
            }
            let shares_after = portfolio.total_amount(&action.security);
            info!(
                security = %action.security,
                shares_before,
                shares_after,
                scale = %action.scale_factor,
                "share split applied"
            );
            records.push(ActionRecord {
                security: action.security.clone(),
                kind: ActionKind::Split,
                ex_date: action.ex_date,
                applied_on: day,
                cash_in: Decimal::ZERO,
                shares_before,
                shares_after,
            });
        }

        if action.has_dividend() {
            let payout = (Decimal::from(shares_before) / Decimal::from(action.per_base)
                * action.bonus_pre_tax
                * Self::tax_multiplier(action.security_type))
            .round_dp(2);
            portfolio.post_cash(payout);
            info!(
                security = %action.security,
                ex_date = %action.ex_date,
                cash_in = %payout,
                "cash dividend credited"
            );
            records.push(ActionRecord {
                security: action.security.clone(),
                kind: ActionKind::CashDividend,
                ex_date: action.ex_date,
                applied_on: day,
                cash_in: payout,
                shares_before,
                shares_after: portfolio.total_amount(&action.security),
            });
        }

        records
    }
}
