use crate::{
    action::CorporateAction,
    bar::{Bar, LiveSnapshot},
    error::DataError,
    provider::{DataProvider, SecurityInfo},
    request::{Frequency, PriceQuery},
};
use chrono::{NaiveDate, NaiveDateTime};
use fnv::FnvHashMap;
use pagoda_instrument::security::Security;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::BTreeMap;

/// Deterministic in-memory [`DataProvider`].
///
/// Holds explicit daily bars per security and synthesises flat minute bars from the
/// owning day's close when no explicit minute series is configured. Days without a bar
/// read as missing data, which downstream halt detection treats conservatively.
#[derive(Debug, Default)]
pub struct StubProvider {
    trade_days: Vec<NaiveDate>,
    daily: FnvHashMap<Security, BTreeMap<NaiveDate, Bar>>,
    minute: FnvHashMap<Security, BTreeMap<NaiveDateTime, Bar>>,
    actions: FnvHashMap<Security, Vec<CorporateAction>>,
    index_stocks: FnvHashMap<Security, Vec<Security>>,
}

impl StubProvider {
    pub fn new(trade_days: Vec<NaiveDate>) -> Self {
        Self {
            trade_days,
            ..Default::default()
        }
    }

    /// Install one explicit daily bar.
    pub fn with_daily_bar(mut self, security: &Security, bar: Bar) -> Self {
        self.daily
            .entry(security.clone())
            .or_default()
            .insert(bar.time.date(), bar);
        self
    }

    /// Install a flat daily close across every configured trade day.
    pub fn with_flat_series(self, security: &Security, price: Decimal) -> Self {
        let days = self.trade_days.clone();
        days.into_iter().fold(self, |provider, day| {
            let time = day.and_hms_opt(15, 0, 0).expect("valid close time");
            provider.with_daily_bar(security, Bar::flat(time, price, 1_000_000))
        })
    }

    /// Install one explicit minute bar.
    pub fn with_minute_bar(mut self, security: &Security, bar: Bar) -> Self {
        self.minute
            .entry(security.clone())
            .or_default()
            .insert(bar.time, bar);
        self
    }

    /// Mark a day halted: the daily bar keeps its prices but reads zero volume.
    pub fn with_halted_day(mut self, security: &Security, day: NaiveDate) -> Self {
        if let Some(series) = self.daily.get_mut(security)
            && let Some(bar) = series.get_mut(&day)
        {
            bar.volume = 0;
            bar.paused = true;
        }
        self
    }

    pub fn with_action(mut self, action: CorporateAction) -> Self {
        self.actions
            .entry(action.security.clone())
            .or_default()
            .push(action);
        self
    }

    pub fn with_index(mut self, index: &Security, stocks: Vec<Security>) -> Self {
        self.index_stocks.insert(index.clone(), stocks);
        self
    }

    fn daily_bars(
        &self,
        security: &Security,
        query: &PriceQuery,
    ) -> Result<Vec<Bar>, DataError> {
        let Some(series) = self.daily.get(security) else {
            return Ok(Vec::new());
        };

        let mut bars: Vec<Bar> = series
            .values()
            .filter(|bar| {
                query.start.is_none_or(|start| bar.time >= start)
                    && query.end.is_none_or(|end| bar.time.date() <= end.date())
            })
            .copied()
            .collect();

        if let Some(count) = query.count
            && bars.len() > count
        {
            bars.drain(..bars.len() - count);
        }
        Ok(bars)
    }

    fn minute_bars(
        &self,
        security: &Security,
        query: &PriceQuery,
    ) -> Result<Vec<Bar>, DataError> {
        if let Some(series) = self.minute.get(security) {
            let mut bars: Vec<Bar> = series
                .values()
                .filter(|bar| {
                    query.start.is_none_or(|start| bar.time >= start)
                        && query.end.is_none_or(|end| bar.time <= end)
                })
                .copied()
                .collect();
            if let Some(count) = query.count
                && bars.len() > count
            {
                bars.drain(..bars.len() - count);
            }
            return Ok(bars);
        }

        // No explicit minute series: synthesise a flat bar from the owning day's close.
        let Some(end) = query.end else {
            return Err(DataError::InvalidQuery(
                "minute query without end unsupported by stub".into(),
            ));
        };
        let Some(daily) = self.daily.get(security).and_then(|s| s.get(&end.date())) else {
            return Ok(Vec::new());
        };
        Ok(vec![Bar::new(
            end,
            daily.close,
            daily.close,
            daily.close,
            daily.close,
            daily.volume.min(1),
            daily.paused,
        )])
    }
}

impl DataProvider for StubProvider {
    fn get_price(&self, security: &Security, query: &PriceQuery) -> Result<Vec<Bar>, DataError> {
        match query.frequency {
            Frequency::Daily => self.daily_bars(security, query),
            Frequency::Minute => self.minute_bars(security, query),
        }
    }

    fn get_trade_days(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        count: Option<usize>,
    ) -> Result<Vec<NaiveDate>, DataError> {
        let mut days: Vec<NaiveDate> = self
            .trade_days
            .iter()
            .copied()
            .filter(|day| {
                start.is_none_or(|s| *day >= s) && end.is_none_or(|e| *day <= e)
            })
            .collect();

        if let Some(count) = count
            && days.len() > count
        {
            if end.is_some() {
                days.drain(..days.len() - count);
            } else {
                days.truncate(count);
            }
        }
        Ok(days)
    }

    fn get_all_securities(&self) -> Result<FnvHashMap<Security, SecurityInfo>, DataError> {
        Ok(self
            .daily
            .keys()
            .map(|security| {
                (
                    security.clone(),
                    SecurityInfo {
                        display_name: SmolStr::new(security.code()),
                        start_date: NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid date"),
                        end_date: NaiveDate::from_ymd_opt(2099, 12, 31).expect("valid date"),
                    },
                )
            })
            .collect())
    }

    fn get_index_stocks(&self, index: &Security) -> Result<Vec<Security>, DataError> {
        Ok(self.index_stocks.get(index).cloned().unwrap_or_default())
    }

    fn get_split_dividend(
        &self,
        security: &Security,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CorporateAction>, DataError> {
        let mut actions: Vec<CorporateAction> = self
            .actions
            .get(security)
            .map(|actions| {
                actions
                    .iter()
                    .filter(|action| action.ex_date >= start && action.ex_date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        actions.sort_by_key(|action| action.ex_date);
        Ok(actions)
    }

    fn get_live_current(&self, security: &Security) -> Result<LiveSnapshot, DataError> {
        let bar = self
            .daily
            .get(security)
            .and_then(|series| series.values().next_back())
            .ok_or_else(|| DataError::MissingData {
                security: security.to_string(),
                detail: "no bars configured".into(),
            })?;

        Ok(LiveSnapshot::new(
            bar.close,
            bar.close * Decimal::new(11, 1),
            bar.close * Decimal::new(9, 1),
            bar.is_halted(),
        ))
    }
}
