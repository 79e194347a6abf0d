use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Bar frequency of a price query or simulation run.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Daily,
    Minute,
}

/// Price adjustment mode.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Adjust {
    /// Raw exchange prices.
    #[default]
    None,
    /// Previous-adjusted prices, normalised against `pre_factor_ref_date`.
    Pre,
}

/// Parameters of a [`get_price`](crate::provider::DataProvider::get_price) call.
///
/// Either a `[start, end]` window or an `end` + `count` tail may be supplied.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PriceQuery {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub count: Option<usize>,
    pub frequency: Frequency,
    pub adjust: Adjust,
    pub pre_factor_ref_date: Option<NaiveDate>,
}

impl PriceQuery {
    /// Tail query: the last `count` bars at or before `end`.
    pub fn tail(end: NaiveDateTime, count: usize, frequency: Frequency) -> Self {
        Self {
            start: None,
            end: Some(end),
            count: Some(count),
            frequency,
            adjust: Adjust::None,
            pre_factor_ref_date: None,
        }
    }

    /// Window query over `[start, end]`.
    pub fn window(start: NaiveDateTime, end: NaiveDateTime, frequency: Frequency) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            count: None,
            frequency,
            adjust: Adjust::None,
            pre_factor_ref_date: None,
        }
    }

    pub fn with_adjust(mut self, adjust: Adjust, ref_date: Option<NaiveDate>) -> Self {
        self.adjust = adjust;
        self.pre_factor_ref_date = ref_date;
        self
    }
}
