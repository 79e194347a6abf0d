use crate::{
    action::CorporateAction,
    bar::{Bar, LiveSnapshot},
    error::DataError,
    request::PriceQuery,
};
use chrono::NaiveDate;
use fnv::FnvHashMap;
use pagoda_instrument::security::Security;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Listing metadata returned by [`DataProvider::get_all_securities`].
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct SecurityInfo {
    pub display_name: SmolStr,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Market-data operations the engine depends on, and nothing else.
///
/// Implementations must be safe to call from the driver's thread; remote providers are
/// expected to retry with bounded backoff internally and surface a last-resort
/// [`DataError`] only once retries are exhausted.
pub trait DataProvider: Send + Sync {
    /// Bars for one security matching the query, in ascending time order.
    fn get_price(&self, security: &Security, query: &PriceQuery) -> Result<Vec<Bar>, DataError>;

    /// Exchange trading days, optionally windowed and/or limited to a trailing `count`.
    fn get_trade_days(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        count: Option<usize>,
    ) -> Result<Vec<NaiveDate>, DataError>;

    /// All listed securities with metadata.
    fn get_all_securities(&self) -> Result<FnvHashMap<Security, SecurityInfo>, DataError>;

    /// Constituents of an index.
    fn get_index_stocks(&self, index: &Security) -> Result<Vec<Security>, DataError>;

    /// Corporate actions with ex-dates inside `[start, end]`, ascending by ex-date.
    fn get_split_dividend(
        &self,
        security: &Security,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CorporateAction>, DataError>;

    /// Current quote snapshot; live mode only.
    fn get_live_current(&self, security: &Security) -> Result<LiveSnapshot, DataError>;
}
