use crate::{
    error::ExecutionError,
    order::{OrderId, OrderStatus},
};
use pagoda_instrument::security::Security;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;

pub mod simulator;

/// Account snapshot reported by a broker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccountInfo {
    pub total_value: Decimal,
    pub available_cash: Decimal,
}

/// A broker-side holding.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrokerPosition {
    pub security: Security,
    pub amount: i64,
    pub closeable: i64,
    pub avg_cost: Decimal,
}

/// Broker-side view of an order, normalised to the portfolio's status taxonomy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrokerOrder {
    pub order_id: OrderId,
    pub security: Security,
    pub amount: i64,
    pub filled_amount: i64,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
}

/// Live execution seam: order routing and account queries against one brokerage.
///
/// Implementations own their wire protocol, credentialing and retry policy; the engine
/// only sees normalised results. All methods must be safe to call from the driver's
/// thread.
pub trait BrokerAdapter: Send + Sync {
    fn connect(&self) -> impl Future<Output = Result<(), ExecutionError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), ExecutionError>> + Send;

    fn is_connected(&self) -> bool;

    fn account_info(&self) -> impl Future<Output = Result<AccountInfo, ExecutionError>> + Send;

    fn positions(&self)
    -> impl Future<Output = Result<Vec<BrokerPosition>, ExecutionError>> + Send;

    /// Submit a buy; `price` of `None` requests a market order. Returns the external
    /// order id.
    fn buy(
        &self,
        security: &Security,
        amount: i64,
        price: Option<Decimal>,
    ) -> impl Future<Output = Result<OrderId, ExecutionError>> + Send;

    /// Submit a sell; `price` of `None` requests a market order. Returns the external
    /// order id.
    fn sell(
        &self,
        security: &Security,
        amount: i64,
        price: Option<Decimal>,
    ) -> impl Future<Output = Result<OrderId, ExecutionError>> + Send;

    fn cancel_order(
        &self,
        id: &OrderId,
    ) -> impl Future<Output = Result<bool, ExecutionError>> + Send;

    fn order_status(
        &self,
        id: &OrderId,
    ) -> impl Future<Output = Result<BrokerOrder, ExecutionError>> + Send;

    /// Reconciliation sweep over all of today's orders.
    fn sync_orders(&self) -> impl Future<Output = Result<Vec<BrokerOrder>, ExecutionError>> + Send;

    fn open_orders(&self)
    -> impl Future<Output = Result<Vec<BrokerOrder>, ExecutionError>> + Send;

    /// Tick-subscription cap enforced by this broker, when any.
    fn max_tick_subscriptions(&self) -> Option<usize> {
        None
    }
}
