use crate::{
    client::{AccountInfo, BrokerAdapter, BrokerOrder, BrokerPosition},
    error::ExecutionError,
    order::{OrderId, OrderStatus},
};
use fnv::FnvHashMap;
use pagoda_instrument::security::Security;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// In-process broker used for paper trading and live-driver tests.
///
/// Fills every order immediately at the submitted (or mock) price, keeps a flat
/// position book without T+1 restrictions, and caps tick subscriptions at
/// [`SimulatorBroker::MAX_TICK_SUBSCRIPTIONS`].
#[derive(Debug)]
pub struct SimulatorBroker {
    connected: AtomicBool,
    order_seq: AtomicU64,
    state: Mutex<SimulatorState>,
}

#[derive(Debug, Default)]
struct SimulatorState {
    cash: Decimal,
    mock_prices: FnvHashMap<Security, Decimal>,
    positions: FnvHashMap<Security, BrokerPosition>,
    orders: FnvHashMap<OrderId, BrokerOrder>,
}

impl SimulatorBroker {
    pub const MAX_TICK_SUBSCRIPTIONS: usize = 100;

    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            connected: AtomicBool::new(false),
            order_seq: AtomicU64::new(0),
            state: Mutex::new(SimulatorState {
                cash: initial_cash,
                ..SimulatorState::default()
            }),
        }
    }

    /// Install a reference price used when market orders arrive without one.
    pub fn set_mock_price(&self, security: &Security, price: Decimal) {
        self.state
            .lock()
            .mock_prices
            .insert(security.clone(), price);
    }

    fn next_order_id(&self) -> OrderId {
        let seq = self.order_seq.fetch_add(1, Ordering::Relaxed) + 1;
        OrderId::new(smol_str::SmolStr::new(format!("sim-{seq}")))
    }

    fn resolve_price(
        state: &SimulatorState,
        security: &Security,
        price: Option<Decimal>,
    ) -> Result<Decimal, ExecutionError> {
        price
            .or_else(|| state.mock_prices.get(security).copied())
            .ok_or_else(|| ExecutionError::NoReferencePrice {
                security: security.to_string(),
            })
    }

    fn require_connected(&self) -> Result<(), ExecutionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ExecutionError::Adapter("simulator not connected".into()))
        }
    }
}

impl BrokerAdapter for SimulatorBroker {
    async fn connect(&self) -> Result<(), ExecutionError> {
        self.connected.store(true, Ordering::SeqCst);
        info!(broker = "simulator", "connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExecutionError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn account_info(&self) -> Result<AccountInfo, ExecutionError> {
        let state = self.state.lock();
        let holdings: Decimal = state
            .positions
            .values()
            .map(|position| {
                let mark = state
                    .mock_prices
                    .get(&position.security)
                    .copied()
                    .unwrap_or(position.avg_cost);
                mark * Decimal::from(position.amount)
            })
            .sum();
        Ok(AccountInfo {
            total_value: state.cash + holdings,
            available_cash: state.cash,
        })
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, ExecutionError> {
        Ok(self.state.lock().positions.values().cloned().collect())
    }

    async fn buy(
        &self,
        security: &Security,
        amount: i64,
        price: Option<Decimal>,
    ) -> Result<OrderId, ExecutionError> {
        self.require_connected()?;
        let order_id = self.next_order_id();
        let mut state = self.state.lock();

        let price = Self::resolve_price(&state, security, price)?;
        let cost = price * Decimal::from(amount);
        if state.cash < cost {
            return Err(ExecutionError::InsufficientCash {
                required: cost.to_string(),
                available: state.cash.to_string(),
            });
        }

        state.cash -= cost;
        let position = state
            .positions
            .entry(security.clone())
            .or_insert_with(|| BrokerPosition {
                security: security.clone(),
                amount: 0,
                closeable: 0,
                avg_cost: Decimal::ZERO,
            });
        let new_amount = position.amount + amount;
        position.avg_cost = (position.avg_cost * Decimal::from(position.amount) + cost)
            / Decimal::from(new_amount);
        position.amount = new_amount;
        position.closeable = new_amount;

        state.orders.insert(
            order_id.clone(),
            BrokerOrder {
                order_id: order_id.clone(),
                security: security.clone(),
                amount,
                filled_amount: amount,
                price: Some(price),
                status: OrderStatus::Filled,
            },
        );
        Ok(order_id)
    }

    async fn sell(
        &self,
        security: &Security,
        amount: i64,
        price: Option<Decimal>,
    ) -> Result<OrderId, ExecutionError> {
        self.require_connected()?;
        let order_id = self.next_order_id();
        let mut state = self.state.lock();

        let held = state
            .positions
            .get(security)
            .map(|position| position.amount)
            .unwrap_or(0);
        if held < amount {
            return Err(ExecutionError::InsufficientPosition {
                security: security.to_string(),
                requested: amount,
                closeable: held,
            });
        }

        let price = Self::resolve_price(&state, security, price)?;
        state.cash += price * Decimal::from(amount);
        let emptied = state
            .positions
            .get_mut(security)
            .map(|position| {
                position.amount -= amount;
                position.closeable = position.closeable.min(position.amount);
                position.amount == 0
            })
            .unwrap_or(false);
        if emptied {
            state.positions.remove(security);
        }

        state.orders.insert(
            order_id.clone(),
            BrokerOrder {
                order_id: order_id.clone(),
                security: security.clone(),
                amount,
                filled_amount: amount,
                price: Some(price),
                status: OrderStatus::Filled,
            },
        );
        Ok(order_id)
    }

    async fn cancel_order(&self, id: &OrderId) -> Result<bool, ExecutionError> {
        let mut state = self.state.lock();
        let Some(order) = state.orders.get_mut(id) else {
            return Ok(false);
        };
        order.status = OrderStatus::Cancelled;
        Ok(true)
    }

    async fn order_status(&self, id: &OrderId) -> Result<BrokerOrder, ExecutionError> {
        self.state
            .lock()
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| ExecutionError::Adapter(format!("unknown order id: {id}")))
    }

    async fn sync_orders(&self) -> Result<Vec<BrokerOrder>, ExecutionError> {
        Ok(self.state.lock().orders.values().cloned().collect())
    }

    async fn open_orders(&self) -> Result<Vec<BrokerOrder>, ExecutionError> {
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .filter(|order| !order.status.is_terminal())
            .cloned()
            .collect())
    }

    fn max_tick_subscriptions(&self) -> Option<usize> {
        Some(Self::MAX_TICK_SUBSCRIPTIONS)
    }
}
