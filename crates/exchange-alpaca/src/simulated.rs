//! In-memory broker for dry runs and tests.
//!
//! Orders fill immediately at their limit price (market orders at the last
//! mark set for the symbol). Option orders move cash by `price * 100` per
//! contract less a flat commission. Share positions can be set directly to
//! simulate assignment or call-away.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;
use wheel_trade_core::{
    AccountInfo, Broker, BrokerPosition, Order, OrderRequest, OrderSide, OrderStatus, OrderType,
    WheelError, WheelResult, CONTRACT_MULTIPLIER,
};

/// Per-contract commission charged on option fills.
pub const OPTION_COMMISSION: Decimal = Decimal::from_parts(65, 0, 0, false, 2);

#[derive(Debug, Default)]
struct SimState {
    cash: Decimal,
    positions: HashMap<String, BrokerPosition>,
    marks: HashMap<String, Decimal>,
    orders: Vec<(OrderRequest, Order)>,
    reject_orders: bool,
}

/// Fully simulated broker.
#[derive(Debug)]
pub struct SimulatedBroker {
    state: Mutex<SimState>,
}

/// OCC option symbols are the underlying followed by a 15-character suffix.
fn is_option_symbol(symbol: &str) -> bool {
    symbol.is_ascii()
        && symbol.len() > 15
        && symbol[symbol.len() - 15..].chars().take(6).all(|c| c.is_ascii_digit())
}

impl SimulatedBroker {
    #[must_use]
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            state: Mutex::new(SimState {
                cash: starting_cash,
                ..SimState::default()
            }),
        }
    }

    /// Sets a holding directly (zero removes it).
    pub fn set_position(&self, symbol: &str, quantity: i64, avg_entry_price: Decimal) {
        let mut state = self.state.lock();
        let key = symbol.to_uppercase();
        if quantity == 0 {
            state.positions.remove(&key);
        } else {
            state.positions.insert(
                key.clone(),
                BrokerPosition {
                    symbol: key,
                    quantity,
                    avg_entry_price,
                },
            );
        }
    }

    /// Sets the price used for market orders and position closes.
    pub fn set_mark(&self, symbol: &str, price: Decimal) {
        self.state.lock().marks.insert(symbol.to_uppercase(), price);
    }

    /// When set, every order comes back `Rejected` and nothing changes.
    pub fn set_reject_orders(&self, reject: bool) {
        self.state.lock().reject_orders = reject;
    }

    #[must_use]
    pub fn cash(&self) -> Decimal {
        self.state.lock().cash
    }

    /// Every order submitted so far, in order.
    #[must_use]
    pub fn orders(&self) -> Vec<(OrderRequest, Order)> {
        self.state.lock().orders.clone()
    }

    fn fill(state: &mut SimState, request: &OrderRequest) -> WheelResult<Decimal> {
        let symbol = request.symbol.to_uppercase();
        let price = match request.order_type {
            OrderType::Limit { price } => price,
            OrderType::Market => state.marks.get(&symbol).copied().ok_or_else(|| {
                WheelError::broker(format!("no mark price for market order on {symbol}"))
            })?,
        };

        let qty = i64::from(request.quantity);
        let signed = match request.side {
            OrderSide::Buy => qty,
            OrderSide::Sell => -qty,
        };
        let (multiplier, commission) = if is_option_symbol(&symbol) {
            (Decimal::from(CONTRACT_MULTIPLIER), OPTION_COMMISSION * Decimal::from(qty))
        } else {
            (Decimal::ONE, Decimal::ZERO)
        };

        let notional = price * multiplier * Decimal::from(qty);
        let cash_delta = match request.side {
            OrderSide::Buy => -notional,
            OrderSide::Sell => notional,
        };
        state.cash += cash_delta - commission;

        let entry = state.positions.entry(symbol.clone()).or_insert(BrokerPosition {
            symbol,
            quantity: 0,
            avg_entry_price: price,
        });
        entry.quantity += signed;
        let now_flat = entry.quantity == 0;
        let key = entry.symbol.clone();
        if now_flat {
            state.positions.remove(&key);
        }
        Ok(price)
    }
}

#[async_trait]
impl Broker for SimulatedBroker {
    async fn submit_order(&self, request: &OrderRequest) -> WheelResult<Order> {
        let mut state = self.state.lock();
        let status = if state.reject_orders {
            OrderStatus::Rejected
        } else {
            Self::fill(&mut state, request)?;
            OrderStatus::Filled
        };

        let order = Order {
            id: format!("SIM-{}", Uuid::new_v4()),
            symbol: request.symbol.clone(),
            status,
            submitted_at: Utc::now(),
        };
        info!(
            order_id = %order.id,
            symbol = %order.symbol,
            side = ?request.side,
            quantity = request.quantity,
            limit = ?request.limit_price(),
            status = ?order.status,
            "simulated order"
        );
        state.orders.push((request.clone(), order.clone()));
        Ok(order)
    }

    async fn account(&self) -> WheelResult<AccountInfo> {
        let state = self.state.lock();
        let holdings: Decimal = state
            .positions
            .values()
            .map(|p| {
                let mark = state.marks.get(&p.symbol).copied().unwrap_or(p.avg_entry_price);
                let multiplier = if is_option_symbol(&p.symbol) {
                    Decimal::from(CONTRACT_MULTIPLIER)
                } else {
                    Decimal::ONE
                };
                mark * multiplier * Decimal::from(p.quantity)
            })
            .sum();
        Ok(AccountInfo {
            account_id: "SIMULATED".to_string(),
            cash: state.cash,
            buying_power: state.cash,
            equity: state.cash + holdings,
        })
    }

    async fn positions(&self) -> WheelResult<Vec<BrokerPosition>> {
        let state = self.state.lock();
        let mut positions: Vec<_> = state.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    async fn cancel_order(&self, order_id: &str) -> WheelResult<()> {
        // Orders fill synchronously, so there is never anything to cancel.
        let state = self.state.lock();
        if state.orders.iter().any(|(_, o)| o.id == order_id) {
            Ok(())
        } else {
            Err(WheelError::broker(format!("unknown order {order_id}")))
        }
    }

    async fn close_position(&self, symbol: &str) -> WheelResult<Option<Order>> {
        let held = {
            let state = self.state.lock();
            state.positions.get(&symbol.to_uppercase()).map(|p| p.quantity)
        };
        let Some(quantity) = held else {
            return Ok(None);
        };

        let request = OrderRequest {
            symbol: symbol.to_uppercase(),
            quantity: u32::try_from(quantity.unsigned_abs())
                .map_err(|_| WheelError::broker("position too large to close"))?,
            side: if quantity > 0 { OrderSide::Sell } else { OrderSide::Buy },
            order_type: OrderType::Market,
        };
        self.submit_order(&request).await.map(Some)
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn selling_a_put_credits_premium_less_commission() {
        let broker = SimulatedBroker::new(dec!(10000));
        let order = broker
            .submit_order(&OrderRequest::sell_to_open("XYZ250117P00050000", 1, dec!(1.15)))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(broker.cash(), dec!(10000) + dec!(115) - dec!(0.65));
        let positions = broker.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, -1);
    }

    #[tokio::test]
    async fn assignment_is_simulated_by_setting_shares() {
        let broker = SimulatedBroker::new(dec!(10000));
        assert_eq!(broker.shares_held("XYZ").await.unwrap(), 0);
        broker.set_position("xyz", 100, dec!(50));
        assert_eq!(broker.shares_held("XYZ").await.unwrap(), 100);
        broker.set_position("XYZ", 0, dec!(0));
        assert_eq!(broker.shares_held("XYZ").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejected_orders_leave_state_untouched() {
        let broker = SimulatedBroker::new(dec!(5000));
        broker.set_reject_orders(true);
        let order = broker
            .submit_order(&OrderRequest::sell_to_open("XYZ250117P00050000", 1, dec!(1.00)))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(broker.cash(), dec!(5000));
        assert!(broker.positions().await.unwrap().is_empty());
        assert_eq!(broker.orders().len(), 1);
    }

    #[tokio::test]
    async fn close_position_sells_shares_at_mark() {
        let broker = SimulatedBroker::new(dec!(0));
        broker.set_position("XYZ", 100, dec!(48.80));
        broker.set_mark("XYZ", dec!(52));

        let order = broker.close_position("XYZ").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(broker.cash(), dec!(5200));
        assert!(broker.close_position("XYZ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn market_orders_need_a_mark() {
        let broker = SimulatedBroker::new(dec!(1000));
        let request = OrderRequest {
            symbol: "ABC".into(),
            quantity: 1,
            side: OrderSide::Buy,
            order_type: OrderType::Market,
        };
        assert!(broker.submit_order(&request).await.is_err());
    }

    #[test]
    fn recognises_occ_symbols() {
        assert!(is_option_symbol("XYZ250117P00050000"));
        assert!(is_option_symbol("SPY250117C00450000"));
        assert!(!is_option_symbol("XYZ"));
        assert!(!is_option_symbol("BRK.B"));
    }
}
