//! `Broker` implementation over the Alpaca trading API.

use async_trait::async_trait;
use tracing::{info, warn};
use wheel_trade_core::{
    AccountInfo, Broker, BrokerPosition, Order, OrderRequest, WheelError, WheelResult,
};

use crate::client::{AlpacaClient, Host};
use crate::types::{NewOrder, RawAccount, RawOrder, RawPosition};

/// Rejects identifiers that would escape the URL path segment.
fn path_segment<'a>(kind: &str, value: &'a str) -> WheelResult<&'a str> {
    let valid = !value.is_empty()
        && value.len() <= 64
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(value)
    } else {
        Err(WheelError::broker(format!("invalid {kind}: {value:?}")))
    }
}

#[async_trait]
impl Broker for AlpacaClient {
    async fn submit_order(&self, order: &OrderRequest) -> WheelResult<Order> {
        let body = NewOrder::from(order);
        let raw: RawOrder = self.post(Host::Trading, "/v2/orders", &body).await?;
        let placed = Order::from(raw);

        if placed.status.is_accepted() {
            info!(
                order_id = %placed.id,
                symbol = %placed.symbol,
                status = ?placed.status,
                limit = ?order.limit_price(),
                "order submitted"
            );
        } else {
            warn!(
                order_id = %placed.id,
                symbol = %placed.symbol,
                status = ?placed.status,
                "order not accepted"
            );
        }
        Ok(placed)
    }

    async fn account(&self) -> WheelResult<AccountInfo> {
        let raw: RawAccount = self.get(Host::Trading, "/v2/account", &[]).await?;
        Ok(raw.into())
    }

    async fn positions(&self) -> WheelResult<Vec<BrokerPosition>> {
        let raw: Vec<RawPosition> = self.get(Host::Trading, "/v2/positions", &[]).await?;
        Ok(raw.into_iter().map(BrokerPosition::from).collect())
    }

    async fn cancel_order(&self, order_id: &str) -> WheelResult<()> {
        let id = path_segment("order id", order_id)?;
        self.delete::<serde_json::Value>(Host::Trading, &format!("/v2/orders/{id}"))
            .await?;
        info!(order_id = id, "order cancelled");
        Ok(())
    }

    async fn close_position(&self, symbol: &str) -> WheelResult<Option<Order>> {
        let symbol = path_segment("symbol", symbol)?;
        let raw: Option<RawOrder> = self
            .delete(Host::Trading, &format!("/v2/positions/{symbol}"))
            .await?;
        if raw.is_none() {
            info!(symbol, "no position to close");
        }
        Ok(raw.map(Order::from))
    }

    fn name(&self) -> &str {
        if self.config.is_live() {
            "alpaca-live"
        } else {
            "alpaca-paper"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::AlpacaConfig;
    use rust_decimal_macros::dec;
    use wheel_trade_core::OrderStatus;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> AlpacaClient {
        AlpacaClient::new(AlpacaConfig::paper("key", "secret").with_base_url(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn reads_account_balances() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "acct-1",
                "cash": "25000.50",
                "buying_power": "50001",
                "equity": "25000.50",
                "status": "ACTIVE"
            })))
            .mount(&server)
            .await;

        let account = client(&server).await.account().await.unwrap();
        assert_eq!(account.account_id, "acct-1");
        assert_eq!(account.buying_power, dec!(50001));
        assert_eq!(account.cash, dec!(25000.50));
    }

    #[tokio::test]
    async fn shares_held_matches_the_underlying_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/positions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"symbol": "XYZ", "qty": "100", "avg_entry_price": "48.8"},
                {"symbol": "XYZ250117C00055000", "qty": "-1", "avg_entry_price": "0.9"}
            ])))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert_eq!(client.shares_held("xyz").await.unwrap(), 100);
        assert_eq!(client.shares_held("ABC").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn submits_limit_sell_to_open() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/orders"))
            .and(body_partial_json(serde_json::json!({
                "symbol": "XYZ250117P00050000",
                "side": "sell",
                "type": "limit",
                "limit_price": "1.10"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "ord-1",
                "symbol": "XYZ250117P00050000",
                "status": "accepted",
                "submitted_at": "2025-01-02T15:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = client(&server)
            .await
            .submit_order(&OrderRequest::sell_to_open("XYZ250117P00050000", 1, dec!(1.10)))
            .await
            .unwrap();
        assert_eq!(order.id, "ord-1");
        assert_eq!(order.status, OrderStatus::Accepted);
    }

    #[tokio::test]
    async fn closing_a_missing_position_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2/positions/XYZ"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": 40410000,
                "message": "position does not exist"
            })))
            .mount(&server)
            .await;

        let closed = client(&server).await.close_position("XYZ").await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn cancel_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2/orders/ord-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).await.cancel_order("ord-1").await.unwrap();
    }

    #[tokio::test]
    async fn rejects_path_traversal_in_identifiers() {
        let server = MockServer::start().await;
        let client = client(&server).await;
        assert!(client.cancel_order("../account").await.is_err());
        assert!(client.close_position("XYZ/../../v2").await.is_err());
    }
}
