//! `MarketData` implementation over the Alpaca trading and data APIs.
//!
//! Contract listings (strike, type, open interest) come from the trading
//! host; quotes and implied volatility come from the options snapshot feed.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use wheel_trade_core::{MarketData, OptionContract, WheelError, WheelResult};

use crate::client::{AlpacaClient, Host};
use crate::types::{to_option_contract, RawContract, RawContractsPage, RawLatestTrade, RawSnapshot, RawSnapshotsPage};

const PAGE_LIMIT: &str = "1000";
/// Upper bound on pages fetched per listing.
const MAX_PAGES: usize = 20;

impl AlpacaClient {
    async fn list_contracts(
        &self,
        symbol: &str,
        expiration: Option<NaiveDate>,
    ) -> WheelResult<Vec<RawContract>> {
        let mut contracts = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("underlying_symbols", symbol.to_uppercase()),
                ("status", "active".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            match expiration {
                Some(date) => query.push(("expiration_date", date.to_string())),
                None => query.push(("expiration_date_gte", Utc::now().date_naive().to_string())),
            }
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: RawContractsPage = self.get(Host::Trading, "/v2/options/contracts", &query).await?;
            contracts.extend(page.option_contracts);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(contracts)
    }

    async fn snapshots(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> WheelResult<HashMap<String, RawSnapshot>> {
        let mut snapshots = HashMap::new();
        let mut page_token: Option<String> = None;
        let path = format!("/v1beta1/options/snapshots/{}", symbol.to_uppercase());

        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("expiration_date", expiration.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            let page: RawSnapshotsPage = self.get(Host::Data, &path, &query).await?;
            snapshots.extend(page.snapshots);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(snapshots)
    }
}

#[async_trait]
impl MarketData for AlpacaClient {
    async fn spot_price(&self, symbol: &str) -> WheelResult<Decimal> {
        let path = format!("/v2/stocks/{}/trades/latest", symbol.to_uppercase());
        let latest: RawLatestTrade = self.get(Host::Data, &path, &[]).await?;
        if latest.trade.price <= Decimal::ZERO {
            return Err(WheelError::market_data(format!("no valid trade price for {symbol}")));
        }
        Ok(latest.trade.price)
    }

    async fn expirations(&self, symbol: &str) -> WheelResult<Vec<NaiveDate>> {
        let contracts = self.list_contracts(symbol, None).await?;
        let dates: BTreeSet<NaiveDate> = contracts.iter().map(|c| c.expiration_date).collect();
        debug!(symbol, count = dates.len(), "expirations listed");
        Ok(dates.into_iter().collect())
    }

    async fn options_chain(&self, symbol: &str, expiration: NaiveDate) -> WheelResult<Vec<OptionContract>> {
        let contracts = self.list_contracts(symbol, Some(expiration)).await?;
        let snapshots = self.snapshots(symbol, expiration).await?;
        debug!(
            symbol,
            %expiration,
            contracts = contracts.len(),
            quoted = snapshots.len(),
            "options chain fetched"
        );

        Ok(contracts
            .into_iter()
            .map(|c| {
                let snapshot = snapshots.get(&c.symbol);
                to_option_contract(c, snapshot)
            })
            .collect())
    }
}
