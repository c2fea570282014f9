//! Alpaca broker and market-data integration.
//!
//! This crate provides:
//! - [`AlpacaClient`]: REST client implementing both `Broker` and
//!   `MarketData` against the paper or live trading API
//! - [`SimulatedBroker`]: in-memory `Broker` for dry runs and tests
//!
//! # Authentication
//!
//! Requests carry the `APCA-API-KEY-ID` and `APCA-API-SECRET-KEY` headers.
//! The secret is held in a `SecretString` and never logged.

pub mod broker;
pub mod client;
pub mod market_data;
pub mod simulated;
mod types;

pub use client::{AlpacaClient, AlpacaConfig, ALPACA_DATA_URL, ALPACA_LIVE_URL, ALPACA_PAPER_URL};
pub use simulated::{SimulatedBroker, OPTION_COMMISSION};
