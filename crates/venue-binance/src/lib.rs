//! Binance spot connector.
//!
//! Speaks the signed REST API: market orders by quote notional, account
//! balances, and last-trade prices. All requests pass through a shared
//! rate limiter; signing uses HMAC-SHA256 over the query string.

pub mod connector;
pub mod sign;
pub mod types;

pub use connector::{BinanceConnector, BinanceCredentials};
