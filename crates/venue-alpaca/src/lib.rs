//! Alpaca equities connector.
//!
//! Trades US equities through the REST API using notional market
//! orders. Alpaca acknowledges an order before filling it, so order
//! placement polls briefly for the fill instead of trusting the
//! acknowledgement.

pub mod connector;
pub mod types;

pub use connector::{AlpacaConnector, AlpacaCredentials};
