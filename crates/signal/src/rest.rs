use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sentinel_core::{InstrumentFeatures, SignalProvider, TradeSignal};
use serde::Serialize;
use std::time::Duration;

/// Signal provider backed by an external model service.
///
/// The service owns whatever model it likes; this client only speaks
/// the request/response contract and clamps the answer into range.
pub struct RestSignalProvider {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct SignalRequest<'a> {
    instrument: &'a str,
    last_price: Decimal,
    history: &'a [Decimal],
}

impl RestSignalProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("building signal HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    fn clamp(mut signal: TradeSignal) -> TradeSignal {
        signal.confidence = signal.confidence.clamp(0.0, 1.0);
        signal
    }
}

#[async_trait]
impl SignalProvider for RestSignalProvider {
    fn name(&self) -> &str {
        "rest"
    }

    async fn get_signal(
        &self,
        instrument: &str,
        features: &InstrumentFeatures,
    ) -> Result<TradeSignal> {
        let request = SignalRequest {
            instrument,
            last_price: features.last_price,
            history: &features.history,
        };

        let signal: TradeSignal = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("signal service unreachable at {}", self.endpoint))?
            .error_for_status()
            .context("signal service returned an error status")?
            .json()
            .await
            .context("malformed signal service response")?;

        Ok(Self::clamp(signal))
    }
}
