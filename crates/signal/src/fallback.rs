use anyhow::Result;
use async_trait::async_trait;
use sentinel_core::{InstrumentFeatures, SignalProvider, TradeSignal};
use std::sync::Arc;
use tracing::warn;

/// Chains two providers: ask the primary, fall back to the secondary
/// when it fails. The engine keeps trading on the heuristic while a
/// remote model service is down.
pub struct FallbackSignalProvider {
    primary: Arc<dyn SignalProvider>,
    fallback: Arc<dyn SignalProvider>,
    name: String,
}

impl FallbackSignalProvider {
    #[must_use]
    pub fn new(primary: Arc<dyn SignalProvider>, fallback: Arc<dyn SignalProvider>) -> Self {
        let name = format!("{}+{}", primary.name(), fallback.name());
        Self {
            primary,
            fallback,
            name,
        }
    }
}

#[async_trait]
impl SignalProvider for FallbackSignalProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_signal(
        &self,
        instrument: &str,
        features: &InstrumentFeatures,
    ) -> Result<TradeSignal> {
        match self.primary.get_signal(instrument, features).await {
            Ok(signal) => Ok(signal),
            Err(e) => {
                warn!(
                    provider = self.primary.name(),
                    instrument,
                    error = %e,
                    "primary signal provider failed, using fallback"
                );
                self.fallback.get_signal(instrument, features).await
            }
        }
    }
}
