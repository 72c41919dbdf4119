use crate::session::RiskSettings;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Risk template applied to sessions that do not override it.
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub venues: VenuesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between monitoring ticks.
    pub tick_interval_secs: u64,
    /// Sessions older than this are refused at start and reported stale.
    pub staleness_window_secs: i64,
    /// Maximum positions opened in a single round.
    pub round_position_cap: usize,
    /// Symbols scanned when opening a round.
    pub universe: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// "momentum" for the built-in provider, "rest" for an external service.
    pub provider: String,
    /// Endpoint for the REST provider; unused otherwise.
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    /// Fast moving-average window for the momentum provider.
    pub fast_window: usize,
    /// Slow moving-average window for the momentum provider.
    pub slow_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenuesConfig {
    /// Routing order; earlier venues are tried first.
    pub priority: Vec<String>,
    #[serde(default)]
    pub binance: BinanceConfig,
    #[serde(default)]
    pub alpaca: AlpacaConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    pub enabled: bool,
    pub api_url: String,
    pub recv_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlpacaConfig {
    pub enabled: bool,
    pub api_url: String,
    pub data_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    pub starting_balance: Decimal,
    /// Anchor prices for the deterministic paper ticker, keyed by symbol.
    pub base_prices: HashMap<String, Decimal>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            database: DatabaseConfig::default(),
            risk: RiskSettings::default(),
            signal: SignalConfig::default(),
            venues: VenuesConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 10,
            staleness_window_secs: 3600,
            round_position_cap: 3,
            universe: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sentinel.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            provider: "momentum".to_string(),
            endpoint: None,
            timeout_secs: 5,
            fast_window: 5,
            slow_window: 20,
        }
    }
}

impl Default for VenuesConfig {
    fn default() -> Self {
        Self {
            priority: vec!["binance".to_string(), "alpaca".to_string()],
            binance: BinanceConfig::default(),
            alpaca: AlpacaConfig::default(),
            paper: PaperConfig::default(),
        }
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://api.binance.com".to_string(),
            recv_window_ms: 5000,
        }
    }
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://paper-api.alpaca.markets".to_string(),
            data_url: "https://data.alpaca.markets".to_string(),
        }
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_balance: Decimal::from(10_000),
            base_prices: HashMap::from([
                ("BTCUSDT".to_string(), Decimal::from(65_000)),
                ("ETHUSDT".to_string(), Decimal::from(3_500)),
                ("SOLUSDT".to_string(), Decimal::from(150)),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.engine.tick_interval_secs, 10);
        assert_eq!(config.engine.round_position_cap, 3);
        assert_eq!(config.risk.max_concurrent_positions, 5);
        assert_eq!(config.venues.priority, vec!["binance", "alpaca"]);
        assert_eq!(config.venues.paper.starting_balance, dec!(10000));
        assert_eq!(config.venues.paper.base_prices["BTCUSDT"], dec!(65000));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml = r#"
            [engine]
            tick_interval_secs = 2
            staleness_window_secs = 600
            round_position_cap = 1
            universe = ["BTCUSDT"]
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.tick_interval_secs, 2);
        assert_eq!(config.engine.universe, vec!["BTCUSDT"]);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.signal.provider, "momentum");
    }
}
