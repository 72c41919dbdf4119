pub mod config;
pub mod config_loader;
pub mod error;
pub mod order;
pub mod position;
pub mod session;
pub mod signal;
pub mod synth;
pub mod traits;

pub use config::{
    AlpacaConfig, AppConfig, BinanceConfig, DatabaseConfig, EngineConfig, PaperConfig,
    SignalConfig, VenuesConfig,
};
pub use config_loader::ConfigLoader;
pub use error::VenueError;
pub use order::{ExecutionAction, ExecutionRecord, ExecutionResult, OrderTicket, VenueFill};
pub use position::{ExitReason, Position, PositionStatus, Side};
pub use session::{RiskSettings, Session, SessionMode, SessionStatus};
pub use signal::{InstrumentFeatures, SignalAction, TradeSignal};
pub use synth::SyntheticTicker;
pub use traits::{SignalProvider, VenueConnector};
