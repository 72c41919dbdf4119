pub mod fallback;
pub mod momentum;
pub mod rest;

pub use fallback::FallbackSignalProvider;
pub use momentum::MomentumSignalProvider;
pub use rest::RestSignalProvider;
