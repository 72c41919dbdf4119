pub mod error;
pub mod paper;
pub mod router;

pub use error::{RouteAttempt, RouteError};
pub use paper::PaperVenue;
pub use router::OrderRouter;
