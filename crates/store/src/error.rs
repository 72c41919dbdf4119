use thiserror::Error;

/// Errors from the session store.
///
/// Persistence failures are fatal to the operation that hit them, never
/// to the supervising process; callers log and retry on the next tick.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A monetary column held text that does not parse as a decimal.
    #[error("invalid decimal '{value}' in column {column}")]
    InvalidDecimal { column: &'static str, value: String },

    /// A row violated an enum or range constraint on read.
    #[error("invalid row: {0}")]
    InvalidRow(String),
}

impl StoreError {
    #[must_use]
    pub fn invalid_decimal(column: &'static str, value: &str) -> Self {
        Self::InvalidDecimal {
            column,
            value: value.to_string(),
        }
    }
}
