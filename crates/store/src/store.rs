use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sentinel_core::{
    ExecutionAction, ExecutionRecord, ExitReason, Position, PositionStatus, RiskSettings, Session,
    SessionMode, SessionStatus, Side,
};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// `SQLite` store for sessions, positions, and the execution log.
///
/// All writes are single-row upserts or appends; cross-session
/// transactions are never needed because each session's monitor owns
/// its rows. Monetary values travel as decimal strings.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (or creates) the database at `database_url` and runs
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates an in-memory database. Used by tests and by ephemeral
    /// paper runs that do not want a file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or a migration fails.
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        // A single pinned connection: an in-memory database lives and
        // dies with its connection, and a second one would see a blank
        // database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Inserts or updates a session. Identity fields are written once;
    /// the conflict arm rewrites only what a running session mutates.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database write fails.
    pub async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let risk_json = serde_json::to_string(&session.risk)?;

        sqlx::query(
            r"
            INSERT INTO sessions (id, user_id, start_time, end_time, status, stop_reason, mode,
                                  initial_portfolio, current_portfolio, total_pnl, trades_count,
                                  risk_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                end_time = excluded.end_time,
                status = excluded.status,
                stop_reason = excluded.stop_reason,
                current_portfolio = excluded.current_portfolio,
                total_pnl = excluded.total_pnl,
                trades_count = excluded.trades_count
            ",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.status.as_str())
        .bind(&session.stop_reason)
        .bind(session.mode.as_str())
        .bind(session.initial_portfolio.to_string())
        .bind(session.current_portfolio.to_string())
        .bind(session.total_pnl.to_string())
        .bind(i64::from(session.trades_count))
        .bind(risk_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub async fn find_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "{SESSION_COLUMNS} WHERE id = ?1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    /// The user's ACTIVE session, if any. At most one exists per user.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub async fn find_active_session(&self, user_id: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "{SESSION_COLUMNS} WHERE user_id = ?1 AND status = 'ACTIVE'
             ORDER BY start_time DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    /// All ACTIVE sessions across users. Used at boot to re-attach
    /// monitors after a crash.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub async fn list_active_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "{SESSION_COLUMNS} WHERE status = 'ACTIVE' ORDER BY start_time"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Session::try_from).collect()
    }

    /// Inserts or updates a position. Entry fields are immutable after
    /// insert; only mark-to-market and exit fields are rewritten.
    ///
    /// # Errors
    ///
    /// Returns an error on database failure, including the unique-index
    /// violation raised by a second ACTIVE position on the same symbol.
    pub async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO positions (id, session_id, symbol, side, quantity, entry_price,
                                   current_price, stop_loss, take_profit, entry_time, last_update,
                                   status, pnl, pnl_pct, confidence, venue, venue_order_id,
                                   exit_price, exit_time, exit_reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                    ?18, ?19, ?20)
            ON CONFLICT(id) DO UPDATE SET
                current_price = excluded.current_price,
                last_update = excluded.last_update,
                status = excluded.status,
                pnl = excluded.pnl,
                pnl_pct = excluded.pnl_pct,
                exit_price = excluded.exit_price,
                exit_time = excluded.exit_time,
                exit_reason = excluded.exit_reason
            ",
        )
        .bind(&position.id)
        .bind(&position.session_id)
        .bind(&position.symbol)
        .bind(position.side.as_str())
        .bind(position.quantity.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.current_price.to_string())
        .bind(position.stop_loss.to_string())
        .bind(position.take_profit.to_string())
        .bind(position.entry_time)
        .bind(position.last_update)
        .bind(position.status.as_str())
        .bind(position.pnl.to_string())
        .bind(position.pnl_pct)
        .bind(position.confidence)
        .bind(&position.venue)
        .bind(&position.venue_order_id)
        .bind(position.exit_price.map(|d| d.to_string()))
        .bind(position.exit_time)
        .bind(position.exit_reason.map(ExitReason::as_str))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub async fn find_position(&self, position_id: &str) -> Result<Option<Position>, StoreError> {
        let row = sqlx::query_as::<_, PositionRow>(&format!(
            "{POSITION_COLUMNS} WHERE id = ?1"
        ))
        .bind(position_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Position::try_from).transpose()
    }

    /// ACTIVE positions of one session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub async fn list_active_positions(
        &self,
        session_id: &str,
    ) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query_as::<_, PositionRow>(&format!(
            "{POSITION_COLUMNS} WHERE session_id = ?1 AND status = 'ACTIVE' ORDER BY entry_time"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Position::try_from).collect()
    }

    /// All positions of one session, open and closed, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub async fn list_positions(&self, session_id: &str) -> Result<Vec<Position>, StoreError> {
        let rows = sqlx::query_as::<_, PositionRow>(&format!(
            "{POSITION_COLUMNS} WHERE session_id = ?1 ORDER BY entry_time"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Position::try_from).collect()
    }

    /// Appends one audit row and returns its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn append_execution(&self, record: &ExecutionRecord) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO execution_log (session_id, position_id, action, symbol, price, quantity,
                                       reason, timestamp, pnl)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(&record.session_id)
        .bind(&record.position_id)
        .bind(record.action.as_str())
        .bind(&record.symbol)
        .bind(record.price.to_string())
        .bind(record.quantity.to_string())
        .bind(&record.reason)
        .bind(record.timestamp)
        .bind(record.pnl.map(|d| d.to_string()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// The session's audit trail in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub async fn list_executions(
        &self,
        session_id: &str,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            r"
            SELECT id, session_id, position_id, action, symbol, price, quantity, reason,
                   timestamp, pnl
            FROM execution_log WHERE session_id = ?1 ORDER BY id
            ",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExecutionRecord::try_from).collect()
    }
}

const SESSION_COLUMNS: &str = "SELECT id, user_id, start_time, end_time, status, stop_reason, \
     mode, initial_portfolio, current_portfolio, total_pnl, trades_count, risk_json FROM sessions";

const POSITION_COLUMNS: &str = "SELECT id, session_id, symbol, side, quantity, entry_price, \
     current_price, stop_loss, take_profit, entry_time, last_update, status, pnl, pnl_pct, \
     confidence, venue, venue_order_id, exit_price, exit_time, exit_reason FROM positions";

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    status: String,
    stop_reason: Option<String>,
    mode: String,
    initial_portfolio: String,
    current_portfolio: String,
    total_pnl: String,
    trades_count: i64,
    risk_json: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let risk: RiskSettings = serde_json::from_str(&row.risk_json)?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status.parse::<SessionStatus>().map_err(StoreError::InvalidRow)?,
            stop_reason: row.stop_reason,
            mode: row.mode.parse::<SessionMode>().map_err(StoreError::InvalidRow)?,
            initial_portfolio: parse_decimal("initial_portfolio", &row.initial_portfolio)?,
            current_portfolio: parse_decimal("current_portfolio", &row.current_portfolio)?,
            total_pnl: parse_decimal("total_pnl", &row.total_pnl)?,
            trades_count: u32::try_from(row.trades_count)
                .map_err(|_| StoreError::InvalidRow(format!("trades_count {}", row.trades_count)))?,
            risk,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    id: String,
    session_id: String,
    symbol: String,
    side: String,
    quantity: String,
    entry_price: String,
    current_price: String,
    stop_loss: String,
    take_profit: String,
    entry_time: DateTime<Utc>,
    last_update: DateTime<Utc>,
    status: String,
    pnl: String,
    pnl_pct: f64,
    confidence: f64,
    venue: Option<String>,
    venue_order_id: Option<String>,
    exit_price: Option<String>,
    exit_time: Option<DateTime<Utc>>,
    exit_reason: Option<String>,
}

impl TryFrom<PositionRow> for Position {
    type Error = StoreError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            symbol: row.symbol,
            side: row.side.parse::<Side>().map_err(StoreError::InvalidRow)?,
            quantity: parse_decimal("quantity", &row.quantity)?,
            entry_price: parse_decimal("entry_price", &row.entry_price)?,
            current_price: parse_decimal("current_price", &row.current_price)?,
            stop_loss: parse_decimal("stop_loss", &row.stop_loss)?,
            take_profit: parse_decimal("take_profit", &row.take_profit)?,
            entry_time: row.entry_time,
            last_update: row.last_update,
            status: row.status.parse::<PositionStatus>().map_err(StoreError::InvalidRow)?,
            pnl: parse_decimal("pnl", &row.pnl)?,
            pnl_pct: row.pnl_pct,
            confidence: row.confidence,
            venue: row.venue,
            venue_order_id: row.venue_order_id,
            exit_price: row
                .exit_price
                .as_deref()
                .map(|v| parse_decimal("exit_price", v))
                .transpose()?,
            exit_time: row.exit_time,
            exit_reason: row
                .exit_reason
                .as_deref()
                .map(|v| v.parse::<ExitReason>().map_err(StoreError::InvalidRow))
                .transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: i64,
    session_id: String,
    position_id: String,
    action: String,
    symbol: String,
    price: String,
    quantity: String,
    reason: String,
    timestamp: DateTime<Utc>,
    pnl: Option<String>,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            position_id: row.position_id,
            action: row.action.parse::<ExecutionAction>().map_err(StoreError::InvalidRow)?,
            symbol: row.symbol,
            price: parse_decimal("price", &row.price)?,
            quantity: parse_decimal("quantity", &row.quantity)?,
            reason: row.reason,
            timestamp: row.timestamp,
            pnl: row
                .pnl
                .as_deref()
                .map(|v| parse_decimal("pnl", v))
                .transpose()?,
        })
    }
}

fn parse_decimal(column: &'static str, value: &str) -> Result<Decimal, StoreError> {
    value
        .parse::<Decimal>()
        .map_err(|_| StoreError::invalid_decimal(column, value))
}
