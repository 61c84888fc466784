//! SQLite storage with connection pooling and migrations
//!
//! `Database` implements every repository trait in `crate::repository`.
//! This module is organized by domain:
//! - `transactions` - Ledger reads and import inserts
//! - `spending` - Spending periods plus category and merchant rollups
//! - `baselines` - Lifestyle baselines
//! - `creep` - Lifestyle creep scores
//! - `income` - Detected income sources
//! - `cash_flow` - Monthly cash flow metrics
//! - `recurring` - Recurring streams from the bank-data feed
//! - `computation_log` - Last run per user and computation type
//!
//! Money is stored as TEXT holding the exact decimal string; dates are
//! `YYYY-MM-DD`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::Result;

mod baselines;
mod cash_flow;
mod computation_log;
mod creep;
mod income;
mod recurring;
mod spending;
mod transactions;

pub use transactions::TransactionInsertResult;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

/// Read a `YYYY-MM-DD` column
pub(crate) fn get_date(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_opt_date(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<NaiveDate>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Read a decimal stored as TEXT
pub(crate) fn get_decimal(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = row.get(idx)?;
    Decimal::from_str(&s).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn get_opt_decimal(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<Decimal>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| Decimal::from_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

/// Read an enum column stored via its `as_str` form
pub(crate) fn get_enum<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_error(idx, e))
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Open (or create) a database file and apply migrations
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because every pooled
    /// connection to `:memory:` would see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "driftwatch_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Clear every derived table, keeping the ledger and recurring streams
    pub fn reset_derived(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            DELETE FROM category_spending;
            DELETE FROM merchant_spending;
            DELETE FROM spending_periods;
            DELETE FROM lifestyle_baselines;
            DELETE FROM lifestyle_creep_scores;
            DELETE FROM income_sources;
            DELETE FROM cash_flow_metrics;
            DELETE FROM computation_log;
            "#,
        )?;
        info!("Derived analytics tables cleared");
        Ok(())
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: per-user batch jobs write concurrently, readers don't block writers
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            -- Ledger (owned by the bank-data feed; read-only to the engine)
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                name TEXT NOT NULL,
                merchant_name TEXT,
                amount TEXT NOT NULL,                 -- signed decimal, positive = money out
                category_primary TEXT,
                category_detailed TEXT,
                pending BOOLEAN NOT NULL DEFAULT FALSE,
                import_hash TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);

            -- Period rollups
            CREATE TABLE IF NOT EXISTS spending_periods (
                user_id INTEGER NOT NULL,
                period_type TEXT NOT NULL,            -- daily, weekly, monthly, yearly
                period_start TEXT NOT NULL,
                period_end TEXT NOT NULL,
                total_inflow TEXT NOT NULL,
                total_outflow TEXT NOT NULL,
                total_inflow_excluding_transfers TEXT NOT NULL,
                total_outflow_excluding_transfers TEXT NOT NULL,
                net_flow TEXT NOT NULL,
                net_flow_excluding_transfers TEXT NOT NULL,
                transaction_count INTEGER NOT NULL,
                is_finalized BOOLEAN NOT NULL DEFAULT FALSE,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, period_type, period_start)
            );

            CREATE TABLE IF NOT EXISTS category_spending (
                user_id INTEGER NOT NULL,
                period_type TEXT NOT NULL,
                period_start TEXT NOT NULL,
                category TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                transaction_count INTEGER NOT NULL,
                average_amount TEXT NOT NULL,
                largest_transaction TEXT NOT NULL,
                PRIMARY KEY (user_id, period_type, period_start, category)
            );

            CREATE TABLE IF NOT EXISTS merchant_spending (
                user_id INTEGER NOT NULL,
                period_type TEXT NOT NULL,
                period_start TEXT NOT NULL,
                merchant_name TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                transaction_count INTEGER NOT NULL,
                average_amount TEXT NOT NULL,
                largest_transaction TEXT NOT NULL,
                PRIMARY KEY (user_id, period_type, period_start, merchant_name)
            );

            -- Baselines and drift
            CREATE TABLE IF NOT EXISTS lifestyle_baselines (
                user_id INTEGER NOT NULL,
                category TEXT NOT NULL,
                baseline_monthly_amount TEXT NOT NULL,
                standard_deviation TEXT,
                baseline_start TEXT NOT NULL,
                baseline_end TEXT NOT NULL,
                months_count INTEGER NOT NULL,
                transaction_count INTEGER NOT NULL,
                is_locked BOOLEAN NOT NULL DEFAULT FALSE,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, category)
            );

            CREATE TABLE IF NOT EXISTS lifestyle_creep_scores (
                user_id INTEGER NOT NULL,
                period_start TEXT NOT NULL,
                category TEXT NOT NULL,
                baseline_amount TEXT NOT NULL,
                current_amount TEXT NOT NULL,
                absolute_change TEXT NOT NULL,
                percentage_change TEXT NOT NULL,
                creep_score TEXT NOT NULL,
                severity TEXT NOT NULL,               -- NONE, LOW, MEDIUM, HIGH
                trend_direction TEXT NOT NULL,
                consecutive_months_elevated INTEGER NOT NULL DEFAULT 0,
                is_seasonal BOOLEAN NOT NULL DEFAULT FALSE,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, period_start, category)
            );
            CREATE INDEX IF NOT EXISTS idx_creep_scores_category ON lifestyle_creep_scores(user_id, category, period_start);

            -- Income and cash flow
            CREATE TABLE IF NOT EXISTS income_sources (
                user_id INTEGER NOT NULL,
                source_name TEXT NOT NULL,            -- normalized grouping key
                display_name TEXT NOT NULL,
                source_type TEXT NOT NULL,
                average_amount TEXT NOT NULL,
                last_amount TEXT NOT NULL,
                frequency TEXT NOT NULL,
                first_date TEXT NOT NULL,
                last_date TEXT NOT NULL,
                next_expected_date TEXT,
                transaction_count INTEGER NOT NULL,
                confidence_score REAL NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, source_name)
            );

            CREATE TABLE IF NOT EXISTS cash_flow_metrics (
                user_id INTEGER NOT NULL,
                period_start TEXT NOT NULL,
                period_end TEXT NOT NULL,
                total_income TEXT NOT NULL,
                total_expenses TEXT NOT NULL,
                net_cash_flow TEXT NOT NULL,
                savings_rate TEXT,                    -- NULL when there was no income
                recurring_expenses TEXT NOT NULL,
                discretionary_expenses TEXT NOT NULL,
                largest_expense_category TEXT,
                largest_expense_amount TEXT,
                transfers_excluded INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, period_start)
            );

            -- Recurring streams (external feed)
            CREATE TABLE IF NOT EXISTS recurring_streams (
                stream_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                description TEXT NOT NULL,
                merchant_name TEXT,
                direction TEXT NOT NULL,              -- inflow, outflow
                last_amount TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            );
            CREATE INDEX IF NOT EXISTS idx_recurring_streams_user ON recurring_streams(user_id);

            -- Last run of each computation
            CREATE TABLE IF NOT EXISTS computation_log (
                user_id INTEGER NOT NULL,
                computation_type TEXT NOT NULL,
                status TEXT NOT NULL,                 -- in_progress, success, failed
                started_at DATETIME NOT NULL,
                completed_at DATETIME,
                periods_computed INTEGER NOT NULL DEFAULT 0,
                categories_computed INTEGER NOT NULL DEFAULT 0,
                merchants_computed INTEGER NOT NULL DEFAULT 0,
                transactions_processed INTEGER NOT NULL DEFAULT 0,
                computation_time_ms INTEGER,
                error_message TEXT,
                PRIMARY KEY (user_id, computation_type)
            );
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
