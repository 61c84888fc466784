//! Computation log operations

use rusqlite::{params, OptionalExtension};

use super::{get_enum, parse_datetime, Database};
use crate::error::Result;
use crate::models::{ComputationCounts, ComputationLog, ComputationType};
use crate::repository::ComputationLogRepository;

impl ComputationLogRepository for Database {
    fn mark_started(&self, user_id: i64, computation_type: ComputationType) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO computation_log (user_id, computation_type, status, started_at)
            VALUES (?, ?, 'in_progress', CURRENT_TIMESTAMP)
            ON CONFLICT(user_id, computation_type) DO UPDATE SET
                status = 'in_progress',
                started_at = CURRENT_TIMESTAMP,
                completed_at = NULL,
                periods_computed = 0,
                categories_computed = 0,
                merchants_computed = 0,
                transactions_processed = 0,
                computation_time_ms = NULL,
                error_message = NULL
            "#,
            params![user_id, computation_type.as_str()],
        )?;
        Ok(())
    }

    fn mark_succeeded(
        &self,
        user_id: i64,
        computation_type: ComputationType,
        counts: ComputationCounts,
        computation_time_ms: i64,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE computation_log
            SET status = 'success', completed_at = CURRENT_TIMESTAMP,
                periods_computed = ?, categories_computed = ?, merchants_computed = ?,
                transactions_processed = ?, computation_time_ms = ?, error_message = NULL
            WHERE user_id = ? AND computation_type = ?
            "#,
            params![
                counts.periods,
                counts.categories,
                counts.merchants,
                counts.transactions,
                computation_time_ms,
                user_id,
                computation_type.as_str(),
            ],
        )?;
        Ok(())
    }

    fn mark_failed(
        &self,
        user_id: i64,
        computation_type: ComputationType,
        error_message: &str,
        computation_time_ms: i64,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE computation_log
            SET status = 'failed', completed_at = CURRENT_TIMESTAMP,
                computation_time_ms = ?, error_message = ?
            WHERE user_id = ? AND computation_type = ?
            "#,
            params![
                computation_time_ms,
                error_message,
                user_id,
                computation_type.as_str()
            ],
        )?;
        Ok(())
    }

    fn get(
        &self,
        user_id: i64,
        computation_type: ComputationType,
    ) -> Result<Option<ComputationLog>> {
        let conn = self.conn()?;
        let log = conn
            .query_row(
                r#"
                SELECT user_id, computation_type, status, started_at, completed_at, periods_computed,
                       categories_computed, merchants_computed, transactions_processed,
                       computation_time_ms, error_message
                FROM computation_log
                WHERE user_id = ? AND computation_type = ?
                "#,
                params![user_id, computation_type.as_str()],
                |row| {
                    let started_at: String = row.get(3)?;
                    let completed_at: Option<String> = row.get(4)?;
                    Ok(ComputationLog {
                        user_id: row.get(0)?,
                        computation_type: get_enum(row, 1)?,
                        status: get_enum(row, 2)?,
                        started_at: parse_datetime(&started_at),
                        completed_at: completed_at.map(|s| parse_datetime(&s)),
                        counts: ComputationCounts {
                            periods: row.get(5)?,
                            categories: row.get(6)?,
                            merchants: row.get(7)?,
                            transactions: row.get(8)?,
                        },
                        computation_time_ms: row.get(9)?,
                        error_message: row.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(log)
    }
}
