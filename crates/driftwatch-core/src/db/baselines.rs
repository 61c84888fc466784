//! Lifestyle baseline operations

use rusqlite::{params, Transaction};
use tracing::debug;

use super::{get_date, get_decimal, get_opt_decimal, Database};
use crate::error::Result;
use crate::models::LifestyleBaseline;
use crate::repository::LifestyleBaselineRepository;

impl LifestyleBaselineRepository for Database {
    fn get_by_user_id(&self, user_id: i64, locked_only: bool) -> Result<Vec<LifestyleBaseline>> {
        let conn = self.conn()?;
        let sql = if locked_only {
            r#"
            SELECT user_id, category, baseline_monthly_amount, standard_deviation, baseline_start,
                   baseline_end, months_count, transaction_count, is_locked
            FROM lifestyle_baselines
            WHERE user_id = ? AND is_locked = TRUE
            ORDER BY category ASC
            "#
        } else {
            r#"
            SELECT user_id, category, baseline_monthly_amount, standard_deviation, baseline_start,
                   baseline_end, months_count, transaction_count, is_locked
            FROM lifestyle_baselines
            WHERE user_id = ?
            ORDER BY category ASC
            "#
        };

        let mut stmt = conn.prepare(sql)?;
        let baselines = stmt
            .query_map(params![user_id], |row| {
                Ok(LifestyleBaseline {
                    user_id: row.get(0)?,
                    category: row.get(1)?,
                    baseline_monthly_amount: get_decimal(row, 2)?,
                    standard_deviation: get_opt_decimal(row, 3)?,
                    baseline_start: get_date(row, 4)?,
                    baseline_end: get_date(row, 5)?,
                    months_count: row.get(6)?,
                    transaction_count: row.get(7)?,
                    is_locked: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(baselines)
    }

    fn upsert_many(&self, rows: &[LifestyleBaseline]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        upsert_rows(&tx, rows)?;
        tx.commit()?;
        Ok(rows.len())
    }

    fn replace_for_user(&self, user_id: i64, rows: &[LifestyleBaseline]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM lifestyle_baselines WHERE user_id = ?",
            params![user_id],
        )?;
        upsert_rows(&tx, rows)?;
        tx.commit()?;
        debug!(user_id, deleted, inserted = rows.len(), "Replaced baselines");
        Ok(rows.len())
    }

    fn lock(&self, user_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE lifestyle_baselines SET is_locked = TRUE, updated_at = CURRENT_TIMESTAMP WHERE user_id = ?",
            params![user_id],
        )?;
        Ok(changed)
    }

    fn unlock(&self, user_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE lifestyle_baselines SET is_locked = FALSE, updated_at = CURRENT_TIMESTAMP WHERE user_id = ?",
            params![user_id],
        )?;
        Ok(changed)
    }

    fn has_baselines(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM lifestyle_baselines WHERE user_id = ?)",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn delete_for_user(&self, user_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM lifestyle_baselines WHERE user_id = ?",
            params![user_id],
        )?;
        Ok(deleted)
    }
}

fn upsert_rows(tx: &Transaction<'_>, rows: &[LifestyleBaseline]) -> Result<()> {
    let mut stmt = tx.prepare(
        r#"
        INSERT INTO lifestyle_baselines (user_id, category, baseline_monthly_amount, standard_deviation,
            baseline_start, baseline_end, months_count, transaction_count, is_locked)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, category) DO UPDATE SET
            baseline_monthly_amount = excluded.baseline_monthly_amount,
            standard_deviation = excluded.standard_deviation,
            baseline_start = excluded.baseline_start,
            baseline_end = excluded.baseline_end,
            months_count = excluded.months_count,
            transaction_count = excluded.transaction_count,
            is_locked = excluded.is_locked,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )?;
    for b in rows {
        stmt.execute(params![
            b.user_id,
            b.category,
            b.baseline_monthly_amount.to_string(),
            b.standard_deviation.map(|d| d.to_string()),
            b.baseline_start.to_string(),
            b.baseline_end.to_string(),
            b.months_count,
            b.transaction_count,
            b.is_locked,
        ])?;
    }
    Ok(())
}
