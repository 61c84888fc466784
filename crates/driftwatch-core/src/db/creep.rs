//! Lifestyle creep score operations

use chrono::NaiveDate;
use rusqlite::params;

use super::{get_date, get_decimal, get_enum, Database};
use crate::error::Result;
use crate::models::LifestyleCreepScore;
use crate::repository::LifestyleCreepScoreRepository;

const SCORE_COLUMNS: &str = r#"user_id, period_start, category, baseline_amount, current_amount,
    absolute_change, percentage_change, creep_score, severity, trend_direction,
    consecutive_months_elevated, is_seasonal"#;

fn row_to_score(row: &rusqlite::Row<'_>) -> rusqlite::Result<LifestyleCreepScore> {
    Ok(LifestyleCreepScore {
        user_id: row.get(0)?,
        period_start: get_date(row, 1)?,
        category: row.get(2)?,
        baseline_amount: get_decimal(row, 3)?,
        current_amount: get_decimal(row, 4)?,
        absolute_change: get_decimal(row, 5)?,
        percentage_change: get_decimal(row, 6)?,
        creep_score: get_decimal(row, 7)?,
        severity: get_enum(row, 8)?,
        trend_direction: get_enum(row, 9)?,
        consecutive_months_elevated: row.get(10)?,
        is_seasonal: row.get(11)?,
    })
}

impl LifestyleCreepScoreRepository for Database {
    fn get_by_user_and_period(
        &self,
        user_id: i64,
        period_start: NaiveDate,
    ) -> Result<Vec<LifestyleCreepScore>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM lifestyle_creep_scores WHERE user_id = ? AND period_start = ? ORDER BY category ASC",
            SCORE_COLUMNS
        ))?;
        let scores = stmt
            .query_map(params![user_id, period_start.to_string()], row_to_score)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(scores)
    }

    fn get_recent_scores_by_category(
        &self,
        user_id: i64,
        category: &str,
        lookback: usize,
    ) -> Result<Vec<LifestyleCreepScore>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM lifestyle_creep_scores
            WHERE user_id = ? AND category = ?
            ORDER BY period_start DESC
            LIMIT ?
            "#,
            SCORE_COLUMNS
        ))?;
        let scores = stmt
            .query_map(params![user_id, category, lookback as i64], row_to_score)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(scores)
    }

    fn upsert_many(&self, rows: &[LifestyleCreepScore]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO lifestyle_creep_scores (user_id, period_start, category, baseline_amount, current_amount,
                    absolute_change, percentage_change, creep_score, severity, trend_direction,
                    consecutive_months_elevated, is_seasonal)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, period_start, category) DO UPDATE SET
                    baseline_amount = excluded.baseline_amount,
                    current_amount = excluded.current_amount,
                    absolute_change = excluded.absolute_change,
                    percentage_change = excluded.percentage_change,
                    creep_score = excluded.creep_score,
                    severity = excluded.severity,
                    trend_direction = excluded.trend_direction,
                    consecutive_months_elevated = excluded.consecutive_months_elevated,
                    is_seasonal = excluded.is_seasonal,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )?;
            for s in rows {
                stmt.execute(params![
                    s.user_id,
                    s.period_start.to_string(),
                    s.category,
                    s.baseline_amount.to_string(),
                    s.current_amount.to_string(),
                    s.absolute_change.to_string(),
                    s.percentage_change.to_string(),
                    s.creep_score.to_string(),
                    s.severity.as_str(),
                    s.trend_direction.as_str(),
                    s.consecutive_months_elevated,
                    s.is_seasonal,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn delete_for_period(&self, user_id: i64, period_start: NaiveDate) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM lifestyle_creep_scores WHERE user_id = ? AND period_start = ?",
            params![user_id, period_start.to_string()],
        )?;
        Ok(deleted)
    }
}
