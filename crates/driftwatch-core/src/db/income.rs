//! Income source operations

use rusqlite::params;

use super::{get_date, get_decimal, get_enum, get_opt_date, Database};
use crate::error::Result;
use crate::models::IncomeSource;
use crate::repository::IncomeSourceRepository;

impl IncomeSourceRepository for Database {
    fn upsert_from_detection(&self, sources: &[IncomeSource]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO income_sources (user_id, source_name, display_name, source_type, average_amount,
                    last_amount, frequency, first_date, last_date, next_expected_date, transaction_count,
                    confidence_score, is_active)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, source_name) DO UPDATE SET
                    display_name = excluded.display_name,
                    source_type = excluded.source_type,
                    average_amount = excluded.average_amount,
                    last_amount = excluded.last_amount,
                    frequency = excluded.frequency,
                    first_date = excluded.first_date,
                    last_date = excluded.last_date,
                    next_expected_date = excluded.next_expected_date,
                    transaction_count = excluded.transaction_count,
                    confidence_score = excluded.confidence_score,
                    is_active = excluded.is_active,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )?;
            for s in sources {
                stmt.execute(params![
                    s.user_id,
                    s.source_name,
                    s.display_name,
                    s.source_type.as_str(),
                    s.average_amount.to_string(),
                    s.last_amount.to_string(),
                    s.frequency.as_str(),
                    s.first_date.to_string(),
                    s.last_date.to_string(),
                    s.next_expected_date.map(|d| d.to_string()),
                    s.transaction_count,
                    s.confidence_score,
                    s.is_active,
                ])?;
            }
        }
        tx.commit()?;
        Ok(sources.len())
    }

    fn get_by_user_id(&self, user_id: i64) -> Result<Vec<IncomeSource>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, source_name, display_name, source_type, average_amount, last_amount,
                   frequency, first_date, last_date, next_expected_date, transaction_count,
                   confidence_score, is_active
            FROM income_sources
            WHERE user_id = ?
            ORDER BY confidence_score DESC, source_name ASC
            "#,
        )?;
        let sources = stmt
            .query_map(params![user_id], |row| {
                Ok(IncomeSource {
                    user_id: row.get(0)?,
                    source_name: row.get(1)?,
                    display_name: row.get(2)?,
                    source_type: get_enum(row, 3)?,
                    average_amount: get_decimal(row, 4)?,
                    last_amount: get_decimal(row, 5)?,
                    frequency: get_enum(row, 6)?,
                    first_date: get_date(row, 7)?,
                    last_date: get_date(row, 8)?,
                    next_expected_date: get_opt_date(row, 9)?,
                    transaction_count: row.get(10)?,
                    confidence_score: row.get(11)?,
                    is_active: row.get(12)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }
}
