//! Recurring stream operations

use rusqlite::params;

use super::{get_decimal, get_enum, Database};
use crate::error::Result;
use crate::models::RecurringStream;
use crate::repository::RecurringStreamRepository;

impl RecurringStreamRepository for Database {
    fn get_active_by_user_id(&self, user_id: i64) -> Result<Vec<RecurringStream>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT stream_id, user_id, description, merchant_name, direction, last_amount, is_active
            FROM recurring_streams
            WHERE user_id = ? AND is_active = TRUE
            ORDER BY stream_id ASC
            "#,
        )?;
        let streams = stmt
            .query_map(params![user_id], |row| {
                Ok(RecurringStream {
                    stream_id: row.get(0)?,
                    user_id: row.get(1)?,
                    description: row.get(2)?,
                    merchant_name: row.get(3)?,
                    direction: get_enum(row, 4)?,
                    last_amount: get_decimal(row, 5)?,
                    is_active: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(streams)
    }

    fn upsert(&self, stream: &RecurringStream) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO recurring_streams (stream_id, user_id, description, merchant_name, direction, last_amount, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stream_id) DO UPDATE SET
                user_id = excluded.user_id,
                description = excluded.description,
                merchant_name = excluded.merchant_name,
                direction = excluded.direction,
                last_amount = excluded.last_amount,
                is_active = excluded.is_active
            "#,
            params![
                stream.stream_id,
                stream.user_id,
                stream.description,
                stream.merchant_name,
                stream.direction.as_str(),
                stream.last_amount.to_string(),
                stream.is_active,
            ],
        )?;
        Ok(())
    }
}
