//! Spending period, category and merchant rollups

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::{get_date, get_decimal, get_enum, Database};
use crate::error::Result;
use crate::models::{CategorySpending, MerchantSpending, PeriodType, SpendingPeriod};
use crate::repository::{
    CategorySpendingRepository, MerchantSpendingRepository, SpendingPeriodRepository,
};

const PERIOD_COLUMNS: &str = r#"user_id, period_type, period_start, period_end, total_inflow, total_outflow,
    total_inflow_excluding_transfers, total_outflow_excluding_transfers, net_flow,
    net_flow_excluding_transfers, transaction_count, is_finalized"#;

fn row_to_period(row: &rusqlite::Row<'_>) -> rusqlite::Result<SpendingPeriod> {
    Ok(SpendingPeriod {
        user_id: row.get(0)?,
        period_type: get_enum(row, 1)?,
        period_start: get_date(row, 2)?,
        period_end: get_date(row, 3)?,
        total_inflow: get_decimal(row, 4)?,
        total_outflow: get_decimal(row, 5)?,
        total_inflow_excluding_transfers: get_decimal(row, 6)?,
        total_outflow_excluding_transfers: get_decimal(row, 7)?,
        net_flow: get_decimal(row, 8)?,
        net_flow_excluding_transfers: get_decimal(row, 9)?,
        transaction_count: row.get(10)?,
        is_finalized: row.get(11)?,
    })
}

impl SpendingPeriodRepository for Database {
    fn get_by_user_and_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<Option<SpendingPeriod>> {
        let conn = self.conn()?;
        let period = conn
            .query_row(
                &format!(
                    "SELECT {} FROM spending_periods WHERE user_id = ? AND period_type = ? AND period_start = ?",
                    PERIOD_COLUMNS
                ),
                params![user_id, period_type.as_str(), period_start.to_string()],
                row_to_period,
            )
            .optional()?;
        Ok(period)
    }

    fn get_periods_for_user(
        &self,
        user_id: i64,
        period_type: PeriodType,
    ) -> Result<Vec<SpendingPeriod>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM spending_periods WHERE user_id = ? AND period_type = ? ORDER BY period_start ASC",
            PERIOD_COLUMNS
        ))?;
        let periods = stmt
            .query_map(params![user_id, period_type.as_str()], row_to_period)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(periods)
    }

    fn upsert(&self, period: &SpendingPeriod) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO spending_periods (user_id, period_type, period_start, period_end, total_inflow, total_outflow,
                total_inflow_excluding_transfers, total_outflow_excluding_transfers, net_flow,
                net_flow_excluding_transfers, transaction_count, is_finalized)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, period_type, period_start) DO UPDATE SET
                period_end = excluded.period_end,
                total_inflow = excluded.total_inflow,
                total_outflow = excluded.total_outflow,
                total_inflow_excluding_transfers = excluded.total_inflow_excluding_transfers,
                total_outflow_excluding_transfers = excluded.total_outflow_excluding_transfers,
                net_flow = excluded.net_flow,
                net_flow_excluding_transfers = excluded.net_flow_excluding_transfers,
                transaction_count = excluded.transaction_count,
                is_finalized = excluded.is_finalized,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                period.user_id,
                period.period_type.as_str(),
                period.period_start.to_string(),
                period.period_end.to_string(),
                period.total_inflow.to_string(),
                period.total_outflow.to_string(),
                period.total_inflow_excluding_transfers.to_string(),
                period.total_outflow_excluding_transfers.to_string(),
                period.net_flow.to_string(),
                period.net_flow_excluding_transfers.to_string(),
                period.transaction_count,
                period.is_finalized,
            ],
        )?;
        Ok(())
    }

    fn delete_for_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM spending_periods WHERE user_id = ? AND period_type = ? AND period_start = ?",
            params![user_id, period_type.as_str(), period_start.to_string()],
        )?;
        Ok(())
    }

    fn mark_finalized_before(&self, user_id: i64, today: NaiveDate) -> Result<usize> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE spending_periods
            SET is_finalized = TRUE, updated_at = CURRENT_TIMESTAMP
            WHERE user_id = ? AND period_end < ? AND is_finalized = FALSE
            "#,
            params![user_id, today.to_string()],
        )?;
        Ok(changed)
    }
}

impl CategorySpendingRepository for Database {
    fn get_by_user_and_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<Vec<CategorySpending>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, period_type, period_start, category, total_amount, transaction_count,
                   average_amount, largest_transaction
            FROM category_spending
            WHERE user_id = ? AND period_type = ? AND period_start = ?
            ORDER BY category ASC
            "#,
        )?;
        let mut rows = stmt
            .query_map(
                params![user_id, period_type.as_str(), period_start.to_string()],
                |row| {
                    Ok(CategorySpending {
                        user_id: row.get(0)?,
                        period_type: get_enum(row, 1)?,
                        period_start: get_date(row, 2)?,
                        category: row.get(3)?,
                        total_amount: get_decimal(row, 4)?,
                        transaction_count: row.get(5)?,
                        average_amount: get_decimal(row, 6)?,
                        largest_transaction: get_decimal(row, 7)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Amounts are TEXT, so order numerically here
        rows.sort_by(|a, b| {
            b.total_amount
                .cmp(&a.total_amount)
                .then_with(|| a.category.cmp(&b.category))
        });
        Ok(rows)
    }

    fn upsert_many(&self, rows: &[CategorySpending]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO category_spending (user_id, period_type, period_start, category, total_amount,
                    transaction_count, average_amount, largest_transaction)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, period_type, period_start, category) DO UPDATE SET
                    total_amount = excluded.total_amount,
                    transaction_count = excluded.transaction_count,
                    average_amount = excluded.average_amount,
                    largest_transaction = excluded.largest_transaction
                "#,
            )?;
            for row in rows {
                stmt.execute(params![
                    row.user_id,
                    row.period_type.as_str(),
                    row.period_start.to_string(),
                    row.category,
                    row.total_amount.to_string(),
                    row.transaction_count,
                    row.average_amount.to_string(),
                    row.largest_transaction.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn delete_for_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM category_spending WHERE user_id = ? AND period_type = ? AND period_start = ?",
            params![user_id, period_type.as_str(), period_start.to_string()],
        )?;
        Ok(deleted)
    }
}

impl MerchantSpendingRepository for Database {
    fn get_by_user_and_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<Vec<MerchantSpending>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, period_type, period_start, merchant_name, total_amount, transaction_count,
                   average_amount, largest_transaction
            FROM merchant_spending
            WHERE user_id = ? AND period_type = ? AND period_start = ?
            ORDER BY merchant_name ASC
            "#,
        )?;
        let mut rows = stmt
            .query_map(
                params![user_id, period_type.as_str(), period_start.to_string()],
                |row| {
                    Ok(MerchantSpending {
                        user_id: row.get(0)?,
                        period_type: get_enum(row, 1)?,
                        period_start: get_date(row, 2)?,
                        merchant_name: row.get(3)?,
                        total_amount: get_decimal(row, 4)?,
                        transaction_count: row.get(5)?,
                        average_amount: get_decimal(row, 6)?,
                        largest_transaction: get_decimal(row, 7)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.sort_by(|a, b| {
            b.total_amount
                .cmp(&a.total_amount)
                .then_with(|| a.merchant_name.cmp(&b.merchant_name))
        });
        Ok(rows)
    }

    fn upsert_many(&self, rows: &[MerchantSpending]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO merchant_spending (user_id, period_type, period_start, merchant_name, total_amount,
                    transaction_count, average_amount, largest_transaction)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_id, period_type, period_start, merchant_name) DO UPDATE SET
                    total_amount = excluded.total_amount,
                    transaction_count = excluded.transaction_count,
                    average_amount = excluded.average_amount,
                    largest_transaction = excluded.largest_transaction
                "#,
            )?;
            for row in rows {
                stmt.execute(params![
                    row.user_id,
                    row.period_type.as_str(),
                    row.period_start.to_string(),
                    row.merchant_name,
                    row.total_amount.to_string(),
                    row.transaction_count,
                    row.average_amount.to_string(),
                    row.largest_transaction.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn delete_for_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM merchant_spending WHERE user_id = ? AND period_type = ? AND period_start = ?",
            params![user_id, period_type.as_str(), period_start.to_string()],
        )?;
        Ok(deleted)
    }
}
