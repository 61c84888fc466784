//! Cash flow metrics operations

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::{get_date, get_decimal, get_opt_decimal, Database};
use crate::error::Result;
use crate::models::CashFlowMetrics;
use crate::repository::CashFlowMetricsRepository;

const METRICS_COLUMNS: &str = r#"user_id, period_start, period_end, total_income, total_expenses,
    net_cash_flow, savings_rate, recurring_expenses, discretionary_expenses,
    largest_expense_category, largest_expense_amount, transfers_excluded"#;

fn row_to_metrics(row: &rusqlite::Row<'_>) -> rusqlite::Result<CashFlowMetrics> {
    Ok(CashFlowMetrics {
        user_id: row.get(0)?,
        period_start: get_date(row, 1)?,
        period_end: get_date(row, 2)?,
        total_income: get_decimal(row, 3)?,
        total_expenses: get_decimal(row, 4)?,
        net_cash_flow: get_decimal(row, 5)?,
        savings_rate: get_opt_decimal(row, 6)?,
        recurring_expenses: get_decimal(row, 7)?,
        discretionary_expenses: get_decimal(row, 8)?,
        largest_expense_category: row.get(9)?,
        largest_expense_amount: get_opt_decimal(row, 10)?,
        transfers_excluded: row.get(11)?,
    })
}

impl CashFlowMetricsRepository for Database {
    fn get_by_user_and_period(
        &self,
        user_id: i64,
        period_start: NaiveDate,
    ) -> Result<Option<CashFlowMetrics>> {
        let conn = self.conn()?;
        let metrics = conn
            .query_row(
                &format!(
                    "SELECT {} FROM cash_flow_metrics WHERE user_id = ? AND period_start = ?",
                    METRICS_COLUMNS
                ),
                params![user_id, period_start.to_string()],
                row_to_metrics,
            )
            .optional()?;
        Ok(metrics)
    }

    fn get_periods_in_range(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CashFlowMetrics>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM cash_flow_metrics
            WHERE user_id = ? AND period_start >= ? AND period_start <= ?
            ORDER BY period_start ASC
            "#,
            METRICS_COLUMNS
        ))?;
        let metrics = stmt
            .query_map(
                params![user_id, start.to_string(), end.to_string()],
                row_to_metrics,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(metrics)
    }

    fn upsert(&self, m: &CashFlowMetrics) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO cash_flow_metrics (user_id, period_start, period_end, total_income, total_expenses,
                net_cash_flow, savings_rate, recurring_expenses, discretionary_expenses,
                largest_expense_category, largest_expense_amount, transfers_excluded)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, period_start) DO UPDATE SET
                period_end = excluded.period_end,
                total_income = excluded.total_income,
                total_expenses = excluded.total_expenses,
                net_cash_flow = excluded.net_cash_flow,
                savings_rate = excluded.savings_rate,
                recurring_expenses = excluded.recurring_expenses,
                discretionary_expenses = excluded.discretionary_expenses,
                largest_expense_category = excluded.largest_expense_category,
                largest_expense_amount = excluded.largest_expense_amount,
                transfers_excluded = excluded.transfers_excluded,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![
                m.user_id,
                m.period_start.to_string(),
                m.period_end.to_string(),
                m.total_income.to_string(),
                m.total_expenses.to_string(),
                m.net_cash_flow.to_string(),
                m.savings_rate.map(|d| d.to_string()),
                m.recurring_expenses.to_string(),
                m.discretionary_expenses.to_string(),
                m.largest_expense_category,
                m.largest_expense_amount.map(|d| d.to_string()),
                m.transfers_excluded,
            ],
        )?;
        Ok(())
    }
}
