//! Transaction operations

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::{get_date, get_decimal, Database};
use crate::error::Result;
use crate::models::{NewTransaction, Transaction};
use crate::repository::{TransactionQuery, TransactionRepository};

/// Result of inserting a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionInsertResult {
    /// Transaction was inserted successfully, contains new transaction ID
    Inserted(i64),
    /// Transaction was a duplicate, contains existing transaction ID
    Duplicate(i64),
}

const TRANSACTION_COLUMNS: &str =
    "id, user_id, date, name, merchant_name, amount, category_primary, category_detailed, pending";

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: get_date(row, 2)?,
        name: row.get(3)?,
        merchant_name: row.get(4)?,
        amount: get_decimal(row, 5)?,
        category_primary: row.get(6)?,
        category_detailed: row.get(7)?,
        pending: row.get(8)?,
    })
}

impl Database {
    /// Insert a transaction (skips duplicates based on import_hash)
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<TransactionInsertResult> {
        let conn = self.conn()?;

        // Check for duplicate
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM transactions WHERE import_hash = ?",
                params![tx.import_hash],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(existing_id) = existing {
            return Ok(TransactionInsertResult::Duplicate(existing_id));
        }

        conn.execute(
            r#"
            INSERT INTO transactions (user_id, date, name, merchant_name, amount, category_primary, category_detailed, pending, import_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.user_id,
                tx.date.to_string(),
                tx.name,
                tx.merchant_name,
                tx.amount.to_string(),
                tx.category_primary,
                tx.category_detailed,
                tx.pending,
                tx.import_hash,
            ],
        )?;

        Ok(TransactionInsertResult::Inserted(conn.last_insert_rowid()))
    }

    /// Count transactions for a user
    pub fn count_transactions(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl TransactionRepository for Database {
    fn get_by_user(&self, user_id: i64, query: TransactionQuery) -> Result<(Vec<Transaction>, i64)> {
        let conn = self.conn()?;

        // Build dynamic WHERE clause
        let mut conditions = vec!["user_id = ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id)];

        if let Some(start) = query.start_date {
            conditions.push("date >= ?".to_string());
            params.push(Box::new(start.to_string()));
        }
        if let Some(end) = query.end_date {
            conditions.push("date <= ?".to_string());
            params.push(Box::new(end.to_string()));
        }
        if let Some(pending) = query.pending {
            conditions.push("pending = ?".to_string());
            params.push(Box::new(pending));
        }

        let where_clause = conditions.join(" AND ");

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM transactions WHERE {}", where_clause),
            params_refs.as_slice(),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM transactions WHERE {} ORDER BY date ASC, id ASC LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS, where_clause
        );
        params.push(Box::new(query.limit));
        params.push(Box::new(query.offset));
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params_refs.as_slice(), row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((transactions, total))
    }

    fn date_range(&self, user_id: i64) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let conn = self.conn()?;
        let (min, max): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(date), MAX(date) FROM transactions WHERE user_id = ?",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let parse = |s: Option<String>| {
            s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
        };
        Ok(parse(min).zip(parse(max)))
    }

    fn user_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM transactions ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}
