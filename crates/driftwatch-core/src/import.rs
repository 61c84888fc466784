//! CSV ledger import
//!
//! Transactions file:
//! `user_id,date,name,merchant_name,amount,category_primary,category_detailed,pending`
//! with amounts in ledger sign convention (negative = money in).
//!
//! Recurring streams file:
//! `stream_id,user_id,description,merchant_name,direction,last_amount,is_active`
//!
//! Columns are matched by header name, so order doesn't matter. Every
//! transaction gets a SHA-256 import hash over user, date, name and amount;
//! re-importing the same file is a no-op.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::db::{Database, TransactionInsertResult};
use crate::error::{Error, Result};
use crate::models::{FlowDirection, NewTransaction, RecurringStream};
use crate::repository::RecurringStreamRepository;

const TRANSACTION_COLUMNS: &[&str] = &[
    "user_id",
    "date",
    "name",
    "merchant_name",
    "amount",
    "category_primary",
    "category_detailed",
    "pending",
];

const STREAM_COLUMNS: &[&str] = &[
    "stream_id",
    "user_id",
    "description",
    "merchant_name",
    "direction",
    "last_amount",
    "is_active",
];

/// Counts from one import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub rows: usize,
    pub imported: usize,
    pub duplicates: usize,
}

/// Column positions resolved from the header row
struct Columns {
    positions: Vec<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord, expected: &[&str]) -> Result<Self> {
        let positions = expected
            .iter()
            .map(|name| {
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(name))
                    .ok_or_else(|| Error::Import(format!("Missing column: {}", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { positions })
    }

    /// Trimmed value of the `index`th expected column
    fn get<'r>(&self, record: &'r StringRecord, index: usize) -> &'r str {
        self.positions
            .get(index)
            .and_then(|p| record.get(*p))
            .map(str::trim)
            .unwrap_or("")
    }

    /// Like `get`, but empty values become `None`
    fn optional(&self, record: &StringRecord, index: usize) -> Option<String> {
        Some(self.get(record, index))
            .filter(|s| !s.is_empty())
            .map(String::from)
    }
}

/// Deduplication hash for a ledger row
pub fn generate_hash(user_id: i64, date: &NaiveDate, name: &str, amount: Decimal) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_be_bytes());
    hasher.update(date.to_string().as_bytes());
    hasher.update(name.as_bytes());
    // normalize so "12.50" and "12.5" hash alike
    hasher.update(amount.normalize().to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Parse a transactions CSV
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<NewTransaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = Columns::resolve(rdr.headers()?, TRANSACTION_COLUMNS)?;
    let mut transactions = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let row = line + 2;

        let user_id = parse_user_id(columns.get(&record, 0), row)?;
        let date = parse_date(columns.get(&record, 1))?;
        let name = columns.get(&record, 2).to_string();
        if name.is_empty() {
            return Err(Error::Import(format!("Row {}: missing name", row)));
        }
        let amount = parse_amount(columns.get(&record, 4))?;

        transactions.push(NewTransaction {
            import_hash: generate_hash(user_id, &date, &name, amount),
            user_id,
            date,
            name,
            merchant_name: columns.optional(&record, 3),
            amount,
            category_primary: columns.optional(&record, 5).map(|c| c.to_uppercase()),
            category_detailed: columns.optional(&record, 6).map(|c| c.to_uppercase()),
            pending: parse_bool(columns.get(&record, 7))?,
        });
    }

    debug!("Parsed {} transactions", transactions.len());
    Ok(transactions)
}

/// Parse a recurring streams CSV
pub fn parse_recurring_streams<R: Read>(reader: R) -> Result<Vec<RecurringStream>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = Columns::resolve(rdr.headers()?, STREAM_COLUMNS)?;
    let mut streams = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let row = line + 2;

        let stream_id = columns.get(&record, 0).to_string();
        if stream_id.is_empty() {
            return Err(Error::Import(format!("Row {}: missing stream_id", row)));
        }
        let direction = FlowDirection::from_str(columns.get(&record, 4))
            .map_err(|e| Error::Import(format!("Row {}: {}", row, e)))?;

        streams.push(RecurringStream {
            stream_id,
            user_id: parse_user_id(columns.get(&record, 1), row)?,
            description: columns.get(&record, 2).to_string(),
            merchant_name: columns.optional(&record, 3),
            direction,
            last_amount: parse_amount(columns.get(&record, 5))?,
            is_active: parse_bool(columns.get(&record, 6))?,
        });
    }

    debug!("Parsed {} recurring streams", streams.len());
    Ok(streams)
}

/// Insert parsed transactions, skipping ones already imported
pub fn import_transactions(db: &Database, transactions: &[NewTransaction]) -> Result<ImportResult> {
    let mut result = ImportResult {
        rows: transactions.len(),
        ..Default::default()
    };
    for txn in transactions {
        match db.insert_transaction(txn)? {
            TransactionInsertResult::Inserted(_) => result.imported += 1,
            TransactionInsertResult::Duplicate(_) => result.duplicates += 1,
        }
    }
    info!(
        rows = result.rows,
        imported = result.imported,
        duplicates = result.duplicates,
        "Imported transactions"
    );
    Ok(result)
}

/// Parse and import a transactions CSV file
pub fn import_csv_file(db: &Database, path: &Path) -> Result<ImportResult> {
    let file = File::open(path)?;
    let transactions = parse_csv(file)?;
    import_transactions(db, &transactions)
}

/// Parse a recurring streams CSV file and upsert every stream
pub fn import_recurring_streams_file(
    repo: &dyn RecurringStreamRepository,
    path: &Path,
) -> Result<usize> {
    let streams = parse_recurring_streams(File::open(path)?)?;
    for stream in &streams {
        repo.upsert(stream)?;
    }
    info!(streams = streams.len(), "Imported recurring streams");
    Ok(streams.len())
}

fn parse_user_id(s: &str, row: usize) -> Result<i64> {
    s.parse::<i64>()
        .map_err(|_| Error::Import(format!("Row {}: invalid user_id: {}", row, s)))
}

/// Parse a date in one of the common export formats
fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%m/%d/%Y", // 01/15/2024
        "%m/%d/%y", // 01/15/24
        "%m-%d-%Y", // 01-15-2024
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(Error::Import(format!("Unable to parse date: {}", s)))
}

/// Parse an amount string, handling currency symbols and commas
fn parse_amount(s: &str) -> Result<Decimal> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    Decimal::from_str(&cleaned).map_err(|_| Error::Import(format!("Unable to parse amount: {}", s)))
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "" | "false" | "f" | "0" | "no" | "n" => Ok(false),
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        other => Err(Error::Import(format!("Unable to parse boolean: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Repositories, TransactionQuery};
    use rust_decimal_macros::dec;
    use std::io::Write;

    const SAMPLE: &str = "\
user_id,date,name,merchant_name,amount,category_primary,category_detailed,pending
1,2024-01-15,SQ *BLUE BOTTLE,Blue Bottle,5.50,food_and_drink,FOOD_AND_DRINK_COFFEE,false
1,01/16/2024,ACME PAYROLL,,\"-3,000.00\",INCOME,,
2,2024-01-17,Transfer to savings,,200,TRANSFER_OUT,,true
";

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("01/15/2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert_eq!(
            parse_date("2024-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
        assert!(parse_date("15th Jan").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_amount("-123.45").unwrap(), dec!(-123.45));
        assert_eq!(parse_amount("(100.00)").unwrap(), dec!(-100.00));
        assert!(parse_amount("ten").is_err());
    }

    #[test]
    fn test_parse_csv() {
        let transactions = parse_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(transactions.len(), 3);

        let coffee = &transactions[0];
        assert_eq!(coffee.merchant_name.as_deref(), Some("Blue Bottle"));
        assert_eq!(coffee.amount, dec!(5.50));
        assert_eq!(coffee.category_primary.as_deref(), Some("FOOD_AND_DRINK"));
        assert!(!coffee.pending);

        let pay = &transactions[1];
        assert_eq!(pay.amount, dec!(-3000));
        assert_eq!(pay.merchant_name, None);
        assert_eq!(pay.category_detailed, None);

        assert!(transactions[2].pending);
        assert_eq!(transactions[2].user_id, 2);
    }

    #[test]
    fn test_missing_column_rejected() {
        let csv = "user_id,date,name,amount\n1,2024-01-01,X,5\n";
        let err = parse_csv(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("merchant_name"));
    }

    #[test]
    fn test_hash_ignores_amount_formatting() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            generate_hash(1, &date, "CAFE", dec!(12.50)),
            generate_hash(1, &date, "CAFE", dec!(12.5))
        );
        assert_ne!(
            generate_hash(1, &date, "CAFE", dec!(12.50)),
            generate_hash(2, &date, "CAFE", dec!(12.50))
        );
    }

    #[test]
    fn test_import_file_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let first = import_csv_file(&db, file.path()).unwrap();
        assert_eq!(first.rows, 3);
        assert_eq!(first.imported, 3);

        let second = import_csv_file(&db, file.path()).unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.duplicates, 3);

        let (txns, total) = Repositories::sqlite(&db)
            .transactions
            .get_by_user(
                1,
                TransactionQuery {
                    limit: 10,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(txns[0].name, "SQ *BLUE BOTTLE");
    }

    #[test]
    fn test_import_recurring_streams() {
        let db = Database::in_memory().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"stream_id,user_id,description,merchant_name,direction,last_amount,is_active\n\
              s1,1,NETFLIX,Netflix,outflow,15.49,true\n\
              s2,1,GYM,,outflow,40,false\n",
        )
        .unwrap();

        let repos = Repositories::sqlite(&db);
        let count = import_recurring_streams_file(repos.recurring_streams, file.path()).unwrap();
        assert_eq!(count, 2);

        let active = repos.recurring_streams.get_active_by_user_id(1).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].last_amount, dec!(15.49));
    }

    #[test]
    fn test_bad_direction_reports_row() {
        let csv = "stream_id,user_id,description,merchant_name,direction,last_amount,is_active\n\
                   s1,1,X,,sideways,1,true\n";
        let err = parse_recurring_streams(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Row 2"));
    }
}
