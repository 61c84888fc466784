//! Recurring income detection
//!
//! Deposits are grouped by a normalized payer name. Each group with at least
//! two payments becomes an `IncomeSource` with an inferred frequency and a
//! composite confidence score:
//!
//! | component          | weight | measure                                   |
//! |--------------------|--------|-------------------------------------------|
//! | amount consistency | 0.35   | 1 - mean relative deviation of amounts    |
//! | timing regularity  | 0.35   | same over gaps (0.5 with < 3 payments)    |
//! | source type        | 0.20   | `IncomeSourceType::confidence_weight`     |
//! | payment count      | 0.10   | >=12: 1.0, >=6: 0.8, >=3: 0.6, else 0.4   |

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use crate::config::IncomeConfig;
use crate::error::Result;
use crate::models::{IncomeFrequency, IncomeSource, IncomeSourceType, Transaction};
use crate::money::{clamp, mean, round2, to_f64};
use crate::repository::{Repositories, TransactionQuery};
use crate::transfer::is_internal_transfer;

/// Activity window for sources without a regular interval
const IRREGULAR_ACTIVE_DAYS: i64 = 90;

const SALARY_KEYWORDS: &[&str] = &[
    "PAYROLL", "SALARY", "DIRECT DEP", "DIR DEP", "WAGES", "PAYCHECK", "ADP", "GUSTO",
];
const FREELANCE_KEYWORDS: &[&str] = &[
    "UPWORK", "FIVERR", "STRIPE", "INVOICE", "CONSULTING", "FREELANCE",
];
const INVESTMENT_KEYWORDS: &[&str] = &[
    "DIVIDEND", "INTEREST", "VANGUARD", "FIDELITY", "SCHWAB", "CAPITAL GAIN",
];
const REFUND_KEYWORDS: &[&str] = &["REFUND", "RETURN", "REBATE", "CASHBACK", "REIMBURSEMENT"];
const TRANSFER_KEYWORDS: &[&str] = &["TRANSFER", "ZELLE", "VENMO"];

fn reference_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\s*[0-9A-Z]*\d[0-9A-Z]*").expect("valid regex"))
}

fn trailing_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:[\s:*-]+\d[\d-]*)+\s*$").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Grouping key for a payer: uppercase, reference numbers and trailing IDs removed
pub fn normalize_source_name(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let without_refs = reference_number_re().replace_all(&upper, " ");
    let without_ids = trailing_id_re().replace(&without_refs, "");
    whitespace_re()
        .replace_all(without_ids.trim(), " ")
        .to_string()
}

/// Classify a normalized payer name by keyword
pub fn classify_source_type(normalized: &str) -> IncomeSourceType {
    let has = |keywords: &[&str]| keywords.iter().any(|k| normalized.contains(k));
    if has(SALARY_KEYWORDS) {
        IncomeSourceType::Salary
    } else if has(FREELANCE_KEYWORDS) {
        IncomeSourceType::Freelance
    } else if has(INVESTMENT_KEYWORDS) {
        IncomeSourceType::Investment
    } else if has(REFUND_KEYWORDS) {
        IncomeSourceType::Refund
    } else if has(TRANSFER_KEYWORDS) {
        IncomeSourceType::Transfer
    } else {
        IncomeSourceType::Other
    }
}

/// Whether a deposit description reads like earned or investment income
pub fn has_income_keyword(name: &str) -> bool {
    matches!(
        classify_source_type(&normalize_source_name(name)),
        IncomeSourceType::Salary | IncomeSourceType::Freelance | IncomeSourceType::Investment
    )
}

fn count_tier(count: usize) -> Decimal {
    match count {
        n if n >= 12 => dec!(1.0),
        n if n >= 6 => dec!(0.8),
        n if n >= 3 => dec!(0.6),
        _ => dec!(0.4),
    }
}

/// 1 - mean absolute deviation relative to the average, clamped to [0, 1]
fn consistency(values: &[Decimal]) -> Decimal {
    let avg = mean(values);
    if avg.is_zero() {
        return Decimal::ZERO;
    }
    let deviations: Vec<Decimal> = values.iter().map(|v| (*v - avg).abs()).collect();
    clamp(
        Decimal::ONE - mean(&deviations) / avg.abs(),
        Decimal::ZERO,
        Decimal::ONE,
    )
}

fn timing_regularity(dates: &[NaiveDate]) -> Decimal {
    if dates.len() < 3 {
        // too few gaps to judge
        return dec!(0.5);
    }
    let gaps: Vec<Decimal> = dates
        .windows(2)
        .map(|w| Decimal::from((w[1] - w[0]).num_days()))
        .collect();
    consistency(&gaps)
}

fn mean_interval_days(dates: &[NaiveDate]) -> f64 {
    match (dates.first(), dates.last()) {
        (Some(first), Some(last)) if dates.len() > 1 => {
            (*last - *first).num_days() as f64 / (dates.len() - 1) as f64
        }
        _ => 0.0,
    }
}

/// Composite confidence in [0, 1], rounded half-up to 2 places
pub fn confidence_score(
    amounts: &[Decimal],
    dates: &[NaiveDate],
    source_type: IncomeSourceType,
) -> f64 {
    let score = dec!(0.35) * consistency(amounts)
        + dec!(0.35) * timing_regularity(dates)
        + dec!(0.20) * source_type.confidence_weight()
        + dec!(0.10) * count_tier(amounts.len());
    to_f64(round2(clamp(score, Decimal::ZERO, Decimal::ONE)))
}

pub struct IncomeDetector<'a> {
    repos: Repositories<'a>,
    config: &'a IncomeConfig,
    page_size: i64,
    today: NaiveDate,
}

impl<'a> IncomeDetector<'a> {
    pub fn new(
        repos: Repositories<'a>,
        config: &'a IncomeConfig,
        page_size: i64,
        today: NaiveDate,
    ) -> Self {
        Self {
            repos,
            config,
            page_size,
            today,
        }
    }

    /// Scan the user's settled ledger for recurring income
    pub fn detect(&self, user_id: i64) -> Result<Vec<IncomeSource>> {
        let query = TransactionQuery {
            pending: Some(false),
            ..Default::default()
        };
        let transactions = self
            .repos
            .all_transactions(user_id, query, self.page_size)?;
        Ok(self.detect_from_transactions(user_id, &transactions))
    }

    /// Detect and upsert income sources, returning what was stored
    pub fn detect_and_persist(&self, user_id: i64) -> Result<Vec<IncomeSource>> {
        let sources = self.detect(user_id)?;
        let stored = self.repos.income_sources.upsert_from_detection(&sources)?;
        info!(user_id, sources = stored, "Detected income sources");
        Ok(sources)
    }

    /// Group candidate deposits and score each group
    ///
    /// Sorted by confidence descending, then source name.
    pub fn detect_from_transactions(
        &self,
        user_id: i64,
        transactions: &[Transaction],
    ) -> Vec<IncomeSource> {
        let mut groups: BTreeMap<String, Vec<&Transaction>> = BTreeMap::new();
        for txn in transactions {
            if txn.pending || !txn.is_inflow() || is_internal_transfer(txn) {
                continue;
            }
            if txn.amount.abs() < self.config.min_amount {
                continue;
            }
            let key = normalize_source_name(txn.display_merchant());
            if key.is_empty() {
                continue;
            }
            groups.entry(key).or_default().push(txn);
        }

        let mut sources: Vec<IncomeSource> = groups
            .into_iter()
            .filter(|(_, txns)| txns.len() >= 2)
            .filter_map(|(name, mut txns)| {
                txns.sort_by_key(|t| (t.date, t.id));
                self.build_source(user_id, name, &txns)
            })
            .collect();

        sources.sort_by(|a, b| {
            b.confidence_score
                .total_cmp(&a.confidence_score)
                .then_with(|| a.source_name.cmp(&b.source_name))
        });
        debug!(user_id, sources = sources.len(), "Income grouping complete");
        sources
    }

    fn build_source(
        &self,
        user_id: i64,
        source_name: String,
        txns: &[&Transaction],
    ) -> Option<IncomeSource> {
        let first = txns.first()?;
        let last = txns.last()?;

        let amounts: Vec<Decimal> = txns.iter().map(|t| t.amount.abs()).collect();
        let dates: Vec<NaiveDate> = txns.iter().map(|t| t.date).collect();

        let frequency = IncomeFrequency::from_mean_interval(mean_interval_days(&dates));
        let source_type = classify_source_type(&source_name);
        let next_expected_date = frequency
            .interval_days()
            .map(|days| last.date + Duration::days(days));
        let active_window = frequency
            .interval_days()
            .map(|days| days * 2)
            .unwrap_or(IRREGULAR_ACTIVE_DAYS);

        Some(IncomeSource {
            user_id,
            display_name: last.display_merchant().to_string(),
            source_type,
            average_amount: round2(mean(&amounts)),
            last_amount: round2(last.amount.abs()),
            frequency,
            first_date: first.date,
            last_date: last.date,
            next_expected_date,
            transaction_count: txns.len() as i64,
            confidence_score: confidence_score(&amounts, &dates, source_type),
            is_active: (self.today - last.date).num_days() <= active_window,
            source_name,
        })
    }

    /// Whether a source is trusted enough to count its deposits as income
    pub fn is_high_confidence(&self, source: &IncomeSource) -> bool {
        source.confidence_score >= self.config.high_confidence_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use rust_decimal_macros::dec;

    fn deposit(id: i64, date: (i32, u32, u32), name: &str, amount: Decimal) -> Transaction {
        Transaction {
            id,
            user_id: 1,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            name: name.to_string(),
            merchant_name: None,
            amount,
            category_primary: Some("INCOME".to_string()),
            category_detailed: None,
            pending: false,
        }
    }

    fn detector<'a>(db: &'a Database, config: &'a IncomeConfig) -> IncomeDetector<'a> {
        IncomeDetector::new(
            Repositories::sqlite(db),
            config,
            500,
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        )
    }

    #[test]
    fn test_normalize_source_name() {
        assert_eq!(normalize_source_name("Acme Corp Payroll #88213"), "ACME CORP PAYROLL");
        assert_eq!(normalize_source_name("ACME CORP   PAYROLL 000123"), "ACME CORP PAYROLL");
        assert_eq!(normalize_source_name("  gusto  pay  "), "GUSTO PAY");
        assert_eq!(normalize_source_name("VANGUARD DIVIDEND"), "VANGUARD DIVIDEND");
    }

    #[test]
    fn test_classify_source_type() {
        assert_eq!(classify_source_type("ACME PAYROLL"), IncomeSourceType::Salary);
        assert_eq!(classify_source_type("UPWORK ESCROW"), IncomeSourceType::Freelance);
        assert_eq!(classify_source_type("SCHWAB BROKERAGE"), IncomeSourceType::Investment);
        assert_eq!(classify_source_type("AMAZON REFUND"), IncomeSourceType::Refund);
        assert_eq!(classify_source_type("ZELLE FROM MOM"), IncomeSourceType::Transfer);
        assert_eq!(classify_source_type("SOMEONE"), IncomeSourceType::Other);
        assert!(has_income_keyword("Direct Dep ACME 1234"));
        assert!(!has_income_keyword("Venmo cashout"));
    }

    #[test]
    fn test_monthly_salary_is_high_confidence() {
        let db = Database::in_memory().unwrap();
        let config = IncomeConfig::default();
        let det = detector(&db, &config);

        let txns: Vec<Transaction> = (1..=6)
            .map(|m| deposit(m as i64, (2024, m, 15), "ACME PAYROLL #1", dec!(-3000)))
            .collect();
        let sources = det.detect_from_transactions(1, &txns);
        assert_eq!(sources.len(), 1);

        let salary = &sources[0];
        assert_eq!(salary.source_name, "ACME PAYROLL");
        assert_eq!(salary.source_type, IncomeSourceType::Salary);
        assert_eq!(salary.frequency, IncomeFrequency::Monthly);
        assert_eq!(salary.average_amount, dec!(3000));
        assert_eq!(salary.transaction_count, 6);
        assert_eq!(salary.next_expected_date, NaiveDate::from_ymd_opt(2024, 7, 15));
        assert!(salary.is_active);
        assert!(det.is_high_confidence(salary));
        assert!(salary.confidence_score <= 1.0);
    }

    #[test]
    fn test_two_payments_use_neutral_timing() {
        let txns = vec![
            deposit(1, (2024, 1, 5), "CLIENT X", dec!(-500)),
            deposit(2, (2024, 2, 5), "CLIENT X", dec!(-500)),
        ];
        let config = IncomeConfig::default();
        let db = Database::in_memory().unwrap();
        let sources = detector(&db, &config).detect_from_transactions(1, &txns);

        // 0.35 * 1.0 + 0.35 * 0.5 + 0.20 * 0.5 + 0.10 * 0.4
        assert_eq!(sources[0].confidence_score, 0.67);
        assert_eq!(sources[0].source_type, IncomeSourceType::Other);
    }

    #[test]
    fn test_candidates_filtered() {
        let mut pending = deposit(3, (2024, 3, 1), "ACME PAYROLL", dec!(-3000));
        pending.pending = true;
        let mut transfer = deposit(4, (2024, 3, 2), "FROM SAVINGS", dec!(-1000));
        transfer.category_primary = Some("TRANSFER_IN".to_string());
        let mut transfer2 = transfer.clone();
        transfer2.id = 5;

        let txns = vec![
            deposit(1, (2024, 1, 1), "ACME PAYROLL", dec!(-3000)),
            pending,
            transfer,
            transfer2,
            deposit(6, (2024, 1, 3), "TINY REBATE", dec!(-5)),
            deposit(7, (2024, 2, 3), "TINY REBATE", dec!(-5)),
            deposit(8, (2024, 2, 3), "COFFEE", dec!(4.50)),
        ];
        let config = IncomeConfig::default();
        let db = Database::in_memory().unwrap();
        let sources = detector(&db, &config).detect_from_transactions(1, &txns);
        // Single payroll deposit remains after filtering, so no source qualifies
        assert!(sources.is_empty());
    }

    #[test]
    fn test_stale_source_inactive_and_irregular() {
        let txns = vec![
            deposit(1, (2022, 1, 10), "ODD JOBS", dec!(-200)),
            deposit(2, (2023, 6, 10), "ODD JOBS", dec!(-250)),
        ];
        let config = IncomeConfig::default();
        let db = Database::in_memory().unwrap();
        let sources = detector(&db, &config).detect_from_transactions(1, &txns);
        assert_eq!(sources[0].frequency, IncomeFrequency::Irregular);
        assert_eq!(sources[0].next_expected_date, None);
        assert!(!sources[0].is_active);
    }

    #[test]
    fn test_consistency_uses_mean_relative_deviation() {
        // mean |x - 137.5| = 56.25
        let amounts = [dec!(100), dec!(100), dec!(100), dec!(250)];
        assert_eq!(round2(consistency(&amounts)), dec!(0.59));

        // gaps 31, 29, 31 days; 0.35 * 0.591 + 0.35 * 0.971 + 0.20 * 1.0 + 0.10 * 0.6
        let dates = [
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        ];
        let score = confidence_score(&amounts, &dates, IncomeSourceType::Salary);
        assert_eq!(score, 0.81);
        assert!(score >= IncomeConfig::default().high_confidence_threshold);
    }

    #[test]
    fn test_confidence_bounded() {
        let wild = [dec!(50), dec!(5000), dec!(75)];
        let dates = [
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
        ];
        for source_type in [IncomeSourceType::Salary, IncomeSourceType::Refund] {
            let score = confidence_score(&wild, &dates, source_type);
            assert!((0.0..=1.0).contains(&score));
        }
    }
}
