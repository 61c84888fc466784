//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use chrono::NaiveDate;
use driftwatch_core::db::Database;
use driftwatch_core::import::generate_hash;
use driftwatch_core::models::{NewTransaction, PeriodType, Severity};
use driftwatch_core::{EngineConfig, Repositories};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::NamedTempFile;

use crate::cli::parse_month;
use crate::commands::{self, truncate, Output};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    date(2024, 5, 10)
}

fn insert(db: &Database, user_id: i64, date: NaiveDate, name: &str, amount: Decimal, category: &str) {
    db.insert_transaction(&NewTransaction {
        user_id,
        date,
        name: name.to_string(),
        merchant_name: None,
        amount,
        category_primary: Some(category.to_string()),
        category_detailed: None,
        pending: false,
        import_hash: generate_hash(user_id, &date, name, amount),
    })
    .unwrap();
}

/// Four months of dining that jumps from $200 to $300 in April, plus payroll
fn seed_user(db: &Database, user_id: i64) {
    for m in 1..=4 {
        let half = if m < 4 { dec!(100) } else { dec!(150) };
        insert(db, user_id, date(2024, m, 1), "ACME PAYROLL", dec!(-2500), "INCOME");
        insert(db, user_id, date(2024, m, 6), "CORNER CAFE", half, "FOOD_AND_DRINK");
        insert(db, user_id, date(2024, m, 20), "THE BISTRO", half, "FOOD_AND_DRINK");
    }
    insert(db, user_id, date(2024, 5, 3), "CORNER CAFE", dec!(60), "FOOD_AND_DRINK");
}

fn csv_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_month_accepts_year_month() {
    assert_eq!(parse_month("2024-06").unwrap(), date(2024, 6, 1));
    assert_eq!(parse_month(" 2024-06-15 ").unwrap(), date(2024, 6, 15));
}

#[test]
fn test_parse_month_rejects_garbage() {
    let err = parse_month("June").unwrap_err();
    assert!(err.contains("YYYY-MM"));
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("FOOD_AND_DRINK", 20), "FOOD_AND_DRINK");
    assert_eq!(truncate("GENERAL_MERCHANDISE", 10), "GENERAL...");
}

#[test]
fn test_last_month_wraps_year() {
    assert_eq!(commands::last_month(date(2024, 1, 15)), date(2023, 12, 1));
    assert_eq!(commands::last_month(today()), date(2024, 4, 1));
}

// ========== Import Command Tests ==========

#[test]
fn test_cmd_import_is_idempotent() {
    let db = setup_test_db();
    let file = csv_file(
        "user_id,date,name,merchant_name,amount,category_primary,category_detailed,pending\n\
         1,2024-03-01,ACME PAYROLL,,-2500.00,INCOME,INCOME_WAGES,false\n\
         1,2024-03-04,CORNER CAFE,Corner Cafe,12.50,food_and_drink,,false\n",
    );

    let first = commands::cmd_import(&db, file.path()).unwrap();
    assert_eq!(first.imported, 2);
    assert_eq!(first.duplicates, 0);

    let second = commands::cmd_import(&db, file.path()).unwrap();
    assert_eq!(second.imported, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(db.count_transactions(1).unwrap(), 2);
}

#[test]
fn test_cmd_import_missing_file() {
    let db = setup_test_db();
    let result = commands::cmd_import(&db, std::path::Path::new("/nonexistent/ledger.csv"));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Failed to import"));
}

#[test]
fn test_cmd_import_streams() {
    let db = setup_test_db();
    let file = csv_file(
        "stream_id,user_id,description,merchant_name,direction,last_amount,is_active\n\
         s-1,1,NETFLIX,Netflix,outflow,15.49,true\n\
         s-2,1,OLD GYM,,outflow,40.00,false\n",
    );

    let count = commands::cmd_import_streams(&db, file.path()).unwrap();
    assert_eq!(count, 2);

    let active = Repositories::sqlite(&db)
        .recurring_streams
        .get_active_by_user_id(1)
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].stream_id, "s-1");
}

// ========== Compute Command Tests ==========

#[test]
fn test_cmd_compute_full() {
    let db = setup_test_db();
    seed_user(&db, 1);
    let config = EngineConfig::default();

    let result = commands::cmd_compute(&db, &config, today(), 1, true, Output::Text).unwrap();
    assert_eq!(result.transactions_processed, 13);
    assert!(result.periods_computed >= 5);
}

#[test]
fn test_cmd_baselines_needs_history() {
    let db = setup_test_db();
    insert(&db, 1, date(2024, 4, 6), "CORNER CAFE", dec!(20), "FOOD_AND_DRINK");
    let config = EngineConfig::default();
    commands::cmd_compute(&db, &config, today(), 1, true, Output::Text).unwrap();

    let result = commands::cmd_baselines(&db, &config, today(), 1, false, Output::Text).unwrap();
    assert_eq!(result.baselines_computed, 0);
    assert!(result.message.unwrap().contains("Insufficient history"));
}

#[test]
fn test_cmd_baselines_lock_and_unlock() {
    let db = setup_test_db();
    seed_user(&db, 1);
    let config = EngineConfig::default();
    commands::cmd_compute(&db, &config, today(), 1, true, Output::Text).unwrap();

    let result = commands::cmd_baselines(&db, &config, today(), 1, false, Output::Json).unwrap();
    assert_eq!(result.baselines_computed, 1);
    assert_eq!(result.baselines[0].baseline_monthly_amount, dec!(200));

    assert_eq!(commands::cmd_baselines_lock(&db, &config, today(), 1, false).unwrap(), 1);
    let repos = Repositories::sqlite(&db);
    assert!(repos.baselines.get_by_user_id(1, true).unwrap().is_empty());

    assert_eq!(commands::cmd_baselines_lock(&db, &config, today(), 1, true).unwrap(), 1);
    assert_eq!(repos.baselines.get_by_user_id(1, true).unwrap().len(), 1);
}

#[test]
fn test_cmd_run_then_creep_and_reports() {
    let db = setup_test_db();
    seed_user(&db, 1);
    let config = EngineConfig::default();

    let pipeline = commands::cmd_run(&db, &config, today(), 1, true, Output::Text).unwrap();
    assert!(!pipeline.partial_failure, "{:?}", pipeline.errors);

    // April: $300 against a $200 baseline
    let creep = commands::cmd_creep(&db, &config, today(), 1, None, Output::Text).unwrap();
    assert_eq!(creep.period_start, date(2024, 4, 1));
    assert_eq!(creep.overall_creep_percentage, dec!(50));
    assert!(creep.overall_severity >= Severity::Medium);

    let summary =
        commands::cmd_report_creep(&db, &config, today(), 1, None, Output::Text).unwrap();
    assert_eq!(summary.top_creeping.len(), 1);
    assert_eq!(summary.top_creeping[0].category, "FOOD_AND_DRINK");

    let spending =
        commands::cmd_report_spending(&db, 1, PeriodType::Monthly, 3, Output::Text).unwrap();
    assert_eq!(spending.len(), 3);
    assert_eq!(spending.last().unwrap().period_start, date(2024, 5, 1));

    let income = commands::cmd_report_income(&db, 1, Output::Text).unwrap();
    assert_eq!(income.len(), 1);

    let cash_flow = commands::cmd_report_cash_flow(&db, today(), 1, 2, Output::Json).unwrap();
    assert_eq!(cash_flow.len(), 2);
    assert_eq!(cash_flow[0].period_start, date(2024, 4, 1));
    assert_eq!(cash_flow[0].total_expenses, dec!(300));
}

#[test]
fn test_cmd_pacing_mid_month() {
    let db = setup_test_db();
    seed_user(&db, 1);
    let config = EngineConfig::default();
    commands::cmd_run(&db, &config, today(), 1, true, Output::Text).unwrap();

    let pacing = commands::cmd_pacing(&db, &config, today(), 1, Output::Text).unwrap();
    assert_eq!(pacing.period_start, date(2024, 5, 1));
    assert_eq!(pacing.days_into_period, 10);
    assert_eq!(pacing.current_amount, dec!(60));
    assert_eq!(pacing.target_amount, dec!(200));
}

#[test]
fn test_cmd_status_and_reset() {
    let db = setup_test_db();
    seed_user(&db, 1);
    let config = EngineConfig::default();
    commands::cmd_run(&db, &config, today(), 1, true, Output::Text).unwrap();
    assert!(commands::cmd_status(&db, 1).is_ok());

    commands::cmd_reset(&db, true).unwrap();

    let repos = Repositories::sqlite(&db);
    assert!(!repos.baselines.has_baselines(1).unwrap());
    assert!(repos
        .spending_periods
        .get_periods_for_user(1, PeriodType::Monthly)
        .unwrap()
        .is_empty());
    assert_eq!(db.count_transactions(1).unwrap(), 13);
}

// ========== Batch Runner Tests ==========

#[tokio::test]
async fn test_run_all_users_runs_each_user_once() {
    let db = setup_test_db();
    for user_id in [3, 1, 2] {
        seed_user(&db, user_id);
    }

    let results = commands::run_all_users(
        db.clone(),
        EngineConfig::default(),
        today(),
        driftwatch_core::RecomputeMode::Full,
    )
    .await
    .unwrap();

    let users: Vec<i64> = results.iter().map(|r| r.user_id).collect();
    assert_eq!(users, vec![1, 2, 3]);
    assert!(results.iter().all(|r| !r.partial_failure));

    // Users are isolated: each gets the same baseline from its own ledger
    let repos = Repositories::sqlite(&db);
    for user_id in 1..=3 {
        let baselines = repos.baselines.get_by_user_id(user_id, false).unwrap();
        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines[0].baseline_monthly_amount, dec!(200));
    }
}

#[tokio::test]
async fn test_run_all_users_empty_ledger() {
    let db = setup_test_db();
    let results = commands::cmd_run_all(db, EngineConfig::default(), today(), false, Output::Text)
        .await
        .unwrap();
    assert!(results.is_empty());
}
