//! Integration tests for driftwatch-core
//!
//! These tests exercise the full import → compute → baseline → score workflow.

use chrono::NaiveDate;
use driftwatch_core::{
    db::Database,
    import::{import_transactions, parse_csv},
    models::{ComputationStatus, ComputationType, LogStatus, PeriodType, Severity, TrendDirection},
    period::period_bounds,
    AnalyticsPipeline, BaselineCalculator, ComputationManager, CreepScorer, EngineConfig,
    RecomputeMode, Repositories,
};
use rust_decimal_macros::dec;

/// Six months of one user's ledger:
/// - FOOD_AND_DRINK at $400/month for Jan-Mar, then $500/month for Apr-Jun
/// - A $3,000 monthly paycheck
/// - Rent, which is not discretionary
/// - A transfer to savings that should be ignored everywhere
fn ledger_csv() -> String {
    let mut csv = String::from(
        "user_id,date,name,merchant_name,amount,category_primary,category_detailed,pending\n",
    );
    for month in 1..=6 {
        let half = if month <= 3 { "200.00" } else { "250.00" };
        csv.push_str(&format!(
            "1,2024-{:02}-01,ACME CORP PAYROLL,,-3000.00,INCOME,INCOME_WAGES,false\n",
            month
        ));
        csv.push_str(&format!(
            "1,2024-{:02}-02,LANDLORD LLC,,1500.00,RENT_AND_UTILITIES,RENT_AND_UTILITIES_RENT,false\n",
            month
        ));
        csv.push_str(&format!(
            "1,2024-{:02}-05,WHOLE FOODS #102,Whole Foods,{},FOOD_AND_DRINK,FOOD_AND_DRINK_GROCERIES,false\n",
            month, half
        ));
        csv.push_str(&format!(
            "1,2024-{:02}-19,THE BISTRO,,{},FOOD_AND_DRINK,FOOD_AND_DRINK_RESTAURANT,false\n",
            month, half
        ));
        csv.push_str(&format!(
            "1,2024-{:02}-25,Transfer to savings,,500.00,TRANSFER_OUT,TRANSFER_OUT_ACCOUNT_TRANSFER,false\n",
            month
        ));
    }
    csv
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 10).unwrap()
}

fn month(m: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, m, 1).unwrap()
}

fn seeded_db() -> Database {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let transactions = parse_csv(ledger_csv().as_bytes()).expect("Failed to parse CSV");
    assert_eq!(transactions.len(), 30);
    let result = import_transactions(&db, &transactions).expect("Failed to import");
    assert_eq!(result.imported, 30);
    db
}

// =============================================================================
// End-to-end creep detection
// =============================================================================

#[test]
fn test_food_creep_end_to_end() {
    let db = seeded_db();
    let config = EngineConfig::default();
    let repos = Repositories::sqlite(&db);

    let result = AnalyticsPipeline::new(repos, &config, today()).run(1, RecomputeMode::Full);
    assert!(!result.partial_failure, "{:?}", result.errors);

    // Baselines come from the first three finalized months
    let baselines = result.baselines.as_ref().expect("baselines should be computed");
    assert_eq!(baselines.status, ComputationStatus::Success);
    assert_eq!(baselines.baselines.len(), 1);
    let food = &baselines.baselines[0];
    assert_eq!(food.category, "FOOD_AND_DRINK");
    assert_eq!(food.baseline_monthly_amount, dec!(400.00));
    assert_eq!(food.baseline_start, month(1));
    assert_eq!(food.baseline_end, NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    assert!(food.is_locked);

    // June is the last finalized month
    let june = &result.creep[0];
    assert_eq!(june.period_start, month(6));
    let score = june
        .scores
        .iter()
        .find(|s| s.category == "FOOD_AND_DRINK")
        .expect("food should be scored");
    assert_eq!(score.baseline_amount, dec!(400.00));
    assert_eq!(score.current_amount, dec!(500.00));
    assert_eq!(score.percentage_change, dec!(25.00));
    assert_eq!(score.creep_score, dec!(2.50));
    assert!(matches!(score.severity, Severity::Low | Severity::Medium));
    assert_eq!(score.trend_direction, TrendDirection::SustainedIncrease);
    assert_eq!(score.consecutive_months_elevated, 3);

    // Income is flat, so nothing is explained away by raises
    assert_eq!(june.income_growth_percentage, Some(dec!(0)));
    assert_eq!(june.income_adjusted_creep_percentage, june.overall_creep_percentage);

    // Nothing spent yet in July
    let july = &result.creep[1];
    assert_eq!(july.period_start, month(7));
    assert_eq!(july.scores[0].current_amount, dec!(0));
    assert_eq!(july.overall_severity, Severity::None);
}

#[test]
fn test_cash_flow_ignores_transfers() {
    let db = seeded_db();
    let config = EngineConfig::default();
    let repos = Repositories::sqlite(&db);
    AnalyticsPipeline::new(repos, &config, today()).run(1, RecomputeMode::Full);

    let may = repos
        .cash_flow
        .get_by_user_and_period(1, month(5))
        .unwrap()
        .expect("May cash flow should exist");
    assert_eq!(may.total_income, dec!(3000));
    assert_eq!(may.total_expenses, dec!(2000));
    assert_eq!(may.savings_rate, Some(dec!(0.3333)));
    assert_eq!(may.transfers_excluded, 1);
    assert_eq!(may.largest_expense_category.as_deref(), Some("RENT_AND_UTILITIES"));

    let sources = repos.income_sources.get_by_user_id(1).unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].source_name, "ACME CORP PAYROLL");
    assert!(sources[0].confidence_score >= config.income.high_confidence_threshold);
}

#[test]
fn test_spending_rollups_exclude_transfers_from_adjusted_totals() {
    let db = seeded_db();
    let config = EngineConfig::default();
    let repos = Repositories::sqlite(&db);
    ComputationManager::new(repos, &config, today())
        .compute_full(1)
        .unwrap();

    let april = repos
        .spending_periods
        .get_by_user_and_period(1, PeriodType::Monthly, month(4))
        .unwrap()
        .unwrap();
    assert_eq!(april.total_outflow, dec!(2500));
    assert_eq!(april.total_outflow_excluding_transfers, dec!(2000));
    assert_eq!(april.net_flow_excluding_transfers, dec!(1000));
    assert!(april.is_finalized);

    let merchants = repos
        .merchant_spending
        .get_by_user_and_period(1, PeriodType::Monthly, month(4))
        .unwrap();
    assert!(merchants.iter().any(|m| m.merchant_name == "Whole Foods"));

    let log = repos
        .computation_log
        .get(1, ComputationType::SpendingFull)
        .unwrap()
        .unwrap();
    assert_eq!(log.status, LogStatus::Success);
    assert_eq!(log.counts.transactions, 30);
}

// =============================================================================
// Idempotence
// =============================================================================

#[test]
fn test_full_pipeline_is_idempotent() {
    let db = seeded_db();
    let config = EngineConfig::default();
    let repos = Repositories::sqlite(&db);
    let pipeline = AnalyticsPipeline::new(repos, &config, today());

    pipeline.run(1, RecomputeMode::Full);
    let periods_first = repos
        .spending_periods
        .get_periods_for_user(1, PeriodType::Monthly)
        .unwrap();
    let scores_first = repos.creep_scores.get_by_user_and_period(1, month(6)).unwrap();
    let cash_first = repos
        .cash_flow
        .get_periods_in_range(1, month(1), month(7))
        .unwrap();

    let second = pipeline.run(1, RecomputeMode::Full);
    assert!(!second.partial_failure);
    // Locked baselines are not recomputed
    assert!(second.baselines.is_none());

    assert_eq!(
        repos
            .spending_periods
            .get_periods_for_user(1, PeriodType::Monthly)
            .unwrap(),
        periods_first
    );
    assert_eq!(
        repos.creep_scores.get_by_user_and_period(1, month(6)).unwrap(),
        scores_first
    );
    assert_eq!(
        repos
            .cash_flow
            .get_periods_in_range(1, month(1), month(7))
            .unwrap(),
        cash_first
    );
}

#[test]
fn test_reimport_is_noop() {
    let db = seeded_db();
    let transactions = parse_csv(ledger_csv().as_bytes()).unwrap();
    let again = import_transactions(&db, &transactions).unwrap();
    assert_eq!(again.imported, 0);
    assert_eq!(again.duplicates, 30);
    assert_eq!(db.count_transactions(1).unwrap(), 30);
}

// =============================================================================
// Baseline locking and summaries
// =============================================================================

#[test]
fn test_forced_baseline_recompute_after_more_history() {
    let db = seeded_db();
    let config = EngineConfig::default();
    let repos = Repositories::sqlite(&db);
    AnalyticsPipeline::new(repos, &config, today()).run(1, RecomputeMode::Full);

    let calculator = BaselineCalculator::new(repos, &config.baseline, today());
    let skipped = calculator.compute_baselines(1, false).unwrap();
    assert_eq!(skipped.baselines_computed, 0);
    assert!(skipped.message.is_some());

    let forced = calculator.compute_baselines(1, true).unwrap();
    assert_eq!(forced.baselines_computed, 1);
    // Window is still the earliest three finalized months
    assert_eq!(forced.baselines[0].baseline_monthly_amount, dec!(400));
}

#[test]
fn test_summary_after_pipeline() {
    let db = seeded_db();
    let config = EngineConfig::default();
    let repos = Repositories::sqlite(&db);
    AnalyticsPipeline::new(repos, &config, today()).run(1, RecomputeMode::Full);

    let summary = CreepScorer::new(repos, &config, today())
        .get_summary(1, month(6))
        .unwrap();
    assert_eq!(summary.categories_scored, 1);
    assert_eq!(summary.total_baseline, dec!(400));
    assert_eq!(summary.total_current, dec!(500));
    assert_eq!(summary.overall_creep_percentage, dec!(25));
    assert_eq!(summary.top_creeping.len(), 1);
    // History is newest first and includes the July score
    let history = &summary.history["FOOD_AND_DRINK"];
    assert_eq!(history[0].period_start, month(7));
    assert!(history.iter().any(|s| s.period_start == month(6)));
}

// =============================================================================
// Period arithmetic
// =============================================================================

#[test]
fn test_period_bounds_leap_years() {
    assert_eq!(
        period_bounds(NaiveDate::from_ymd_opt(2024, 2, 15).unwrap(), PeriodType::Monthly),
        (month(2), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
    );
    assert_eq!(
        period_bounds(NaiveDate::from_ymd_opt(2023, 2, 15).unwrap(), PeriodType::Monthly),
        (
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        )
    );
}
