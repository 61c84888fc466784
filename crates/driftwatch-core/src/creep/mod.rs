//! Lifestyle creep scoring
//!
//! Compares a month's discretionary spend against the user's baselines,
//! classifies each category's drift, and rolls the categories up into an
//! overall creep percentage, optionally discounted by income growth.
//!
//! - `scoring` - pure per-category arithmetic
//! - `pacing` - live-month pacing and stability view

pub mod pacing;
pub mod scoring;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

pub use pacing::{CategoryPacing, PacingMode, PacingResponse, PacingStatus};
pub use scoring::{aggregate_severity, overall_percentage, percentage_change, score_category};

use crate::aggregator::aggregate;
use crate::categories::is_discretionary_code;
use crate::computation::{run_logged, LoggedResult};
use crate::config::EngineConfig;
use crate::error::{elapsed_ms, ComputationError, Result, GENERIC_FAILURE_MESSAGE};
use crate::models::{
    ComputationCounts, ComputationStatus, ComputationType, LifestyleBaseline, LifestyleCreepScore,
    PeriodType, Severity,
};
use crate::money::{mean, round2};
use crate::period;
use crate::repository::{Repositories, TransactionQuery};

/// Categories listed as top creepers in a summary
const TOP_CREEPING: usize = 3;

/// Outcome of scoring one month
#[derive(Debug, Clone, Serialize)]
pub struct LifestyleCreepComputationResult {
    pub user_id: i64,
    pub status: ComputationStatus,
    pub period_start: NaiveDate,
    pub categories_scored: usize,
    pub overall_creep_percentage: Decimal,
    pub overall_severity: Severity,
    pub baseline_income: Option<Decimal>,
    pub current_income: Option<Decimal>,
    pub income_growth_percentage: Option<Decimal>,
    /// Overall creep less income growth, floored at zero
    pub income_adjusted_creep_percentage: Decimal,
    pub scores: Vec<LifestyleCreepScore>,
    pub message: Option<String>,
    pub computation_time_ms: i64,
    pub error_message: Option<String>,
}

impl LifestyleCreepComputationResult {
    fn empty(user_id: i64, period_start: NaiveDate) -> Self {
        Self {
            user_id,
            status: ComputationStatus::Success,
            period_start,
            categories_scored: 0,
            overall_creep_percentage: Decimal::ZERO,
            overall_severity: Severity::None,
            baseline_income: None,
            current_income: None,
            income_growth_percentage: None,
            income_adjusted_creep_percentage: Decimal::ZERO,
            scores: Vec::new(),
            message: None,
            computation_time_ms: 0,
            error_message: None,
        }
    }
}

impl LifestyleCreepComputationResult {
    /// FAILED record for the month that was requested
    pub fn failed(user_id: i64, period_start: NaiveDate, elapsed_ms: i64) -> Self {
        Self {
            status: ComputationStatus::Failed,
            computation_time_ms: elapsed_ms,
            error_message: Some(GENERIC_FAILURE_MESSAGE.to_string()),
            ..Self::empty(user_id, period_start)
        }
    }
}

impl LoggedResult for LifestyleCreepComputationResult {
    fn counts(&self) -> ComputationCounts {
        ComputationCounts {
            periods: i64::from(self.categories_scored > 0),
            categories: self.categories_scored as i64,
            ..Default::default()
        }
    }

    fn computation_time_ms(&self) -> i64 {
        self.computation_time_ms
    }
}

/// Persisted scores for one month, rolled up for display
#[derive(Debug, Clone, Serialize)]
pub struct LifestyleCreepSummary {
    pub user_id: i64,
    pub period_start: NaiveDate,
    pub total_baseline: Decimal,
    pub total_current: Decimal,
    pub total_change: Decimal,
    pub overall_creep_percentage: Decimal,
    pub overall_severity: Severity,
    pub categories_scored: usize,
    pub categories_creeping: usize,
    /// Highest creep scores first
    pub top_creeping: Vec<LifestyleCreepScore>,
    /// Recent scores per top category, newest first
    pub history: BTreeMap<String, Vec<LifestyleCreepScore>>,
}

pub struct CreepScorer<'a> {
    repos: Repositories<'a>,
    config: &'a EngineConfig,
    today: NaiveDate,
}

impl<'a> CreepScorer<'a> {
    pub fn new(repos: Repositories<'a>, config: &'a EngineConfig, today: NaiveDate) -> Self {
        Self {
            repos,
            config,
            today,
        }
    }

    /// Score every baseline or currently-spent discretionary category for a month
    ///
    /// Scores for the month are replaced wholesale.
    pub fn compute_for_period(
        &self,
        user_id: i64,
        period_start: NaiveDate,
    ) -> std::result::Result<LifestyleCreepComputationResult, ComputationError> {
        let month = period::period_start(period_start, PeriodType::Monthly);
        run_logged(
            self.repos.computation_log,
            user_id,
            ComputationType::LifestyleCreep,
            |started| self.compute_inner(user_id, month, started),
        )
    }

    fn compute_inner(
        &self,
        user_id: i64,
        month: NaiveDate,
        started: Instant,
    ) -> Result<LifestyleCreepComputationResult> {
        let mut result = LifestyleCreepComputationResult::empty(user_id, month);

        let baselines = self.repos.baselines.get_by_user_id(user_id, false)?;
        if baselines.is_empty() {
            let message = "No baselines yet; compute baselines before scoring".to_string();
            info!(user_id, month = %month, "{}", message);
            result.message = Some(message);
            result.computation_time_ms = elapsed_ms(started);
            return Ok(result);
        }
        let by_category: BTreeMap<&str, &LifestyleBaseline> =
            baselines.iter().map(|b| (b.category.as_str(), b)).collect();

        let current = self.discretionary_amounts(user_id, month)?;
        let earlier: Vec<BTreeMap<String, Decimal>> = (1..self.config.creep.trend_lookback_periods)
            .map(|back| {
                let start = period::shift_period(month, PeriodType::Monthly, -(back as i32));
                self.discretionary_amounts(user_id, start)
            })
            .collect::<Result<_>>()?;

        let categories: BTreeSet<&str> = by_category
            .keys()
            .copied()
            .chain(current.keys().map(String::as_str))
            .collect();

        let scores: Vec<LifestyleCreepScore> = categories
            .into_iter()
            .map(|category| {
                let amount = current.get(category).copied().unwrap_or(Decimal::ZERO);
                let history: Vec<Decimal> = std::iter::once(amount)
                    .chain(earlier.iter().filter_map(|m| m.get(category).copied()))
                    .collect();
                score_category(
                    user_id,
                    month,
                    category,
                    by_category.get(category).copied(),
                    amount,
                    &history,
                )
            })
            .collect();

        self.repos.creep_scores.delete_for_period(user_id, month)?;
        self.repos.creep_scores.upsert_many(&scores)?;

        let overall = overall_percentage(&scores);
        result.overall_creep_percentage = overall;
        result.overall_severity = aggregate_severity(overall);

        let (baseline_start, baseline_end) = baselines
            .iter()
            .fold(None, |range: Option<(NaiveDate, NaiveDate)>, b| match range {
                Some((start, end)) => Some((start.min(b.baseline_start), end.max(b.baseline_end))),
                None => Some((b.baseline_start, b.baseline_end)),
            })
            .unwrap_or((month, month));
        self.apply_income_adjustment(&mut result, baseline_start, baseline_end)?;

        result.categories_scored = scores.len();
        result.scores = scores;
        result.computation_time_ms = elapsed_ms(started);
        info!(
            user_id,
            month = %month,
            categories = result.categories_scored,
            overall = %result.overall_creep_percentage,
            severity = %result.overall_severity,
            adjusted = %result.income_adjusted_creep_percentage,
            "Scored lifestyle creep"
        );
        Ok(result)
    }

    /// Discount overall creep by income growth since the baseline window
    fn apply_income_adjustment(
        &self,
        result: &mut LifestyleCreepComputationResult,
        baseline_start: NaiveDate,
        baseline_end: NaiveDate,
    ) -> Result<()> {
        let window_incomes: Vec<Decimal> = self
            .repos
            .cash_flow
            .get_periods_in_range(result.user_id, baseline_start, baseline_end)?
            .into_iter()
            .map(|m| m.total_income)
            .filter(|income| *income > Decimal::ZERO)
            .collect();
        let baseline_income = (!window_incomes.is_empty()).then(|| round2(mean(&window_incomes)));
        let current_income = self
            .repos
            .cash_flow
            .get_by_user_and_period(result.user_id, result.period_start)?
            .map(|m| m.total_income)
            .filter(|income| *income > Decimal::ZERO);

        let growth = match (baseline_income, current_income) {
            (Some(base), Some(current)) => Some(percentage_change(base, current)),
            _ => None,
        };
        result.income_adjusted_creep_percentage = match growth {
            Some(growth) => (result.overall_creep_percentage - growth).max(Decimal::ZERO),
            None => result.overall_creep_percentage,
        };
        debug!(
            user_id = result.user_id,
            baseline_income = ?baseline_income,
            current_income = ?current_income,
            "Income correlation"
        );
        result.baseline_income = baseline_income;
        result.current_income = current_income;
        result.income_growth_percentage = growth;
        Ok(())
    }

    /// Stored monthly spend of discretionary categories
    fn discretionary_amounts(
        &self,
        user_id: i64,
        month: NaiveDate,
    ) -> Result<BTreeMap<String, Decimal>> {
        let rows = self
            .repos
            .category_spending
            .get_by_user_and_period(user_id, PeriodType::Monthly, month)?;
        Ok(rows
            .into_iter()
            .filter(|r| is_discretionary_code(&r.category))
            .map(|r| (r.category, r.total_amount))
            .collect())
    }

    /// Pacing of the current month, read live from the ledger
    pub fn compute_pacing(&self, user_id: i64) -> Result<PacingResponse> {
        let month = period::period_start(self.today, PeriodType::Monthly);
        let baselines = self.repos.baselines.get_by_user_id(user_id, false)?;

        let query = TransactionQuery {
            start_date: Some(month),
            end_date: Some(self.today),
            pending: Some(false),
            ..Default::default()
        };
        let transactions = self.repos.all_transactions(
            user_id,
            query,
            self.config.aggregation.transaction_page_size,
        )?;
        let month_to_date: BTreeMap<String, Decimal> = aggregate(&transactions)
            .categories
            .into_iter()
            .filter(|acc| is_discretionary_code(&acc.key))
            .map(|acc| (acc.key, acc.total_amount))
            .collect();

        let previous = period::previous_period_start(month, PeriodType::Monthly);
        let prior_scores = self.repos.creep_scores.get_by_user_and_period(user_id, previous)?;
        let prior_severity = aggregate_severity(overall_percentage(&prior_scores));

        let response = pacing::evaluate(
            user_id,
            self.today,
            &baselines,
            &month_to_date,
            prior_severity,
            &self.config.creep,
        );
        info!(
            user_id,
            mode = %response.mode,
            status = %response.status,
            pacing = %response.pacing_percentage,
            "Computed pacing"
        );
        Ok(response)
    }

    /// Summarize stored scores for a month
    pub fn get_summary(&self, user_id: i64, period_start: NaiveDate) -> Result<LifestyleCreepSummary> {
        let month = period::period_start(period_start, PeriodType::Monthly);
        let scores = self.repos.creep_scores.get_by_user_and_period(user_id, month)?;

        let total_baseline: Decimal = scores.iter().map(|s| s.baseline_amount).sum();
        let total_current: Decimal = scores.iter().map(|s| s.current_amount).sum();
        let overall = overall_percentage(&scores);

        let mut top: Vec<LifestyleCreepScore> = scores
            .iter()
            .filter(|s| s.percentage_change > Decimal::ZERO)
            .cloned()
            .collect();
        top.sort_by(|a, b| {
            b.creep_score
                .cmp(&a.creep_score)
                .then_with(|| a.category.cmp(&b.category))
        });
        top.truncate(TOP_CREEPING);

        let mut history = BTreeMap::new();
        for score in &top {
            let recent = self.repos.creep_scores.get_recent_scores_by_category(
                user_id,
                &score.category,
                self.config.creep.trend_lookback_periods,
            )?;
            history.insert(score.category.clone(), recent);
        }

        Ok(LifestyleCreepSummary {
            user_id,
            period_start: month,
            total_baseline: round2(total_baseline),
            total_current: round2(total_current),
            total_change: round2(total_current - total_baseline),
            overall_creep_percentage: overall,
            overall_severity: aggregate_severity(overall),
            categories_scored: scores.len(),
            categories_creeping: scores.iter().filter(|s| s.severity > Severity::None).count(),
            top_creeping: top,
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{CashFlowMetrics, CategorySpending, NewTransaction, TrendDirection};
    use rust_decimal_macros::dec;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn seed_spend(repos: Repositories<'_>, start: NaiveDate, category: &str, amount: Decimal) {
        repos
            .category_spending
            .upsert_many(&[CategorySpending {
                user_id: 1,
                period_type: PeriodType::Monthly,
                period_start: start,
                category: category.to_string(),
                total_amount: amount,
                transaction_count: 4,
                average_amount: round2(amount / dec!(4)),
                largest_transaction: amount,
            }])
            .unwrap();
    }

    fn seed_baseline(repos: Repositories<'_>, category: &str, amount: Decimal) {
        repos
            .baselines
            .upsert_many(&[LifestyleBaseline {
                user_id: 1,
                category: category.to_string(),
                baseline_monthly_amount: amount,
                standard_deviation: None,
                baseline_start: month(2024, 1),
                baseline_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                months_count: 3,
                transaction_count: 12,
                is_locked: true,
            }])
            .unwrap();
    }

    fn seed_income(repos: Repositories<'_>, start: NaiveDate, income: Decimal) {
        repos
            .cash_flow
            .upsert(&CashFlowMetrics {
                user_id: 1,
                period_start: start,
                period_end: period::period_end(start, PeriodType::Monthly),
                total_income: income,
                total_expenses: dec!(0),
                net_cash_flow: income,
                savings_rate: Some(dec!(1)),
                recurring_expenses: dec!(0),
                discretionary_expenses: dec!(0),
                largest_expense_category: None,
                largest_expense_amount: None,
                transfers_excluded: 0,
            })
            .unwrap();
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 10).unwrap()
    }

    #[test]
    fn test_no_baselines_is_success_with_message() {
        let db = Database::in_memory().unwrap();
        let config = EngineConfig::default();
        let scorer = CreepScorer::new(Repositories::sqlite(&db), &config, today());

        let result = scorer.compute_for_period(1, month(2024, 6)).unwrap();
        assert_eq!(result.status, ComputationStatus::Success);
        assert_eq!(result.categories_scored, 0);
        assert!(result.message.is_some());
    }

    #[test]
    fn test_sustained_increase_with_income_adjustment() {
        let db = Database::in_memory().unwrap();
        let repos = Repositories::sqlite(&db);
        let config = EngineConfig::default();

        seed_baseline(repos, "FOOD_AND_DRINK", dec!(400));
        seed_baseline(repos, "ENTERTAINMENT", dec!(100));
        seed_spend(repos, month(2024, 3), "FOOD_AND_DRINK", dec!(400));
        for m in 4..=6 {
            seed_spend(repos, month(2024, m), "FOOD_AND_DRINK", dec!(500));
        }
        seed_spend(repos, month(2024, 6), "RENT_AND_UTILITIES", dec!(2000));
        for m in 1..=3 {
            seed_income(repos, month(2024, m), dec!(4000));
        }
        seed_income(repos, month(2024, 6), dec!(4400));

        let scorer = CreepScorer::new(repos, &config, today());
        let result = scorer.compute_for_period(1, month(2024, 6)).unwrap();

        assert_eq!(result.status, ComputationStatus::Success);
        assert_eq!(result.categories_scored, 2);

        let food = result
            .scores
            .iter()
            .find(|s| s.category == "FOOD_AND_DRINK")
            .unwrap();
        assert_eq!(food.baseline_amount, dec!(400));
        assert_eq!(food.current_amount, dec!(500));
        assert_eq!(food.percentage_change, dec!(25));
        assert_eq!(food.creep_score, dec!(2.5));
        assert_eq!(food.severity, Severity::Low);
        assert_eq!(food.trend_direction, TrendDirection::SustainedIncrease);
        assert_eq!(food.consecutive_months_elevated, 3);

        let fun = result
            .scores
            .iter()
            .find(|s| s.category == "ENTERTAINMENT")
            .unwrap();
        assert_eq!(fun.current_amount, dec!(0));
        assert_eq!(fun.percentage_change, dec!(-100));
        assert_eq!(fun.creep_score, dec!(-10));

        assert_eq!(result.overall_creep_percentage, dec!(25));
        assert_eq!(result.overall_severity, Severity::Medium);
        assert_eq!(result.baseline_income, Some(dec!(4000)));
        assert_eq!(result.current_income, Some(dec!(4400)));
        assert_eq!(result.income_growth_percentage, Some(dec!(10)));
        assert_eq!(result.income_adjusted_creep_percentage, dec!(15));

        let stored = repos.creep_scores.get_by_user_and_period(1, month(2024, 6)).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_rescoring_replaces_month() {
        let db = Database::in_memory().unwrap();
        let repos = Repositories::sqlite(&db);
        let config = EngineConfig::default();
        seed_baseline(repos, "FOOD_AND_DRINK", dec!(400));
        seed_spend(repos, month(2024, 6), "FOOD_AND_DRINK", dec!(480));
        seed_spend(repos, month(2024, 6), "PERSONAL_CARE", dec!(60));

        let scorer = CreepScorer::new(repos, &config, today());
        assert_eq!(scorer.compute_for_period(1, month(2024, 6)).unwrap().categories_scored, 2);

        repos
            .category_spending
            .delete_for_period(1, PeriodType::Monthly, month(2024, 6))
            .unwrap();
        seed_spend(repos, month(2024, 6), "FOOD_AND_DRINK", dec!(480));
        let again = scorer.compute_for_period(1, month(2024, 6)).unwrap();
        assert_eq!(again.categories_scored, 1);
        assert_eq!(
            repos.creep_scores.get_by_user_and_period(1, month(2024, 6)).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_summary_ranks_creeping_categories() {
        let db = Database::in_memory().unwrap();
        let repos = Repositories::sqlite(&db);
        let config = EngineConfig::default();
        seed_baseline(repos, "FOOD_AND_DRINK", dec!(400));
        seed_baseline(repos, "TRAVEL", dec!(200));
        seed_baseline(repos, "ENTERTAINMENT", dec!(100));
        seed_spend(repos, month(2024, 5), "FOOD_AND_DRINK", dec!(420));
        seed_spend(repos, month(2024, 5), "TRAVEL", dec!(400));
        seed_spend(repos, month(2024, 5), "ENTERTAINMENT", dec!(50));

        let scorer = CreepScorer::new(repos, &config, today());
        scorer.compute_for_period(1, month(2024, 5)).unwrap();
        let summary = scorer.get_summary(1, NaiveDate::from_ymd_opt(2024, 5, 20).unwrap()).unwrap();

        assert_eq!(summary.period_start, month(2024, 5));
        assert_eq!(summary.categories_scored, 3);
        assert_eq!(summary.total_baseline, dec!(700));
        assert_eq!(summary.total_current, dec!(870));
        assert_eq!(summary.total_change, dec!(170));
        assert_eq!(summary.top_creeping.len(), 2);
        assert_eq!(summary.top_creeping[0].category, "TRAVEL");
        assert_eq!(summary.categories_creeping, 1);
        assert_eq!(summary.history["TRAVEL"].len(), 1);
        // (5 * 400 + 100 * 200) / 600
        assert_eq!(summary.overall_creep_percentage, dec!(36.67));
        assert_eq!(summary.overall_severity, Severity::Medium);
    }

    #[test]
    fn test_pacing_reads_month_to_date_ledger() {
        let db = Database::in_memory().unwrap();
        let repos = Repositories::sqlite(&db);
        let config = EngineConfig::default();
        seed_baseline(repos, "FOOD_AND_DRINK", dec!(400));

        let add = |day: u32, amount: Decimal, category: &str, pending: bool| {
            db.insert_transaction(&NewTransaction {
                user_id: 1,
                date: NaiveDate::from_ymd_opt(2024, 7, day).unwrap(),
                name: format!("txn {}", day),
                merchant_name: None,
                amount,
                category_primary: Some(category.to_string()),
                category_detailed: None,
                pending,
                import_hash: format!("{}-{}-{}", day, amount, pending),
            })
            .unwrap();
        };
        add(2, dec!(60), "FOOD_AND_DRINK", false);
        add(5, dec!(40), "FOOD_AND_DRINK", false);
        add(6, dec!(1500), "RENT_AND_UTILITIES", false);
        add(8, dec!(99), "FOOD_AND_DRINK", true);
        add(20, dec!(300), "FOOD_AND_DRINK", false);

        let response = CreepScorer::new(repos, &config, today()).compute_pacing(1).unwrap();
        assert_eq!(response.mode, PacingMode::Stability);
        assert_eq!(response.current_amount, dec!(100));
        assert_eq!(response.target_amount, dec!(400));
        assert_eq!(response.pacing_percentage, dec!(25));
        assert_eq!(response.status, PacingStatus::Behind);
        // 100 over 10 of 31 days projects to 310
        assert_eq!(response.categories[0].projected_amount, dec!(310));
        assert_eq!(response.stability_score, Some(100));
    }
}
