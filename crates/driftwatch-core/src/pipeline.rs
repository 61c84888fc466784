//! End-to-end analytics run for one user
//!
//! Stages run in order and each consumes what the previous ones persisted:
//! spending rollups, cash flow, baselines (once enough history exists), then
//! creep scores for the last finalized month and the current month. A failing
//! stage is recorded and the remaining stages still run.

use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::baseline::{BaselineCalculator, BaselineComputationResult};
use crate::cash_flow::{CashFlowAggregator, CashFlowComputationResult};
use crate::computation::{ComputationManager, ComputationResult, RecomputeMode};
use crate::config::EngineConfig;
use crate::creep::{CreepScorer, LifestyleCreepComputationResult};
use crate::error::{elapsed_ms, ComputationError, FailedResult};
use crate::models::PeriodType;
use crate::period;
use crate::repository::Repositories;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Spending,
    CashFlow,
    Baselines,
    LifestyleCreep,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spending => "spending",
            Self::CashFlow => "cash_flow",
            Self::Baselines => "baselines",
            Self::LifestyleCreep => "lifestyle_creep",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageError {
    pub stage: PipelineStage,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub user_id: i64,
    pub mode: RecomputeMode,
    pub spending: Option<ComputationResult>,
    pub cash_flow: Option<CashFlowComputationResult>,
    /// None when baselines already exist or history is too short
    pub baselines: Option<BaselineComputationResult>,
    pub creep: Vec<LifestyleCreepComputationResult>,
    pub partial_failure: bool,
    pub errors: Vec<StageError>,
    pub computation_time_ms: i64,
}

pub struct AnalyticsPipeline<'a> {
    repos: Repositories<'a>,
    config: &'a EngineConfig,
    today: NaiveDate,
}

impl<'a> AnalyticsPipeline<'a> {
    pub fn new(repos: Repositories<'a>, config: &'a EngineConfig, today: NaiveDate) -> Self {
        Self {
            repos,
            config,
            today,
        }
    }

    pub fn run(&self, user_id: i64, mode: RecomputeMode) -> PipelineResult {
        let started = Instant::now();
        let mut errors = Vec::new();

        info!(user_id, mode = mode.as_str(), "Starting analytics pipeline");

        let spending = ComputationManager::new(self.repos, self.config, self.today)
            .compute(user_id, mode);
        let spending = Some(settle(user_id, PipelineStage::Spending, spending, &mut errors));

        let cash_flow = CashFlowAggregator::new(self.repos, self.config, self.today)
            .compute(user_id, mode);
        let cash_flow = Some(settle(user_id, PipelineStage::CashFlow, cash_flow, &mut errors));

        let calculator = BaselineCalculator::new(self.repos, &self.config.baseline, self.today);
        let baselines = match calculator.should_compute_baselines(user_id) {
            Ok(true) => Some(settle(
                user_id,
                PipelineStage::Baselines,
                calculator.compute_baselines(user_id, false),
                &mut errors,
            )),
            Ok(false) => None,
            Err(e) => {
                record_failure(user_id, PipelineStage::Baselines, &e, &mut errors);
                None
            }
        };

        let scorer = CreepScorer::new(self.repos, self.config, self.today);
        let current = period::period_start(self.today, PeriodType::Monthly);
        let previous = period::previous_period_start(current, PeriodType::Monthly);
        let creep = [previous, current]
            .into_iter()
            .map(|month| {
                settle_with(
                    user_id,
                    PipelineStage::LifestyleCreep,
                    scorer.compute_for_period(user_id, month),
                    &mut errors,
                    |elapsed_ms| LifestyleCreepComputationResult::failed(user_id, month, elapsed_ms),
                )
            })
            .collect();

        let partial_failure = !errors.is_empty();
        let computation_time_ms = elapsed_ms(started);
        info!(
            user_id,
            partial_failure,
            errors = errors.len(),
            elapsed_ms = computation_time_ms,
            "Analytics pipeline finished"
        );

        PipelineResult {
            user_id,
            mode,
            spending,
            cash_flow,
            baselines,
            creep,
            partial_failure,
            errors,
            computation_time_ms,
        }
    }
}

/// Log the full error and record only the stage name for the caller
fn record_failure(
    user_id: i64,
    stage: PipelineStage,
    error: &dyn std::fmt::Display,
    errors: &mut Vec<StageError>,
) {
    warn!(user_id, %stage, error = %error, "Pipeline stage failed");
    errors.push(StageError {
        stage,
        error: format!("{} stage failed", stage),
    });
}

/// Unwrap a stage outcome, recording failures
fn settle<R: FailedResult>(
    user_id: i64,
    stage: PipelineStage,
    outcome: std::result::Result<R, ComputationError>,
    errors: &mut Vec<StageError>,
) -> R {
    settle_with(user_id, stage, outcome, errors, |elapsed_ms| {
        R::failed(user_id, elapsed_ms)
    })
}

fn settle_with<R>(
    user_id: i64,
    stage: PipelineStage,
    outcome: std::result::Result<R, ComputationError>,
    errors: &mut Vec<StageError>,
    on_failure: impl FnOnce(i64) -> R,
) -> R {
    match outcome {
        Ok(result) => result,
        Err(e) => {
            record_failure(user_id, stage, &e, errors);
            on_failure(e.elapsed_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::{Error, Result, GENERIC_FAILURE_MESSAGE};
    use crate::models::{CashFlowMetrics, ComputationStatus, NewTransaction};
    use crate::repository::CashFlowMetricsRepository;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn seed(db: &Database, months: u32) {
        for m in 1..=months {
            for (day, amount) in [(3, dec!(120)), (17, dec!(80))] {
                insert(db, NaiveDate::from_ymd_opt(2024, m, day).unwrap(), "BISTRO", amount, "FOOD_AND_DRINK");
            }
            insert(db, NaiveDate::from_ymd_opt(2024, m, 1).unwrap(), "ACME PAYROLL", dec!(-3000), "INCOME");
        }
    }

    fn insert(db: &Database, date: NaiveDate, name: &str, amount: Decimal, category: &str) {
        db.insert_transaction(&NewTransaction {
            user_id: 1,
            date,
            name: name.to_string(),
            merchant_name: None,
            amount,
            category_primary: Some(category.to_string()),
            category_detailed: None,
            pending: false,
            import_hash: format!("{}|{}|{}", date, name, amount),
        })
        .unwrap();
    }

    #[test]
    fn test_full_pipeline_runs_every_stage() {
        let db = Database::in_memory().unwrap();
        seed(&db, 5);
        let config = EngineConfig::default();
        let today = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();

        let result = AnalyticsPipeline::new(Repositories::sqlite(&db), &config, today)
            .run(1, RecomputeMode::Full);

        assert!(!result.partial_failure, "{:?}", result.errors);
        assert_eq!(result.spending.as_ref().unwrap().status, ComputationStatus::Success);
        assert_eq!(result.cash_flow.as_ref().unwrap().periods_computed, 5);

        let baselines = result.baselines.as_ref().unwrap();
        assert_eq!(baselines.baselines_computed, 1);
        assert_eq!(baselines.baselines[0].baseline_monthly_amount, dec!(200));

        assert_eq!(result.creep.len(), 2);
        assert_eq!(result.creep[0].period_start, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(result.creep[1].categories_scored, 1);
    }

    #[test]
    fn test_second_run_skips_existing_baselines() {
        let db = Database::in_memory().unwrap();
        seed(&db, 4);
        let config = EngineConfig::default();
        let today = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();
        let pipeline = AnalyticsPipeline::new(Repositories::sqlite(&db), &config, today);

        assert!(pipeline.run(1, RecomputeMode::Full).baselines.is_some());
        let again = pipeline.run(1, RecomputeMode::Incremental);
        assert!(again.baselines.is_none());
        assert!(!again.partial_failure);
    }

    #[test]
    fn test_short_history_still_succeeds() {
        let db = Database::in_memory().unwrap();
        seed(&db, 1);
        let config = EngineConfig::default();
        let today = NaiveDate::from_ymd_opt(2024, 1, 25).unwrap();

        let result = AnalyticsPipeline::new(Repositories::sqlite(&db), &config, today)
            .run(1, RecomputeMode::Full);
        assert!(!result.partial_failure);
        assert!(result.baselines.is_none());
        assert!(result.creep.iter().all(|c| c.message.is_some()));
    }

    /// Reads from SQLite, refuses every write
    struct ReadOnlyCashFlow<'a>(&'a Database);

    impl CashFlowMetricsRepository for ReadOnlyCashFlow<'_> {
        fn get_by_user_and_period(
            &self,
            user_id: i64,
            period_start: NaiveDate,
        ) -> Result<Option<CashFlowMetrics>> {
            CashFlowMetricsRepository::get_by_user_and_period(self.0, user_id, period_start)
        }

        fn get_periods_in_range(
            &self,
            user_id: i64,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<CashFlowMetrics>> {
            CashFlowMetricsRepository::get_periods_in_range(self.0, user_id, start, end)
        }

        fn upsert(&self, _metrics: &CashFlowMetrics) -> Result<()> {
            Err(Error::InvalidData("disk I/O error at page 42".to_string()))
        }
    }

    #[test]
    fn test_failing_stage_does_not_stop_later_stages() {
        let db = Database::in_memory().unwrap();
        seed(&db, 5);
        let config = EngineConfig::default();
        let today = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
        let cash_flow = ReadOnlyCashFlow(&db);
        let repos = Repositories {
            cash_flow: &cash_flow,
            ..Repositories::sqlite(&db)
        };

        let result = AnalyticsPipeline::new(repos, &config, today).run(1, RecomputeMode::Full);

        assert!(result.partial_failure);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].stage, PipelineStage::CashFlow);
        assert_eq!(result.errors[0].error, "cash_flow stage failed");
        assert!(!result.errors[0].error.contains("disk"));

        let cash_flow = result.cash_flow.as_ref().unwrap();
        assert_eq!(cash_flow.status, ComputationStatus::Failed);
        assert_eq!(cash_flow.error_message.as_deref(), Some(GENERIC_FAILURE_MESSAGE));

        assert_eq!(result.spending.as_ref().unwrap().status, ComputationStatus::Success);
        assert_eq!(result.baselines.as_ref().unwrap().baselines_computed, 1);
        assert_eq!(result.creep.len(), 2);
        assert!(result
            .creep
            .iter()
            .all(|c| c.status == ComputationStatus::Success));
        assert_eq!(result.creep[0].period_start, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    }

    #[test]
    fn test_failed_creep_record_keeps_requested_month() {
        let month = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let failed = LifestyleCreepComputationResult::failed(1, month, 12);
        assert_eq!(failed.status, ComputationStatus::Failed);
        assert_eq!(failed.period_start, month);
        assert_eq!(failed.computation_time_ms, 12);
        assert_eq!(failed.error_message.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
    }
}
