//! Lifestyle baseline calculation
//!
//! A baseline is the typical monthly spend of a discretionary category,
//! measured over the user's earliest finalized months. Once locked it stays
//! fixed so later drift is measured against the same reference.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::categories::is_discretionary_code;
use crate::computation::{run_logged, LoggedResult};
use crate::config::BaselineConfig;
use crate::error::{elapsed_ms, ComputationError, FailedResult, Result, GENERIC_FAILURE_MESSAGE};
use crate::models::{
    ComputationCounts, ComputationStatus, ComputationType, LifestyleBaseline, PeriodType,
};
use crate::money::{population_std_dev, round2};
use crate::period;
use crate::repository::Repositories;

/// Outcome of a baseline computation
#[derive(Debug, Clone, Serialize)]
pub struct BaselineComputationResult {
    pub user_id: i64,
    pub status: ComputationStatus,
    pub baselines_computed: usize,
    pub months_analyzed: usize,
    pub baseline_start: Option<NaiveDate>,
    pub baseline_end: Option<NaiveDate>,
    pub baselines: Vec<LifestyleBaseline>,
    /// Why no work was done, when applicable
    pub message: Option<String>,
    pub computation_time_ms: i64,
    pub error_message: Option<String>,
}

impl BaselineComputationResult {
    fn skipped(user_id: i64, message: String, started: Instant) -> Self {
        Self {
            user_id,
            status: ComputationStatus::Success,
            baselines_computed: 0,
            months_analyzed: 0,
            baseline_start: None,
            baseline_end: None,
            baselines: Vec::new(),
            message: Some(message),
            computation_time_ms: elapsed_ms(started),
            error_message: None,
        }
    }
}

impl LoggedResult for BaselineComputationResult {
    fn counts(&self) -> ComputationCounts {
        ComputationCounts {
            periods: self.months_analyzed as i64,
            categories: self.baselines_computed as i64,
            ..Default::default()
        }
    }

    fn computation_time_ms(&self) -> i64 {
        self.computation_time_ms
    }
}

impl FailedResult for BaselineComputationResult {
    fn failed(user_id: i64, elapsed_ms: i64) -> Self {
        Self {
            user_id,
            status: ComputationStatus::Failed,
            baselines_computed: 0,
            months_analyzed: 0,
            baseline_start: None,
            baseline_end: None,
            baselines: Vec::new(),
            message: None,
            computation_time_ms: elapsed_ms,
            error_message: Some(GENERIC_FAILURE_MESSAGE.to_string()),
        }
    }
}

/// Per-category totals across the baseline window
#[derive(Debug, Default)]
struct WindowTotals {
    month_amounts: Vec<Decimal>,
    transaction_count: i64,
}

pub struct BaselineCalculator<'a> {
    repos: Repositories<'a>,
    config: &'a BaselineConfig,
    today: NaiveDate,
}

impl<'a> BaselineCalculator<'a> {
    pub fn new(repos: Repositories<'a>, config: &'a BaselineConfig, today: NaiveDate) -> Self {
        Self {
            repos,
            config,
            today,
        }
    }

    /// Compute and persist baselines for every qualifying discretionary category
    ///
    /// Locked baselines are left untouched unless `force` is set, in which
    /// case every existing row is deleted before recomputing.
    pub fn compute_baselines(
        &self,
        user_id: i64,
        force: bool,
    ) -> std::result::Result<BaselineComputationResult, ComputationError> {
        run_logged(
            self.repos.computation_log,
            user_id,
            ComputationType::Baselines,
            |started| self.compute_inner(user_id, force, started),
        )
    }

    fn compute_inner(
        &self,
        user_id: i64,
        force: bool,
        started: Instant,
    ) -> Result<BaselineComputationResult> {
        let finalized = self.finalized_months(user_id)?;
        if finalized.len() < self.config.min_history_months {
            let message = format!(
                "Insufficient history: need at least {} finalized months, found {}",
                self.config.min_history_months,
                finalized.len()
            );
            info!(user_id, months = finalized.len(), "{}", message);
            return Ok(BaselineComputationResult::skipped(user_id, message, started));
        }

        let locked = self.repos.baselines.get_by_user_id(user_id, true)?;
        if !locked.is_empty() && !force {
            let message = "Baselines are locked; force a recompute to replace them".to_string();
            info!(user_id, locked = locked.len(), "{}", message);
            return Ok(BaselineComputationResult::skipped(user_id, message, started));
        }

        let window: Vec<NaiveDate> = finalized
            .into_iter()
            .take(self.config.window_months)
            .collect();
        let (baseline_start, baseline_end) = match (window.first(), window.last()) {
            (Some(first), Some(last)) => (*first, period::period_end(*last, PeriodType::Monthly)),
            _ => {
                return Ok(BaselineComputationResult::skipped(
                    user_id,
                    "No finalized months in baseline window".to_string(),
                    started,
                ))
            }
        };

        let mut totals: BTreeMap<String, WindowTotals> = BTreeMap::new();
        for month in &window {
            let rows = self.repos.category_spending.get_by_user_and_period(
                user_id,
                PeriodType::Monthly,
                *month,
            )?;
            for row in rows {
                let entry = totals.entry(row.category).or_default();
                entry.month_amounts.push(row.total_amount);
                entry.transaction_count += row.transaction_count;
            }
        }

        let baselines: Vec<LifestyleBaseline> = totals
            .into_iter()
            .filter(|(category, t)| {
                is_discretionary_code(category) && t.transaction_count >= self.config.min_transactions
            })
            .map(|(category, t)| {
                let months_with_data = t.month_amounts.len();
                let total: Decimal = t.month_amounts.iter().sum();
                LifestyleBaseline {
                    user_id,
                    category,
                    baseline_monthly_amount: round2(total / Decimal::from(months_with_data)),
                    standard_deviation: population_std_dev(&t.month_amounts).map(round2),
                    baseline_start,
                    baseline_end,
                    months_count: months_with_data as i64,
                    transaction_count: t.transaction_count,
                    is_locked: self.config.lock_after_compute,
                }
            })
            .collect();

        // Rows for categories that no longer qualify go too
        self.repos.baselines.replace_for_user(user_id, &baselines)?;

        info!(
            user_id,
            baselines = baselines.len(),
            months = window.len(),
            %baseline_start,
            %baseline_end,
            "Computed lifestyle baselines"
        );

        Ok(BaselineComputationResult {
            user_id,
            status: ComputationStatus::Success,
            baselines_computed: baselines.len(),
            months_analyzed: window.len(),
            baseline_start: Some(baseline_start),
            baseline_end: Some(baseline_end),
            baselines,
            message: None,
            computation_time_ms: elapsed_ms(started),
            error_message: None,
        })
    }

    /// True when the user has no baselines yet but enough finalized history
    pub fn should_compute_baselines(&self, user_id: i64) -> Result<bool> {
        if self.repos.baselines.has_baselines(user_id)? {
            return Ok(false);
        }
        Ok(self.finalized_months(user_id)?.len() >= self.config.min_history_months)
    }

    pub fn lock_baselines(&self, user_id: i64) -> Result<usize> {
        let locked = self.repos.baselines.lock(user_id)?;
        info!(user_id, locked, "Locked baselines");
        Ok(locked)
    }

    pub fn unlock_baselines(&self, user_id: i64) -> Result<usize> {
        let unlocked = self.repos.baselines.unlock(user_id)?;
        info!(user_id, unlocked, "Unlocked baselines");
        Ok(unlocked)
    }

    /// Starts of finalized monthly periods, oldest first
    fn finalized_months(&self, user_id: i64) -> Result<Vec<NaiveDate>> {
        let periods = self
            .repos
            .spending_periods
            .get_periods_for_user(user_id, PeriodType::Monthly)?;
        let mut months: Vec<NaiveDate> = periods
            .into_iter()
            .filter(|p| {
                p.is_finalized || period::is_finalized(p.period_start, PeriodType::Monthly, self.today)
            })
            .map(|p| p.period_start)
            .collect();
        months.sort();
        Ok(months)
    }
}
