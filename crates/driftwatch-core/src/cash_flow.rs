//! Monthly cash flow
//!
//! Income is recognized conservatively: a deposit counts when it comes from a
//! high-confidence detected source, carries the INCOME category, or reads like
//! pay. Internal transfers are excluded from both sides.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::categories::Category;
use crate::computation::{bucket_by_period, run_logged, LoggedResult, RecomputeMode};
use crate::config::EngineConfig;
use crate::error::{elapsed_ms, ComputationError, FailedResult, Result, GENERIC_FAILURE_MESSAGE};
use crate::income::{has_income_keyword, normalize_source_name, IncomeDetector};
use crate::models::{
    CashFlowMetrics, ComputationCounts, ComputationStatus, ComputationType, FlowDirection,
    PeriodType, RecurringStream, Transaction,
};
use crate::money::{clamp, round2, round_dp};
use crate::period;
use crate::repository::{Repositories, TransactionQuery};
use crate::transfer::should_exclude_from_cash_flow;

/// Outcome of a cash flow computation
#[derive(Debug, Clone, Serialize)]
pub struct CashFlowComputationResult {
    pub user_id: i64,
    pub status: ComputationStatus,
    pub periods_computed: i64,
    pub income_sources_detected: i64,
    pub transactions_processed: i64,
    pub metrics: Vec<CashFlowMetrics>,
    pub message: Option<String>,
    pub computation_time_ms: i64,
    pub error_message: Option<String>,
}

impl CashFlowComputationResult {
    fn empty(user_id: i64) -> Self {
        Self {
            user_id,
            status: ComputationStatus::Success,
            periods_computed: 0,
            income_sources_detected: 0,
            transactions_processed: 0,
            metrics: Vec::new(),
            message: None,
            computation_time_ms: 0,
            error_message: None,
        }
    }
}

impl FailedResult for CashFlowComputationResult {
    fn failed(user_id: i64, elapsed_ms: i64) -> Self {
        Self {
            status: ComputationStatus::Failed,
            computation_time_ms: elapsed_ms,
            error_message: Some(GENERIC_FAILURE_MESSAGE.to_string()),
            ..Self::empty(user_id)
        }
    }
}

impl LoggedResult for CashFlowComputationResult {
    fn counts(&self) -> ComputationCounts {
        ComputationCounts {
            periods: self.periods_computed,
            transactions: self.transactions_processed,
            ..Default::default()
        }
    }

    fn computation_time_ms(&self) -> i64 {
        self.computation_time_ms
    }
}

/// Σ |last_amount| of active outflow streams
pub fn recurring_expense_total(streams: &[RecurringStream]) -> Decimal {
    streams
        .iter()
        .filter(|s| s.is_active && s.direction == FlowDirection::Outflow)
        .map(|s| s.last_amount.abs())
        .sum()
}

/// `(income - expenses) / income` clamped to [-1, 1] at 4 places; None without income
pub fn savings_rate(income: Decimal, expenses: Decimal) -> Option<Decimal> {
    if income <= Decimal::ZERO {
        return None;
    }
    let rate = (income - expenses) / income;
    Some(round_dp(clamp(rate, -Decimal::ONE, Decimal::ONE), 4))
}

/// Summarize one month's transactions
///
/// `high_confidence_sources` holds normalized source names.
pub fn summarize_period(
    user_id: i64,
    period_start: NaiveDate,
    transactions: &[&Transaction],
    high_confidence_sources: &HashSet<String>,
    recurring_expenses: Decimal,
) -> CashFlowMetrics {
    let mut total_income = Decimal::ZERO;
    let mut total_expenses = Decimal::ZERO;
    let mut transfers_excluded = 0i64;
    let mut by_category: BTreeMap<String, Decimal> = BTreeMap::new();

    for txn in transactions {
        if should_exclude_from_cash_flow(txn) {
            transfers_excluded += 1;
            continue;
        }

        if txn.is_inflow() {
            if is_income(txn, high_confidence_sources) {
                total_income += txn.amount.abs();
            }
        } else if txn.is_outflow() {
            total_expenses += txn.amount;
            let category = Category::from_code(txn.category_primary.as_deref());
            *by_category
                .entry(category.as_str().to_string())
                .or_insert(Decimal::ZERO) += txn.amount;
        }
    }

    // BTreeMap iteration keeps ties alphabetical
    let largest = by_category
        .into_iter()
        .fold(None::<(String, Decimal)>, |best, (category, amount)| match best {
            Some((_, best_amount)) if best_amount >= amount => best,
            _ => Some((category, amount)),
        });

    let discretionary = (total_expenses - recurring_expenses).max(Decimal::ZERO);

    CashFlowMetrics {
        user_id,
        period_start,
        period_end: period::period_end(period_start, PeriodType::Monthly),
        total_income: round2(total_income),
        total_expenses: round2(total_expenses),
        net_cash_flow: round2(total_income - total_expenses),
        savings_rate: savings_rate(total_income, total_expenses),
        recurring_expenses: round2(recurring_expenses),
        discretionary_expenses: round2(discretionary),
        largest_expense_amount: largest.as_ref().map(|(_, amount)| round2(*amount)),
        largest_expense_category: largest.map(|(category, _)| category),
        transfers_excluded,
    }
}

fn is_income(txn: &Transaction, high_confidence_sources: &HashSet<String>) -> bool {
    Category::from_code(txn.category_primary.as_deref()) == Category::Income
        || high_confidence_sources.contains(&normalize_source_name(txn.display_merchant()))
        || has_income_keyword(&txn.name)
}

pub struct CashFlowAggregator<'a> {
    repos: Repositories<'a>,
    config: &'a EngineConfig,
    today: NaiveDate,
}

impl<'a> CashFlowAggregator<'a> {
    pub fn new(repos: Repositories<'a>, config: &'a EngineConfig, today: NaiveDate) -> Self {
        Self {
            repos,
            config,
            today,
        }
    }

    pub fn compute(
        &self,
        user_id: i64,
        mode: RecomputeMode,
    ) -> std::result::Result<CashFlowComputationResult, ComputationError> {
        run_logged(
            self.repos.computation_log,
            user_id,
            ComputationType::CashFlow,
            |started| self.compute_inner(user_id, mode, started),
        )
    }

    /// Every month between the user's first and last transaction
    pub fn compute_full(
        &self,
        user_id: i64,
    ) -> std::result::Result<CashFlowComputationResult, ComputationError> {
        self.compute(user_id, RecomputeMode::Full)
    }

    /// Current and previous month only
    pub fn compute_incremental(
        &self,
        user_id: i64,
    ) -> std::result::Result<CashFlowComputationResult, ComputationError> {
        self.compute(user_id, RecomputeMode::Incremental)
    }

    fn compute_inner(
        &self,
        user_id: i64,
        mode: RecomputeMode,
        started: Instant,
    ) -> Result<CashFlowComputationResult> {
        let mut result = CashFlowComputationResult::empty(user_id);

        let months = match mode {
            RecomputeMode::Full => match self.repos.transactions.date_range(user_id)? {
                Some((first, last)) => period::periods_in_range(first, last, PeriodType::Monthly),
                None => Vec::new(),
            },
            RecomputeMode::Incremental => {
                let current = period::period_start(self.today, PeriodType::Monthly);
                vec![
                    period::previous_period_start(current, PeriodType::Monthly),
                    current,
                ]
            }
        };

        let (Some(first), Some(last)) = (months.first(), months.last()) else {
            result.message = Some("No transactions to analyze".to_string());
            result.computation_time_ms = elapsed_ms(started);
            info!(user_id, "No transactions; skipping cash flow");
            return Ok(result);
        };

        // Income detection runs once per computation, over the whole ledger
        let detector = IncomeDetector::new(
            self.repos,
            &self.config.income,
            self.config.aggregation.transaction_page_size,
            self.today,
        );
        let sources = detector.detect_and_persist(user_id)?;
        let high_confidence: HashSet<String> = sources
            .iter()
            .filter(|s| detector.is_high_confidence(s))
            .map(|s| s.source_name.clone())
            .collect();
        result.income_sources_detected = sources.len() as i64;

        let streams = self.repos.recurring_streams.get_active_by_user_id(user_id)?;
        let recurring = recurring_expense_total(&streams);

        let query = TransactionQuery {
            start_date: Some(*first),
            end_date: Some(period::period_end(*last, PeriodType::Monthly)),
            pending: Some(false),
            ..Default::default()
        };
        let transactions = self.repos.all_transactions(
            user_id,
            query,
            self.config.aggregation.transaction_page_size,
        )?;
        result.transactions_processed = transactions.len() as i64;
        let buckets = bucket_by_period(&transactions, PeriodType::Monthly);

        for month in &months {
            let txns = buckets.get(month).map(Vec::as_slice).unwrap_or(&[]);
            let metrics = summarize_period(user_id, *month, txns, &high_confidence, recurring);
            debug!(
                user_id,
                month = %month,
                income = %metrics.total_income,
                expenses = %metrics.total_expenses,
                "Cash flow period summarized"
            );
            self.repos.cash_flow.upsert(&metrics)?;
            result.metrics.push(metrics);
        }

        result.periods_computed = result.metrics.len() as i64;
        result.computation_time_ms = elapsed_ms(started);
        info!(
            user_id,
            mode = mode.as_str(),
            periods = result.periods_computed,
            sources = result.income_sources_detected,
            "Cash flow computed"
        );
        Ok(result)
    }
}
