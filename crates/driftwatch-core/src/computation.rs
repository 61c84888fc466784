//! Spending recomputation
//!
//! `ComputationManager` rebuilds spending periods and their category and
//! merchant rollups, either for the user's whole ledger or just the current
//! and previous periods. Every run is recorded in the computation log.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::aggregator::aggregate;
use crate::config::EngineConfig;
use crate::error::{elapsed_ms, ComputationError, FailedResult, Result, GENERIC_FAILURE_MESSAGE};
use crate::models::{ComputationCounts, ComputationStatus, ComputationType, PeriodType, Transaction};
use crate::period;
use crate::repository::{ComputationLogRepository, Repositories, TransactionQuery};

/// Result records that report counts to the computation log
pub trait LoggedResult {
    fn counts(&self) -> ComputationCounts;
    fn computation_time_ms(&self) -> i64;
}

/// Run `f` bracketed by computation-log writes
///
/// Errors are logged in full and surfaced as a `ComputationError`; the log
/// row only ever stores the generic failure message.
pub(crate) fn run_logged<R, F>(
    log: &dyn ComputationLogRepository,
    user_id: i64,
    computation_type: ComputationType,
    f: F,
) -> std::result::Result<R, ComputationError>
where
    R: LoggedResult,
    F: FnOnce(Instant) -> Result<R>,
{
    let started = Instant::now();
    let outcome = log
        .mark_started(user_id, computation_type)
        .and_then(|_| f(started))
        .and_then(|result| {
            log.mark_succeeded(
                user_id,
                computation_type,
                result.counts(),
                result.computation_time_ms(),
            )?;
            Ok(result)
        });

    outcome.map_err(|e| {
        error!(user_id, computation = %computation_type, error = %e, "Computation failed");
        let err = ComputationError::since(e, started);
        if let Err(log_err) =
            log.mark_failed(user_id, computation_type, GENERIC_FAILURE_MESSAGE, err.elapsed_ms)
        {
            error!(user_id, error = %log_err, "Failed to record computation failure");
        }
        err
    })
}

/// Outcome of a spending recomputation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputationResult {
    pub user_id: i64,
    pub status: ComputationStatus,
    pub periods_computed: i64,
    pub categories_computed: i64,
    pub merchants_computed: i64,
    pub transactions_processed: i64,
    pub computation_time_ms: i64,
    pub error_message: Option<String>,
}

impl ComputationResult {
    fn empty(user_id: i64) -> Self {
        Self {
            user_id,
            status: ComputationStatus::Success,
            periods_computed: 0,
            categories_computed: 0,
            merchants_computed: 0,
            transactions_processed: 0,
            computation_time_ms: 0,
            error_message: None,
        }
    }
}

impl FailedResult for ComputationResult {
    fn failed(user_id: i64, elapsed_ms: i64) -> Self {
        Self {
            status: ComputationStatus::Failed,
            computation_time_ms: elapsed_ms,
            error_message: Some(GENERIC_FAILURE_MESSAGE.to_string()),
            ..Self::empty(user_id)
        }
    }
}

impl LoggedResult for ComputationResult {
    fn counts(&self) -> ComputationCounts {
        ComputationCounts {
            periods: self.periods_computed,
            categories: self.categories_computed,
            merchants: self.merchants_computed,
            transactions: self.transactions_processed,
        }
    }

    fn computation_time_ms(&self) -> i64 {
        self.computation_time_ms
    }
}

/// Full rebuild or current-plus-previous refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecomputeMode {
    Full,
    Incremental,
}

impl RecomputeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

pub struct ComputationManager<'a> {
    repos: Repositories<'a>,
    config: &'a EngineConfig,
    today: NaiveDate,
}

impl<'a> ComputationManager<'a> {
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
    ) -> std::result::Result<ComputationResult, ComputationError> {
        match mode {
            RecomputeMode::Full => self.compute_full(user_id),
            RecomputeMode::Incremental => self.compute_incremental(user_id),
        }
    }

    /// Rebuild every period of every configured type across the whole ledger
    ///
    /// Periods left over from a previous run that now fall outside the
    /// ledger's date range are removed.
    pub fn compute_full(
        &self,
        user_id: i64,
    ) -> std::result::Result<ComputationResult, ComputationError> {
        run_logged(
            self.repos.computation_log,
            user_id,
            ComputationType::SpendingFull,
            |started| self.full_inner(user_id, started),
        )
    }

    /// Refresh the current and previous period of each configured type
    ///
    /// A previous period that is already finalized and stored is skipped.
    pub fn compute_incremental(
        &self,
        user_id: i64,
    ) -> std::result::Result<ComputationResult, ComputationError> {
        run_logged(
            self.repos.computation_log,
            user_id,
            ComputationType::SpendingIncremental,
            |started| self.incremental_inner(user_id, started),
        )
    }

    fn full_inner(&self, user_id: i64, started: Instant) -> Result<ComputationResult> {
        let mut result = ComputationResult::empty(user_id);

        let Some((first, last)) = self.repos.transactions.date_range(user_id)? else {
            info!(user_id, "No transactions; removing any stale periods");
            for period_type in &self.config.aggregation.period_types {
                self.remove_stale_periods(user_id, *period_type, &[])?;
            }
            result.computation_time_ms = elapsed_ms(started);
            return Ok(result);
        };

        let transactions = self.load_transactions(user_id, Some(first), Some(last))?;
        result.transactions_processed = transactions.len() as i64;

        for period_type in &self.config.aggregation.period_types {
            let starts = period::periods_in_range(first, last, *period_type);
            let buckets = bucket_by_period(&transactions, *period_type);
            for start in &starts {
                let txns = buckets.get(start).map(Vec::as_slice).unwrap_or(&[]);
                self.recompute_period(user_id, *period_type, *start, txns, &mut result)?;
            }
            self.remove_stale_periods(user_id, *period_type, &starts)?;
        }

        self.repos
            .spending_periods
            .mark_finalized_before(user_id, self.today)?;
        result.computation_time_ms = elapsed_ms(started);

        info!(
            user_id,
            periods = result.periods_computed,
            categories = result.categories_computed,
            merchants = result.merchants_computed,
            transactions = result.transactions_processed,
            elapsed_ms = result.computation_time_ms,
            "Full spending recompute complete"
        );
        Ok(result)
    }

    fn incremental_inner(&self, user_id: i64, started: Instant) -> Result<ComputationResult> {
        let mut result = ComputationResult::empty(user_id);

        for period_type in &self.config.aggregation.period_types {
            let current = period::period_start(self.today, *period_type);
            let previous = period::previous_period_start(current, *period_type);

            for start in [previous, current] {
                if period::is_finalized(start, *period_type, self.today)
                    && self
                        .repos
                        .spending_periods
                        .get_by_user_and_period(user_id, *period_type, start)?
                        .is_some()
                {
                    debug!(user_id, period_type = %period_type, %start, "Skipping finalized period");
                    continue;
                }

                let end = period::period_end(start, *period_type);
                let txns = self.load_transactions(user_id, Some(start), Some(end))?;
                result.transactions_processed += txns.len() as i64;
                let refs: Vec<&Transaction> = txns.iter().collect();
                self.recompute_period(user_id, *period_type, start, &refs, &mut result)?;
            }
        }

        self.repos
            .spending_periods
            .mark_finalized_before(user_id, self.today)?;
        result.computation_time_ms = elapsed_ms(started);

        info!(
            user_id,
            periods = result.periods_computed,
            transactions = result.transactions_processed,
            elapsed_ms = result.computation_time_ms,
            "Incremental spending recompute complete"
        );
        Ok(result)
    }

    /// Replace one period's rows with a fresh aggregation
    fn recompute_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        start: NaiveDate,
        transactions: &[&Transaction],
        result: &mut ComputationResult,
    ) -> Result<()> {
        self.repos
            .category_spending
            .delete_for_period(user_id, period_type, start)?;
        self.repos
            .merchant_spending
            .delete_for_period(user_id, period_type, start)?;

        if transactions.is_empty() {
            self.repos
                .spending_periods
                .delete_for_period(user_id, period_type, start)?;
            return Ok(());
        }

        let aggregation = aggregate(transactions.iter().copied());

        let spending_period = aggregation.to_spending_period(user_id, period_type, start, self.today);
        self.repos.spending_periods.upsert(&spending_period)?;

        let categories = aggregation.to_category_spending(user_id, period_type, start);
        let merchants = aggregation.to_merchant_spending(user_id, period_type, start);
        result.categories_computed += self.repos.category_spending.upsert_many(&categories)? as i64;
        result.merchants_computed += self.repos.merchant_spending.upsert_many(&merchants)? as i64;
        result.periods_computed += 1;
        Ok(())
    }

    /// Delete stored periods of a type whose start is not in `keep`
    fn remove_stale_periods(
        &self,
        user_id: i64,
        period_type: PeriodType,
        keep: &[NaiveDate],
    ) -> Result<()> {
        let stored = self
            .repos
            .spending_periods
            .get_periods_for_user(user_id, period_type)?;
        for stale in stored.iter().filter(|p| !keep.contains(&p.period_start)) {
            debug!(user_id, period_type = %period_type, start = %stale.period_start, "Removing stale period");
            self.repos
                .category_spending
                .delete_for_period(user_id, period_type, stale.period_start)?;
            self.repos
                .merchant_spending
                .delete_for_period(user_id, period_type, stale.period_start)?;
            self.repos
                .spending_periods
                .delete_for_period(user_id, period_type, stale.period_start)?;
        }
        Ok(())
    }

    /// Settled transactions in a date range, paged from the repository
    fn load_transactions(
        &self,
        user_id: i64,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Transaction>> {
        let query = TransactionQuery {
            start_date,
            end_date,
            pending: Some(false),
            ..Default::default()
        };
        self.repos
            .all_transactions(user_id, query, self.config.aggregation.transaction_page_size)
    }
}

/// Group transactions by the start of the period containing their date
pub fn bucket_by_period(
    transactions: &[Transaction],
    period_type: PeriodType,
) -> BTreeMap<NaiveDate, Vec<&Transaction>> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&Transaction>> = BTreeMap::new();
    for txn in transactions {
        buckets
            .entry(period::period_start(txn.date, period_type))
            .or_default()
            .push(txn);
    }
    buckets
}
