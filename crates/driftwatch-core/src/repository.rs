//! Repository contracts consumed by the engine
//!
//! The engine only talks to storage through these traits. `Database`
//! implements all of them over SQLite; other stores can be swapped in by
//! building a `Repositories` bundle from different implementations.

use chrono::NaiveDate;

use crate::db::Database;
use crate::error::Result;
use crate::models::{
    CashFlowMetrics, CategorySpending, ComputationCounts, ComputationLog, ComputationType,
    IncomeSource, LifestyleBaseline, LifestyleCreepScore, MerchantSpending, PeriodType,
    RecurringStream, SpendingPeriod, Transaction,
};

/// Filter for paging through a user's ledger
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// `Some(false)` excludes pending transactions
    pub pending: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

pub trait TransactionRepository {
    /// One page of transactions ordered by date then id, plus the total match count
    fn get_by_user(&self, user_id: i64, query: TransactionQuery) -> Result<(Vec<Transaction>, i64)>;

    /// Earliest and latest transaction dates for the user
    fn date_range(&self, user_id: i64) -> Result<Option<(NaiveDate, NaiveDate)>>;

    /// Every user with at least one transaction
    fn user_ids(&self) -> Result<Vec<i64>>;
}

pub trait SpendingPeriodRepository {
    fn get_by_user_and_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<Option<SpendingPeriod>>;

    /// All periods of a type for the user, oldest first
    fn get_periods_for_user(
        &self,
        user_id: i64,
        period_type: PeriodType,
    ) -> Result<Vec<SpendingPeriod>>;

    fn upsert(&self, period: &SpendingPeriod) -> Result<()>;

    fn delete_for_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<()>;

    /// Flag every period ending before `today` as finalized, returning how many changed
    fn mark_finalized_before(&self, user_id: i64, today: NaiveDate) -> Result<usize>;
}

pub trait CategorySpendingRepository {
    fn get_by_user_and_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<Vec<CategorySpending>>;

    fn upsert_many(&self, rows: &[CategorySpending]) -> Result<usize>;

    fn delete_for_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<usize>;
}

pub trait MerchantSpendingRepository {
    fn get_by_user_and_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<Vec<MerchantSpending>>;

    fn upsert_many(&self, rows: &[MerchantSpending]) -> Result<usize>;

    fn delete_for_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Result<usize>;
}

pub trait LifestyleBaselineRepository {
    fn get_by_user_id(&self, user_id: i64, locked_only: bool) -> Result<Vec<LifestyleBaseline>>;

    fn upsert_many(&self, rows: &[LifestyleBaseline]) -> Result<usize>;

    /// Atomically replace every baseline of `user_id` with `rows`
    fn replace_for_user(&self, user_id: i64, rows: &[LifestyleBaseline]) -> Result<usize>;

    fn lock(&self, user_id: i64) -> Result<usize>;

    fn unlock(&self, user_id: i64) -> Result<usize>;

    fn has_baselines(&self, user_id: i64) -> Result<bool>;

    fn delete_for_user(&self, user_id: i64) -> Result<usize>;
}

pub trait LifestyleCreepScoreRepository {
    fn get_by_user_and_period(
        &self,
        user_id: i64,
        period_start: NaiveDate,
    ) -> Result<Vec<LifestyleCreepScore>>;

    /// The most recent `lookback` scores of one category, newest first
    fn get_recent_scores_by_category(
        &self,
        user_id: i64,
        category: &str,
        lookback: usize,
    ) -> Result<Vec<LifestyleCreepScore>>;

    fn upsert_many(&self, rows: &[LifestyleCreepScore]) -> Result<usize>;

    fn delete_for_period(&self, user_id: i64, period_start: NaiveDate) -> Result<usize>;
}

pub trait IncomeSourceRepository {
    /// Insert or overwrite sources keyed by normalized source name
    fn upsert_from_detection(&self, sources: &[IncomeSource]) -> Result<usize>;

    fn get_by_user_id(&self, user_id: i64) -> Result<Vec<IncomeSource>>;
}

pub trait CashFlowMetricsRepository {
    fn get_by_user_and_period(
        &self,
        user_id: i64,
        period_start: NaiveDate,
    ) -> Result<Option<CashFlowMetrics>>;

    /// Metrics with `period_start` in `start..=end`, oldest first
    fn get_periods_in_range(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CashFlowMetrics>>;

    fn upsert(&self, metrics: &CashFlowMetrics) -> Result<()>;
}

pub trait RecurringStreamRepository {
    fn get_active_by_user_id(&self, user_id: i64) -> Result<Vec<RecurringStream>>;

    /// Insert or overwrite a stream by `stream_id`
    fn upsert(&self, stream: &RecurringStream) -> Result<()>;
}

pub trait ComputationLogRepository {
    fn mark_started(&self, user_id: i64, computation_type: ComputationType) -> Result<()>;

    fn mark_succeeded(
        &self,
        user_id: i64,
        computation_type: ComputationType,
        counts: ComputationCounts,
        computation_time_ms: i64,
    ) -> Result<()>;

    fn mark_failed(
        &self,
        user_id: i64,
        computation_type: ComputationType,
        error_message: &str,
        computation_time_ms: i64,
    ) -> Result<()>;

    fn get(&self, user_id: i64, computation_type: ComputationType)
        -> Result<Option<ComputationLog>>;
}

/// Repository handles injected into every engine component
///
/// Built once by the caller and passed by value (it is just references).
#[derive(Clone, Copy)]
pub struct Repositories<'a> {
    pub transactions: &'a dyn TransactionRepository,
    pub spending_periods: &'a dyn SpendingPeriodRepository,
    pub category_spending: &'a dyn CategorySpendingRepository,
    pub merchant_spending: &'a dyn MerchantSpendingRepository,
    pub baselines: &'a dyn LifestyleBaselineRepository,
    pub creep_scores: &'a dyn LifestyleCreepScoreRepository,
    pub income_sources: &'a dyn IncomeSourceRepository,
    pub cash_flow: &'a dyn CashFlowMetricsRepository,
    pub recurring_streams: &'a dyn RecurringStreamRepository,
    pub computation_log: &'a dyn ComputationLogRepository,
}

impl<'a> Repositories<'a> {
    /// Every repository backed by the same SQLite database
    pub fn sqlite(db: &'a Database) -> Self {
        Self {
            transactions: db,
            spending_periods: db,
            category_spending: db,
            merchant_spending: db,
            baselines: db,
            creep_scores: db,
            income_sources: db,
            cash_flow: db,
            recurring_streams: db,
            computation_log: db,
        }
    }

    /// Fetch every transaction matching `query`, paging `page_size` rows at a time
    pub fn all_transactions(
        &self,
        user_id: i64,
        mut query: TransactionQuery,
        page_size: i64,
    ) -> Result<Vec<Transaction>> {
        let mut all = Vec::new();
        query.limit = page_size.max(1);
        query.offset = 0;
        loop {
            let (page, total) = self.transactions.get_by_user(user_id, query)?;
            let fetched = page.len() as i64;
            all.extend(page);
            query.offset += fetched;
            if fetched == 0 || query.offset >= total {
                break;
            }
        }
        Ok(all)
    }
}
