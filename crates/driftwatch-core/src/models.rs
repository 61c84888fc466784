//! Domain models for Driftwatch
//!
//! Monetary fields are `Decimal` in ledger sign convention: negative amounts
//! are money in, positive amounts are money out.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A ledger transaction (owned by the external ledger, read-only here)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    /// Raw description from the bank feed
    pub name: String,
    pub merchant_name: Option<String>,
    pub amount: Decimal,
    pub category_primary: Option<String>,
    pub category_detailed: Option<String>,
    pub pending: bool,
}

impl Transaction {
    /// Money leaving the account
    pub fn is_outflow(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Money entering the account
    pub fn is_inflow(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Merchant name, falling back to the raw description
    pub fn display_merchant(&self) -> &str {
        self.merchant_name
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or_else(|| Some(self.name.trim()).filter(|n| !n.is_empty()))
            .unwrap_or(UNKNOWN_MERCHANT)
    }
}

/// Merchant key for transactions with neither merchant nor description
pub const UNKNOWN_MERCHANT: &str = "Unknown Merchant";

/// A transaction ready to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub user_id: i64,
    pub date: NaiveDate,
    pub name: String,
    pub merchant_name: Option<String>,
    pub amount: Decimal,
    pub category_primary: Option<String>,
    pub category_detailed: Option<String>,
    pub pending: bool,
    /// Hash for deduplication on re-import
    pub import_hash: String,
}

/// Time bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn all() -> &'static [PeriodType] {
        &[Self::Daily, Self::Weekly, Self::Monthly, Self::Yearly]
    }
}

impl std::str::FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" | "day" => Ok(Self::Daily),
            "weekly" | "week" => Ok(Self::Weekly),
            "monthly" | "month" => Ok(Self::Monthly),
            "yearly" | "year" | "annual" => Ok(Self::Yearly),
            _ => Err(format!("Unknown period type: {}", s)),
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Period-level rollup of a user's ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingPeriod {
    pub user_id: i64,
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_inflow: Decimal,
    pub total_outflow: Decimal,
    pub total_inflow_excluding_transfers: Decimal,
    pub total_outflow_excluding_transfers: Decimal,
    pub net_flow: Decimal,
    pub net_flow_excluding_transfers: Decimal,
    pub transaction_count: i64,
    pub is_finalized: bool,
}

/// Outflow rollup for one category in one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpending {
    pub user_id: i64,
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    pub category: String,
    pub total_amount: Decimal,
    pub transaction_count: i64,
    pub average_amount: Decimal,
    pub largest_transaction: Decimal,
}

/// Outflow rollup for one merchant in one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantSpending {
    pub user_id: i64,
    pub period_type: PeriodType,
    pub period_start: NaiveDate,
    pub merchant_name: String,
    pub total_amount: Decimal,
    pub transaction_count: i64,
    pub average_amount: Decimal,
    pub largest_transaction: Decimal,
}

/// Typical monthly spend for one discretionary category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifestyleBaseline {
    pub user_id: i64,
    pub category: String,
    pub baseline_monthly_amount: Decimal,
    pub standard_deviation: Option<Decimal>,
    pub baseline_start: NaiveDate,
    pub baseline_end: NaiveDate,
    /// Months in the window that had spend in this category
    pub months_count: i64,
    pub transaction_count: i64,
    pub is_locked: bool,
}

/// Severity of drift above baseline, ordered NONE < LOW < MEDIUM < HIGH
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    /// One step down, used for seasonal suppression (LOW and NONE unchanged)
    pub fn downgrade(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            other => other,
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Multi-period direction of a category's spend relative to baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    New,
    SustainedIncrease,
    SustainedDecrease,
    Fluctuating,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::SustainedIncrease => "sustained_increase",
            Self::SustainedDecrease => "sustained_decrease",
            Self::Fluctuating => "fluctuating",
        }
    }
}

impl std::str::FromStr for TrendDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "sustained_increase" => Ok(Self::SustainedIncrease),
            "sustained_decrease" => Ok(Self::SustainedDecrease),
            "fluctuating" => Ok(Self::Fluctuating),
            _ => Err(format!("Unknown trend direction: {}", s)),
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current-period drift of one category against its baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifestyleCreepScore {
    pub user_id: i64,
    pub period_start: NaiveDate,
    pub category: String,
    pub baseline_amount: Decimal,
    pub current_amount: Decimal,
    pub absolute_change: Decimal,
    pub percentage_change: Decimal,
    /// percentage_change / 10, clamped to [-100, 100]
    pub creep_score: Decimal,
    pub severity: Severity,
    pub trend_direction: TrendDirection,
    pub consecutive_months_elevated: i64,
    pub is_seasonal: bool,
}

/// How often an income source pays out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeFrequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
    Irregular,
    Unknown,
}

impl IncomeFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::SemiAnnual => "semi_annual",
            Self::Annual => "annual",
            Self::Irregular => "irregular",
            Self::Unknown => "unknown",
        }
    }

    /// Classify from the mean gap between payments
    pub fn from_mean_interval(days: f64) -> Self {
        if days <= 9.0 {
            Self::Weekly
        } else if days <= 18.0 {
            Self::Biweekly
        } else if days <= 35.0 {
            Self::Monthly
        } else if days <= 100.0 {
            Self::Quarterly
        } else if days <= 200.0 {
            Self::SemiAnnual
        } else if days <= 400.0 {
            Self::Annual
        } else {
            Self::Irregular
        }
    }

    /// Expected days until the next payment
    pub fn interval_days(&self) -> Option<i64> {
        match self {
            Self::Weekly => Some(7),
            Self::Biweekly => Some(14),
            Self::Monthly => Some(30),
            Self::Quarterly => Some(91),
            Self::SemiAnnual => Some(182),
            Self::Annual => Some(365),
            Self::Irregular | Self::Unknown => None,
        }
    }
}

impl std::str::FromStr for IncomeFrequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Self::Weekly),
            "biweekly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "semi_annual" => Ok(Self::SemiAnnual),
            "annual" => Ok(Self::Annual),
            "irregular" => Ok(Self::Irregular),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown income frequency: {}", s)),
        }
    }
}

impl std::fmt::Display for IncomeFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What kind of payer an income source looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSourceType {
    Salary,
    Freelance,
    Investment,
    Refund,
    Transfer,
    Other,
}

impl IncomeSourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Salary => "salary",
            Self::Freelance => "freelance",
            Self::Investment => "investment",
            Self::Refund => "refund",
            Self::Transfer => "transfer",
            Self::Other => "other",
        }
    }

    /// Confidence contribution for the source type (salary highest)
    pub fn confidence_weight(&self) -> Decimal {
        match self {
            Self::Salary => dec!(1.0),
            Self::Investment => dec!(0.8),
            Self::Freelance => dec!(0.7),
            Self::Other => dec!(0.5),
            Self::Transfer => dec!(0.4),
            Self::Refund => dec!(0.3),
        }
    }
}

impl std::str::FromStr for IncomeSourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "salary" => Ok(Self::Salary),
            "freelance" => Ok(Self::Freelance),
            "investment" => Ok(Self::Investment),
            "refund" => Ok(Self::Refund),
            "transfer" => Ok(Self::Transfer),
            "other" => Ok(Self::Other),
            _ => Err(format!("Unknown income source type: {}", s)),
        }
    }
}

impl std::fmt::Display for IncomeSourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recurring income source inferred from the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeSource {
    pub user_id: i64,
    /// Normalized grouping key
    pub source_name: String,
    /// Most recent raw name seen for the source
    pub display_name: String,
    pub source_type: IncomeSourceType,
    pub average_amount: Decimal,
    pub last_amount: Decimal,
    pub frequency: IncomeFrequency,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub next_expected_date: Option<NaiveDate>,
    pub transaction_count: i64,
    /// Composite confidence in [0, 1], 2 decimal places
    pub confidence_score: f64,
    pub is_active: bool,
}

/// Per-month cash flow summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowMetrics {
    pub user_id: i64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub net_cash_flow: Decimal,
    /// (income - expenses) / income clamped to [-1, 1]; None without income
    pub savings_rate: Option<Decimal>,
    pub recurring_expenses: Decimal,
    pub discretionary_expenses: Decimal,
    pub largest_expense_category: Option<String>,
    pub largest_expense_amount: Option<Decimal>,
    pub transfers_excluded: i64,
}

/// Direction of a recurring stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    Inflow,
    Outflow,
}

impl FlowDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inflow => "inflow",
            Self::Outflow => "outflow",
        }
    }
}

impl std::str::FromStr for FlowDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inflow" => Ok(Self::Inflow),
            "outflow" => Ok(Self::Outflow),
            _ => Err(format!("Unknown flow direction: {}", s)),
        }
    }
}

/// A recurring stream reported by the bank-data aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringStream {
    pub stream_id: String,
    pub user_id: i64,
    pub description: String,
    pub merchant_name: Option<String>,
    pub direction: FlowDirection,
    pub last_amount: Decimal,
    pub is_active: bool,
}

/// Outcome status of a computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputationStatus {
    Success,
    Failed,
}

impl ComputationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ComputationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of computation tracked in the computation log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationType {
    SpendingFull,
    SpendingIncremental,
    Baselines,
    CashFlow,
    LifestyleCreep,
}

impl ComputationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpendingFull => "spending_full",
            Self::SpendingIncremental => "spending_incremental",
            Self::Baselines => "baselines",
            Self::CashFlow => "cash_flow",
            Self::LifestyleCreep => "lifestyle_creep",
        }
    }
}

impl std::str::FromStr for ComputationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "spending_full" => Ok(Self::SpendingFull),
            "spending_incremental" => Ok(Self::SpendingIncremental),
            "baselines" => Ok(Self::Baselines),
            "cash_flow" => Ok(Self::CashFlow),
            "lifestyle_creep" => Ok(Self::LifestyleCreep),
            _ => Err(format!("Unknown computation type: {}", s)),
        }
    }
}

impl std::fmt::Display for ComputationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of a computation-log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    InProgress,
    Success,
    Failed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown log status: {}", s)),
        }
    }
}

/// Counts recorded when a computation succeeds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationCounts {
    pub periods: i64,
    pub categories: i64,
    pub merchants: i64,
    pub transactions: i64,
}

/// Last run of a computation for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationLog {
    pub user_id: i64,
    pub computation_type: ComputationType,
    pub status: LogStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counts: ComputationCounts,
    pub computation_time_ms: Option<i64>,
    pub error_message: Option<String>,
}
