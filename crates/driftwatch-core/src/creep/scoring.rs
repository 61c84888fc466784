//! Per-category creep arithmetic
//!
//! Everything here is pure and total: zero baselines and missing standard
//! deviations have defined results instead of errors.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::categories::Category;
use crate::models::{LifestyleBaseline, LifestyleCreepScore, Severity, TrendDirection};
use crate::money::{clamp, round2};

// z-score buckets (used when the baseline has a nonzero standard deviation)
const Z_HIGH: Decimal = dec!(2.0);
const Z_MEDIUM: Decimal = dec!(1.5);
const Z_LOW: Decimal = dec!(1.0);

// percentage buckets for a single category without spread information
const PCT_HIGH: Decimal = dec!(60);
const PCT_MEDIUM: Decimal = dec!(35);
const PCT_LOW: Decimal = dec!(15);

// aggregate buckets for an overall creep percentage
const AGG_LOW: Decimal = dec!(10);
const AGG_MEDIUM: Decimal = dec!(25);
const AGG_HIGH: Decimal = dec!(50);

/// Multiplier on baseline that counts as elevated when spread is unknown
const ELEVATED_RATIO: Decimal = dec!(1.15);

/// Weight multiplier for categories on a sustained increase
const SUSTAINED_WEIGHT: Decimal = dec!(1.5);

/// Standard deviation usable for z-scores and thresholds
fn usable_std_dev(std_dev: Option<Decimal>) -> Option<Decimal> {
    std_dev.filter(|s| *s > Decimal::ZERO)
}

/// `(current - baseline) / baseline * 100`, 2 places
///
/// A zero baseline reads as 100% growth when there is any current spend.
pub fn percentage_change(baseline: Decimal, current: Decimal) -> Decimal {
    if baseline.is_zero() {
        return if current > Decimal::ZERO {
            dec!(100)
        } else {
            Decimal::ZERO
        };
    }
    round2((current - baseline) / baseline * dec!(100))
}

/// `percentage_change / 10` clamped to [-100, 100]
pub fn creep_score(percentage_change: Decimal) -> Decimal {
    round2(clamp(percentage_change / dec!(10), dec!(-100), dec!(100)))
}

/// Severity of one category's current spend against its baseline
pub fn category_severity(
    baseline: Decimal,
    current: Decimal,
    std_dev: Option<Decimal>,
) -> Severity {
    if baseline <= Decimal::ZERO || current <= baseline {
        return Severity::None;
    }

    if let Some(std_dev) = usable_std_dev(std_dev) {
        let z = (current - baseline) / std_dev;
        return if z >= Z_HIGH {
            Severity::High
        } else if z >= Z_MEDIUM {
            Severity::Medium
        } else if z >= Z_LOW {
            Severity::Low
        } else {
            Severity::None
        };
    }

    let pct = (current - baseline) / baseline * dec!(100);
    if pct >= PCT_HIGH {
        Severity::High
    } else if pct >= PCT_MEDIUM {
        Severity::Medium
    } else if pct >= PCT_LOW {
        Severity::Low
    } else {
        Severity::None
    }
}

/// Severity of an overall creep percentage
pub fn aggregate_severity(percentage: Decimal) -> Severity {
    if percentage < AGG_LOW {
        Severity::None
    } else if percentage < AGG_MEDIUM {
        Severity::Low
    } else if percentage < AGG_HIGH {
        Severity::Medium
    } else {
        Severity::High
    }
}

/// Step severity down one level when the month is in the category's season
///
/// Returns the adjusted severity and whether the month was seasonal.
pub fn apply_seasonality(category: &Category, month: u32, severity: Severity) -> (Severity, bool) {
    if category.is_seasonal_month(month) {
        (severity.downgrade(), true)
    } else {
        (severity, false)
    }
}

/// Direction of spend over recent periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    pub consecutive_months_elevated: i64,
}

/// Amount at or above which a month counts as elevated
pub fn elevated_threshold(baseline: Decimal, std_dev: Option<Decimal>) -> Decimal {
    match usable_std_dev(std_dev) {
        Some(std_dev) => baseline + std_dev * dec!(0.5),
        None => baseline * ELEVATED_RATIO,
    }
}

/// Classify a history of monthly amounts, most recent first
pub fn analyze_trend(
    history: &[Decimal],
    baseline: Decimal,
    std_dev: Option<Decimal>,
) -> TrendAnalysis {
    if history.len() < 2 {
        return TrendAnalysis {
            direction: TrendDirection::New,
            consecutive_months_elevated: 0,
        };
    }

    let threshold = elevated_threshold(baseline, std_dev);
    let elevated = history.iter().filter(|a| **a >= threshold).count() as i64;

    if elevated >= 3 {
        return TrendAnalysis {
            direction: TrendDirection::SustainedIncrease,
            consecutive_months_elevated: elevated,
        };
    }

    let direction = if history.iter().all(|a| *a < baseline) {
        TrendDirection::SustainedDecrease
    } else {
        TrendDirection::Fluctuating
    };
    TrendAnalysis {
        direction,
        consecutive_months_elevated: history.iter().take_while(|a| **a >= threshold).count()
            as i64,
    }
}

/// Score one category for a monthly period
///
/// `history` is the current amount followed by earlier months' amounts, most
/// recent first. A missing baseline scores against zero.
pub fn score_category(
    user_id: i64,
    period_start: NaiveDate,
    category: &str,
    baseline: Option<&LifestyleBaseline>,
    current: Decimal,
    history: &[Decimal],
) -> LifestyleCreepScore {
    let baseline_amount = baseline
        .map(|b| b.baseline_monthly_amount)
        .unwrap_or(Decimal::ZERO);
    let std_dev = baseline.and_then(|b| b.standard_deviation);

    let pct = percentage_change(baseline_amount, current);
    let raw_severity = category_severity(baseline_amount, current, std_dev);
    let (severity, is_seasonal) = apply_seasonality(
        &Category::from_code(Some(category)),
        period_start.month(),
        raw_severity,
    );
    let trend = analyze_trend(history, baseline_amount, std_dev);

    LifestyleCreepScore {
        user_id,
        period_start,
        category: category.to_string(),
        baseline_amount: round2(baseline_amount),
        current_amount: round2(current),
        absolute_change: round2(current - baseline_amount),
        percentage_change: pct,
        creep_score: creep_score(pct),
        severity,
        trend_direction: trend.direction,
        consecutive_months_elevated: trend.consecutive_months_elevated,
        is_seasonal,
    }
}

/// Baseline-weighted average of positive percentage changes, 2 places
///
/// Sustained increases weigh 1.5x. Zero when nothing is creeping.
pub fn overall_percentage<'s>(scores: impl IntoIterator<Item = &'s LifestyleCreepScore>) -> Decimal {
    let mut weighted = Decimal::ZERO;
    let mut total_weight = Decimal::ZERO;

    for score in scores {
        if score.percentage_change <= Decimal::ZERO || score.baseline_amount <= Decimal::ZERO {
            continue;
        }
        let mut weight = score.baseline_amount;
        if score.trend_direction == TrendDirection::SustainedIncrease {
            weight *= SUSTAINED_WEIGHT;
        }
        weighted += score.percentage_change * weight;
        total_weight += weight;
    }

    if total_weight.is_zero() {
        Decimal::ZERO
    } else {
        round2(weighted / total_weight)
    }
}
