//! Live-month pacing
//!
//! Early in a month there is too little spend to judge drift, so the view
//! shifts with the day of the month: KICKOFF shows targets, PACING compares
//! spend against the elapsed share of the month, and STABILITY adds a 0-100
//! score from the month-to-date spend projected over the whole month.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use super::scoring::{aggregate_severity, overall_percentage, score_category};
use crate::config::CreepConfig;
use crate::models::{LifestyleBaseline, LifestyleCreepScore, PeriodType, Severity};
use crate::money::{clamp, percent_of, round2, round_dp};
use crate::period;

const KICKOFF_LAST_DAY: u32 = 3;
const PACING_LAST_DAY: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacingMode {
    Kickoff,
    Pacing,
    Stability,
}

impl PacingMode {
    pub fn for_day(day_of_month: u32) -> Self {
        if day_of_month <= KICKOFF_LAST_DAY {
            Self::Kickoff
        } else if day_of_month <= PACING_LAST_DAY {
            Self::Pacing
        } else {
            Self::Stability
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kickoff => "KICKOFF",
            Self::Pacing => "PACING",
            Self::Stability => "STABILITY",
        }
    }
}

impl std::fmt::Display for PacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PacingStatus {
    Ahead,
    OnTrack,
    Behind,
}

impl PacingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ahead => "AHEAD",
            Self::OnTrack => "ON_TRACK",
            Self::Behind => "BEHIND",
        }
    }
}

impl std::fmt::Display for PacingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One category's month-to-date position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryPacing {
    pub category: String,
    pub baseline_amount: Decimal,
    pub current_amount: Decimal,
    pub projected_amount: Decimal,
}

/// Pacing view of the current month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacingResponse {
    pub user_id: i64,
    pub period_start: NaiveDate,
    pub as_of: NaiveDate,
    pub mode: PacingMode,
    pub days_into_period: i64,
    pub days_in_period: i64,
    /// Sum of baseline monthly amounts
    pub target_amount: Decimal,
    /// Discretionary spend so far this month
    pub current_amount: Decimal,
    pub pacing_percentage: Decimal,
    pub expected_percentage: Decimal,
    pub status: PacingStatus,
    /// Only in STABILITY mode
    pub stability_score: Option<i64>,
    pub projected_creep_percentage: Option<Decimal>,
    pub categories: Vec<CategoryPacing>,
    pub message: Option<String>,
}

/// AHEAD when spend outruns the calendar by more than `tolerance` points
pub fn pacing_status(pacing: Decimal, expected: Decimal, tolerance: Decimal) -> PacingStatus {
    let diff = pacing - expected;
    if diff > tolerance {
        PacingStatus::Ahead
    } else if diff < -tolerance {
        PacingStatus::Behind
    } else {
        PacingStatus::OnTrack
    }
}

/// Scale a month-to-date amount to the full month
pub fn project_to_month(amount: Decimal, days_into: i64, days_in_month: i64) -> Decimal {
    if days_into <= 0 {
        return amount;
    }
    amount * Decimal::from(days_in_month) / Decimal::from(days_into)
}

/// `round(100 - creep%)` in [0, 100], capped while drift is already elevated
pub fn stability_score(creep_percentage: Decimal, severity: Severity, cap: i64) -> i64 {
    let raw = round_dp(clamp(dec!(100) - creep_percentage, Decimal::ZERO, dec!(100)), 0)
        .to_i64()
        .unwrap_or(0);
    if severity >= Severity::Medium {
        raw.min(cap)
    } else {
        raw
    }
}

/// Build the pacing view from baselines and month-to-date discretionary spend
///
/// `prior_severity` is the overall severity of the latest scored month.
pub fn evaluate(
    user_id: i64,
    today: NaiveDate,
    baselines: &[LifestyleBaseline],
    month_to_date: &BTreeMap<String, Decimal>,
    prior_severity: Severity,
    config: &CreepConfig,
) -> PacingResponse {
    let period_start = period::period_start(today, PeriodType::Monthly);
    let days_in_period = period::days_in_month(today);
    let days_into = i64::from(today.day());
    let mode = PacingMode::for_day(today.day());

    let by_category: BTreeMap<&str, &LifestyleBaseline> =
        baselines.iter().map(|b| (b.category.as_str(), b)).collect();

    let mut keys: Vec<&str> = by_category.keys().copied().collect();
    for category in month_to_date.keys() {
        if !by_category.contains_key(category.as_str()) {
            keys.push(category.as_str());
        }
    }
    keys.sort_unstable();

    let categories: Vec<CategoryPacing> = keys
        .into_iter()
        .map(|category| {
            let current = month_to_date.get(category).copied().unwrap_or(Decimal::ZERO);
            CategoryPacing {
                category: category.to_string(),
                baseline_amount: by_category
                    .get(category)
                    .map(|b| b.baseline_monthly_amount)
                    .unwrap_or(Decimal::ZERO),
                current_amount: round2(current),
                projected_amount: round2(project_to_month(current, days_into, days_in_period)),
            }
        })
        .collect();

    let target: Decimal = baselines.iter().map(|b| b.baseline_monthly_amount).sum();
    let current: Decimal = month_to_date.values().copied().sum();
    let pacing_percentage = round2(percent_of(current, target));
    let expected_percentage = round2(percent_of(
        Decimal::from(days_into),
        Decimal::from(days_in_period),
    ));

    let (stability, projected_creep) = if mode == PacingMode::Stability {
        let projected: Vec<LifestyleCreepScore> = categories
            .iter()
            .map(|c| {
                score_category(
                    user_id,
                    period_start,
                    &c.category,
                    by_category.get(c.category.as_str()).copied(),
                    c.projected_amount,
                    &[c.projected_amount],
                )
            })
            .collect();
        let creep = overall_percentage(&projected);
        let severity = aggregate_severity(creep).max(prior_severity);
        (
            Some(stability_score(creep, severity, config.elevated_stability_cap)),
            Some(creep),
        )
    } else {
        (None, None)
    };

    PacingResponse {
        user_id,
        period_start,
        as_of: today,
        mode,
        days_into_period: days_into,
        days_in_period,
        target_amount: round2(target),
        current_amount: round2(current),
        pacing_percentage,
        expected_percentage,
        status: pacing_status(pacing_percentage, expected_percentage, config.pacing_tolerance),
        stability_score: stability,
        projected_creep_percentage: projected_creep,
        categories,
        message: baselines
            .is_empty()
            .then(|| "No baselines yet; pacing has no target".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(category: &str, amount: Decimal) -> LifestyleBaseline {
        LifestyleBaseline {
            user_id: 1,
            category: category.to_string(),
            baseline_monthly_amount: amount,
            standard_deviation: None,
            baseline_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            baseline_end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            months_count: 3,
            transaction_count: 12,
            is_locked: true,
        }
    }

    fn spend(entries: &[(&str, Decimal)]) -> BTreeMap<String, Decimal> {
        entries.iter().map(|(c, a)| (c.to_string(), *a)).collect()
    }

    #[test]
    fn test_mode_boundaries() {
        assert_eq!(PacingMode::for_day(1), PacingMode::Kickoff);
        assert_eq!(PacingMode::for_day(3), PacingMode::Kickoff);
        assert_eq!(PacingMode::for_day(4), PacingMode::Pacing);
        assert_eq!(PacingMode::for_day(7), PacingMode::Pacing);
        assert_eq!(PacingMode::for_day(8), PacingMode::Stability);
    }

    #[test]
    fn test_status_tolerance() {
        let tol = dec!(5);
        assert_eq!(pacing_status(dec!(60), dec!(50), tol), PacingStatus::Ahead);
        assert_eq!(pacing_status(dec!(55), dec!(50), tol), PacingStatus::OnTrack);
        assert_eq!(pacing_status(dec!(45), dec!(50), tol), PacingStatus::OnTrack);
        assert_eq!(pacing_status(dec!(44.99), dec!(50), tol), PacingStatus::Behind);
    }

    #[test]
    fn test_stability_score_bounds_and_cap() {
        assert_eq!(stability_score(dec!(0), Severity::None, 85), 100);
        assert_eq!(stability_score(dec!(-20), Severity::None, 85), 100);
        assert_eq!(stability_score(dec!(12.5), Severity::Low, 85), 88);
        assert_eq!(stability_score(dec!(12.5), Severity::Medium, 85), 85);
        assert_eq!(stability_score(dec!(250), Severity::High, 85), 0);
    }

    #[test]
    fn test_kickoff_has_no_stability() {
        let config = CreepConfig::default();
        let today = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let response = evaluate(
            1,
            today,
            &[baseline("FOOD_AND_DRINK", dec!(400))],
            &spend(&[("FOOD_AND_DRINK", dec!(20))]),
            Severity::None,
            &config,
        );
        assert_eq!(response.mode, PacingMode::Kickoff);
        assert_eq!(response.stability_score, None);
        assert_eq!(response.target_amount, dec!(400));
        assert_eq!(response.pacing_percentage, dec!(5));
        assert_eq!(response.expected_percentage, dec!(6.67));
        assert_eq!(response.status, PacingStatus::OnTrack);
    }

    #[test]
    fn test_stability_projects_month_to_date() {
        let config = CreepConfig::default();
        // 15 of 30 days: 250 so far projects to 500 against a 400 baseline
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let response = evaluate(
            1,
            today,
            &[baseline("FOOD_AND_DRINK", dec!(400))],
            &spend(&[("FOOD_AND_DRINK", dec!(250)), ("TRAVEL", dec!(30))]),
            Severity::None,
            &config,
        );
        assert_eq!(response.mode, PacingMode::Stability);
        assert_eq!(response.days_in_period, 30);
        assert_eq!(response.current_amount, dec!(280));
        assert_eq!(response.pacing_percentage, dec!(70));
        assert_eq!(response.expected_percentage, dec!(50));
        assert_eq!(response.status, PacingStatus::Ahead);
        assert_eq!(response.projected_creep_percentage, Some(dec!(25)));
        // 25% projected creep is MEDIUM, so the cap applies on top of 75
        assert_eq!(response.stability_score, Some(75));
        assert_eq!(response.categories.len(), 2);
        assert_eq!(response.categories[0].projected_amount, dec!(500));
        assert_eq!(response.categories[1].baseline_amount, dec!(0));
    }

    #[test]
    fn test_prior_severity_caps_quiet_month() {
        let config = CreepConfig::default();
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let response = evaluate(
            1,
            today,
            &[baseline("FOOD_AND_DRINK", dec!(400))],
            &spend(&[("FOOD_AND_DRINK", dec!(200))]),
            Severity::High,
            &config,
        );
        assert_eq!(response.projected_creep_percentage, Some(dec!(0)));
        assert_eq!(response.stability_score, Some(85));
    }

    #[test]
    fn test_no_baselines_message() {
        let config = CreepConfig::default();
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let response = evaluate(1, today, &[], &BTreeMap::new(), Severity::None, &config);
        assert!(response.message.is_some());
        assert_eq!(response.pacing_percentage, dec!(0));
        assert_eq!(response.stability_score, Some(100));
    }
}
