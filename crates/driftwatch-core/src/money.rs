//! Decimal helpers shared by the aggregation and scoring code
//!
//! Amounts are carried at full precision through intermediate arithmetic and
//! rounded half-up only where a value is persisted or returned.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Round half-up (away from zero) to 2 decimal places
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Round half-up to an arbitrary number of places
pub fn round_dp(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
}

/// Clamp a decimal into `[min, max]`
pub fn clamp(value: Decimal, min: Decimal, max: Decimal) -> Decimal {
    value.max(min).min(max)
}

/// Divide, returning `None` instead of panicking on a zero divisor
pub fn checked_ratio(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator.is_zero() {
        None
    } else {
        numerator.checked_div(denominator)
    }
}

/// `part / whole * 100`, or zero when `whole` is zero
pub fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    checked_ratio(part, whole)
        .map(|r| r * dec!(100))
        .unwrap_or(Decimal::ZERO)
}

/// Arithmetic mean, zero for an empty slice
pub fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().sum::<Decimal>() / Decimal::from(values.len())
}

/// Population standard deviation
///
/// Returns `None` for fewer than two values.
pub fn population_std_dev(values: &[Decimal]) -> Option<Decimal> {
    use rust_decimal::MathematicalOps;

    if values.len() < 2 {
        return None;
    }
    let avg = mean(values);
    let variance = values
        .iter()
        .map(|v| (*v - avg) * (*v - avg))
        .sum::<Decimal>()
        / Decimal::from(values.len());
    variance.sqrt()
}

/// Lossy conversion for display-only ratios
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
