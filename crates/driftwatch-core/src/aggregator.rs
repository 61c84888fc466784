//! Spending aggregation
//!
//! Folds one period's transactions into period totals plus per-category and
//! per-merchant outflow rollups. Nothing here touches storage; the
//! computation manager persists the result.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::categories::Category;
use crate::models::{CategorySpending, MerchantSpending, PeriodType, SpendingPeriod, Transaction};
use crate::money::round2;
use crate::period;
use crate::transfer::is_internal_transfer;

/// Running totals for one category or merchant
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Accumulator {
    pub key: String,
    pub total_amount: Decimal,
    pub transaction_count: i64,
    pub largest_transaction: Decimal,
}

impl Accumulator {
    fn new(key: String) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }

    fn add(&mut self, amount: Decimal) {
        self.total_amount += amount;
        self.transaction_count += 1;
        if amount > self.largest_transaction {
            self.largest_transaction = amount;
        }
    }

    /// total / count, half-up to 2 places
    pub fn average_amount(&self) -> Decimal {
        if self.transaction_count == 0 {
            return Decimal::ZERO;
        }
        round2(self.total_amount / Decimal::from(self.transaction_count))
    }
}

/// Period-level totals
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PeriodTotals {
    pub total_inflow: Decimal,
    pub total_outflow: Decimal,
    pub total_inflow_excluding_transfers: Decimal,
    pub total_outflow_excluding_transfers: Decimal,
    pub transaction_count: i64,
}

impl PeriodTotals {
    pub fn net_flow(&self) -> Decimal {
        self.total_inflow - self.total_outflow
    }

    pub fn net_flow_excluding_transfers(&self) -> Decimal {
        self.total_inflow_excluding_transfers - self.total_outflow_excluding_transfers
    }
}

/// Output of aggregating one period
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregationResult {
    pub totals: PeriodTotals,
    /// Sorted by total descending, then category
    pub categories: Vec<Accumulator>,
    /// Sorted by total descending, then merchant
    pub merchants: Vec<Accumulator>,
}

impl AggregationResult {
    /// Period row for persistence
    pub fn to_spending_period(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
        today: NaiveDate,
    ) -> SpendingPeriod {
        let t = &self.totals;
        SpendingPeriod {
            user_id,
            period_type,
            period_start,
            period_end: period::period_end(period_start, period_type),
            total_inflow: round2(t.total_inflow),
            total_outflow: round2(t.total_outflow),
            total_inflow_excluding_transfers: round2(t.total_inflow_excluding_transfers),
            total_outflow_excluding_transfers: round2(t.total_outflow_excluding_transfers),
            net_flow: round2(t.net_flow()),
            net_flow_excluding_transfers: round2(t.net_flow_excluding_transfers()),
            transaction_count: t.transaction_count,
            is_finalized: period::is_finalized(period_start, period_type, today),
        }
    }

    /// Category rows for persistence
    pub fn to_category_spending(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Vec<CategorySpending> {
        self.categories
            .iter()
            .map(|acc| CategorySpending {
                user_id,
                period_type,
                period_start,
                category: acc.key.clone(),
                total_amount: round2(acc.total_amount),
                transaction_count: acc.transaction_count,
                average_amount: acc.average_amount(),
                largest_transaction: round2(acc.largest_transaction),
            })
            .collect()
    }

    /// Merchant rows for persistence
    pub fn to_merchant_spending(
        &self,
        user_id: i64,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> Vec<MerchantSpending> {
        self.merchants
            .iter()
            .map(|acc| MerchantSpending {
                user_id,
                period_type,
                period_start,
                merchant_name: acc.key.clone(),
                total_amount: round2(acc.total_amount),
                transaction_count: acc.transaction_count,
                average_amount: acc.average_amount(),
                largest_transaction: round2(acc.largest_transaction),
            })
            .collect()
    }
}

/// Aggregate one period's transactions
///
/// Callers are expected to pass only the period's transactions; no date
/// filtering happens here.
pub fn aggregate<'t>(transactions: impl IntoIterator<Item = &'t Transaction>) -> AggregationResult {
    let mut totals = PeriodTotals::default();
    let mut categories: HashMap<String, Accumulator> = HashMap::new();
    let mut merchants: HashMap<String, Accumulator> = HashMap::new();

    for txn in transactions {
        totals.transaction_count += 1;
        let transfer = is_internal_transfer(txn);

        if txn.is_inflow() {
            let inflow = -txn.amount;
            totals.total_inflow += inflow;
            if !transfer {
                totals.total_inflow_excluding_transfers += inflow;
            }
            continue;
        }

        if !txn.is_outflow() {
            continue;
        }

        totals.total_outflow += txn.amount;
        if !transfer {
            totals.total_outflow_excluding_transfers += txn.amount;
        }

        let category = Category::from_code(txn.category_primary.as_deref())
            .as_str()
            .to_string();
        categories
            .entry(category.clone())
            .or_insert_with(|| Accumulator::new(category))
            .add(txn.amount);

        let merchant = txn.display_merchant().to_string();
        merchants
            .entry(merchant.clone())
            .or_insert_with(|| Accumulator::new(merchant))
            .add(txn.amount);
    }

    AggregationResult {
        totals,
        categories: sorted(categories),
        merchants: sorted(merchants),
    }
}

fn sorted(map: HashMap<String, Accumulator>) -> Vec<Accumulator> {
    let mut list: Vec<Accumulator> = map.into_values().collect();
    list.sort_by(|a, b| {
        b.total_amount
            .cmp(&a.total_amount)
            .then_with(|| a.key.cmp(&b.key))
    });
    list
}
