//! Internal transfer detection
//!
//! Money moving between a user's own accounts is neither income nor spend.
//! Clean PFC categorization is trusted first; name heuristics only matter for
//! transactions the aggregator couldn't categorize.

use crate::categories::INTERNAL_TRANSFER_DETAILED;
use crate::models::Transaction;

/// Substrings that suggest a transfer in a merchant name or description
const TRANSFER_NAME_HINTS: &[&str] = &["transfer", "zelle", "venmo", "paypal", "internal", "xfer"];

/// True when the transaction's category marks it as an internal transfer
pub fn is_internal_transfer(txn: &Transaction) -> bool {
    let primary_is_transfer = txn
        .category_primary
        .as_deref()
        .map(|c| {
            let c = c.trim().to_uppercase();
            c == "TRANSFER_IN" || c == "TRANSFER_OUT"
        })
        .unwrap_or(false);

    if primary_is_transfer {
        return true;
    }

    txn.category_detailed
        .as_deref()
        .map(|d| {
            let d = d.trim().to_uppercase();
            INTERNAL_TRANSFER_DETAILED.contains(&d.as_str())
        })
        .unwrap_or(false)
}

/// Category check plus merchant/name substring heuristics
pub fn is_likely_transfer(txn: &Transaction) -> bool {
    if is_internal_transfer(txn) {
        return true;
    }

    let matches_hint = |s: &str| {
        let lower = s.to_lowercase();
        TRANSFER_NAME_HINTS.iter().any(|hint| lower.contains(hint))
    };

    txn.merchant_name.as_deref().is_some_and(matches_hint) || matches_hint(&txn.name)
}

/// Whether cash-flow totals should skip this transaction
///
/// Categorized transactions are judged by category alone so that a
/// categorized Venmo dinner still counts as spend.
pub fn should_exclude_from_cash_flow(txn: &Transaction) -> bool {
    if is_internal_transfer(txn) {
        return true;
    }
    let uncategorized = txn
        .category_primary
        .as_deref()
        .map(|c| c.trim().is_empty())
        .unwrap_or(true);
    uncategorized && is_likely_transfer(txn)
}
