//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, status, reset) and shared utilities (open_db, load_config)
//! - `import` - Ledger and recurring stream CSV import
//! - `compute` - Spending, baselines, creep, pacing and the full pipeline
//! - `reports` - Read-only views over stored analytics

pub mod compute;
pub mod core;
pub mod import;
pub mod reports;

// Re-export command functions for main.rs
pub use compute::*;
pub use core::*;
pub use import::*;
pub use reports::*;

use anyhow::Result;
use serde::Serialize;

/// How command results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Text,
    Json,
}

/// Print `value` as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
