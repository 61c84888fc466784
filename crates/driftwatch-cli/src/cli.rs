//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Driftwatch - Catch lifestyle creep before it becomes the new normal
#[derive(Parser)]
#[command(name = "driftwatch")]
#[command(about = "Spending drift and lifestyle creep analytics", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "driftwatch.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine config override (defaults to the data-dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Evaluate as of this date instead of today (YYYY-MM-DD)
    #[arg(long, global = true)]
    pub today: Option<NaiveDate>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Import a ledger CSV
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,

        /// The file holds recurring streams rather than transactions
        ///
        /// Columns: stream_id,user_id,description,merchant_name,direction,last_amount,is_active
        #[arg(long)]
        streams: bool,
    },

    /// Recompute spending rollups
    Compute {
        /// User ID
        #[arg(short, long)]
        user: i64,

        /// Rebuild every period instead of the current and previous ones
        #[arg(long)]
        full: bool,
    },

    /// Compute, lock or unlock lifestyle baselines
    Baselines {
        /// User ID
        #[arg(short, long)]
        user: i64,

        /// Replace existing (even locked) baselines
        #[arg(long, conflicts_with_all = ["lock", "unlock"])]
        force: bool,

        /// Lock the current baselines without recomputing
        #[arg(long, conflicts_with = "unlock")]
        lock: bool,

        /// Unlock the current baselines without recomputing
        #[arg(long)]
        unlock: bool,
    },

    /// Score lifestyle creep for a month
    Creep {
        /// User ID
        #[arg(short, long)]
        user: i64,

        /// Month to score (YYYY-MM or YYYY-MM-DD); defaults to last month
        #[arg(short, long, value_parser = parse_month)]
        period: Option<NaiveDate>,
    },

    /// Show month-to-date pacing against baselines
    Pacing {
        /// User ID
        #[arg(short, long)]
        user: i64,
    },

    /// Show stored analytics
    Report {
        #[command(subcommand)]
        report_type: ReportType,
    },

    /// Run the whole pipeline (spending, cash flow, baselines, creep)
    Run {
        /// User ID
        #[arg(short, long, required_unless_present = "all_users", conflicts_with = "all_users")]
        user: Option<i64>,

        /// Run every user in the ledger concurrently
        #[arg(long)]
        all_users: bool,

        /// Rebuild every period instead of the current and previous ones
        #[arg(long)]
        full: bool,
    },

    /// Show ledger size and last computation runs for a user
    Status {
        /// User ID
        #[arg(short, long)]
        user: i64,
    },

    /// Clear every derived table (the ledger is kept)
    Reset {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum ReportType {
    /// Spending totals per period
    Spending {
        /// User ID
        #[arg(short, long)]
        user: i64,

        /// Period type: daily, weekly, monthly, yearly
        #[arg(long, default_value = "monthly")]
        period_type: String,

        /// Number of most recent periods to show
        #[arg(short, long, default_value = "6")]
        limit: usize,
    },

    /// Detected income sources
    Income {
        /// User ID
        #[arg(short, long)]
        user: i64,
    },

    /// Monthly cash flow and savings rate
    CashFlow {
        /// User ID
        #[arg(short, long)]
        user: i64,

        /// Number of months to show, ending with the current month
        #[arg(short, long, default_value = "6")]
        months: u32,
    },

    /// Stored creep scores with top creeping categories
    Creep {
        /// User ID
        #[arg(short, long)]
        user: i64,

        /// Month to summarize (YYYY-MM or YYYY-MM-DD); defaults to last month
        #[arg(short, long, value_parser = parse_month)]
        period: Option<NaiveDate>,
    },
}

/// Parse `YYYY-MM` or `YYYY-MM-DD`
pub fn parse_month(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d"))
        .map_err(|_| format!("Invalid month '{}' (use YYYY-MM or YYYY-MM-DD)", s))
}
