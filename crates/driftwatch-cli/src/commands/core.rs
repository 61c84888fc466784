//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Engine config resolution
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Ledger size and last runs for a user
//! - `cmd_reset` - Clear derived tables

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use driftwatch_core::models::ComputationType;
use driftwatch_core::{db::Database, EngineConfig, Repositories};

/// Open the database, applying migrations
pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    Database::new(path_str).context("Failed to open database")
}

/// Load engine thresholds from an explicit path, or the default override location
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load_from(p)
            .with_context(|| format!("Failed to load config from {}", p.display())),
        None => EngineConfig::load().context("Failed to load engine config"),
    }
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path)?;

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Import transactions: driftwatch import --file ledger.csv");
    println!("  2. Run analytics: driftwatch run --user 1 --full");

    Ok(())
}

pub fn cmd_status(db: &Database, user_id: i64) -> Result<()> {
    let repos = Repositories::sqlite(db);

    println!();
    println!("📊 Driftwatch Status (user {})", user_id);
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Database: {}", db.path());
    println!("   Transactions: {}", db.count_transactions(user_id)?);
    match repos.transactions.date_range(user_id)? {
        Some((first, last)) => println!("   Ledger range: {} to {}", first, last),
        None => println!("   Ledger range: (no transactions)"),
    }
    println!(
        "   Baselines: {}",
        if repos.baselines.has_baselines(user_id)? {
            "computed"
        } else {
            "not computed"
        }
    );

    println!();
    println!("   {:22} │ {:9} │ {:19} │ {:>8}", "Computation", "Status", "Started", "Time");
    println!("   ───────────────────────┼───────────┼─────────────────────┼─────────");
    for computation_type in [
        ComputationType::SpendingFull,
        ComputationType::SpendingIncremental,
        ComputationType::CashFlow,
        ComputationType::Baselines,
        ComputationType::LifestyleCreep,
    ] {
        match repos.computation_log.get(user_id, computation_type)? {
            Some(log) => println!(
                "   {:22} │ {:9} │ {:19} │ {:>6}ms",
                computation_type.as_str(),
                log.status.as_str(),
                log.started_at.format("%Y-%m-%d %H:%M:%S"),
                log.computation_time_ms.unwrap_or(0)
            ),
            None => println!(
                "   {:22} │ {:9} │ {:19} │ {:>8}",
                computation_type.as_str(),
                "never",
                "-",
                "-"
            ),
        }
    }

    Ok(())
}

pub fn cmd_reset(db: &Database, yes: bool) -> Result<()> {
    if !yes {
        print!("⚠️  This will delete every computed rollup, baseline, score and log entry.\n");
        print!("   Imported transactions and recurring streams will be preserved.\n\n");
        print!("Are you sure? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    db.reset_derived().context("Failed to clear derived tables")?;

    println!("✅ Derived analytics cleared.");
    println!("   Preserved: transactions, recurring streams");
    println!("   Run 'driftwatch run --all-users --full' to rebuild.");

    Ok(())
}
