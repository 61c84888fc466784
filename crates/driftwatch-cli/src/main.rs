//! Driftwatch CLI - Lifestyle creep analytics
//!
//! Usage:
//!   driftwatch init                       Initialize database
//!   driftwatch import --file ledger.csv   Import transactions
//!   driftwatch run --user 1 --full        Run every computation for a user
//!   driftwatch report creep --user 1      Show the latest creep summary

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let today = cli.today.unwrap_or_else(|| Utc::now().date_naive());
    let output = if cli.json {
        commands::Output::Json
    } else {
        commands::Output::Text
    };

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db)?,
        Commands::Import { file, streams } => {
            let db = commands::open_db(&cli.db)?;
            if streams {
                commands::cmd_import_streams(&db, &file)?;
            } else {
                commands::cmd_import(&db, &file)?;
            }
        }
        Commands::Compute { user, full } => {
            let db = commands::open_db(&cli.db)?;
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_compute(&db, &config, today, user, full, output)?;
        }
        Commands::Baselines {
            user,
            force,
            lock,
            unlock,
        } => {
            let db = commands::open_db(&cli.db)?;
            let config = commands::load_config(cli.config.as_deref())?;
            if lock {
                commands::cmd_baselines_lock(&db, &config, today, user, true)?;
            } else if unlock {
                commands::cmd_baselines_lock(&db, &config, today, user, false)?;
            } else {
                commands::cmd_baselines(&db, &config, today, user, force, output)?;
            }
        }
        Commands::Creep { user, period } => {
            let db = commands::open_db(&cli.db)?;
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_creep(&db, &config, today, user, period, output)?;
        }
        Commands::Pacing { user } => {
            let db = commands::open_db(&cli.db)?;
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_pacing(&db, &config, today, user, output)?;
        }
        Commands::Report { report_type } => {
            let db = commands::open_db(&cli.db)?;
            match report_type {
                ReportType::Spending {
                    user,
                    period_type,
                    limit,
                } => {
                    let period_type: driftwatch_core::models::PeriodType = period_type
                        .parse()
                        .map_err(|e: String| anyhow::anyhow!(e))?;
                    commands::cmd_report_spending(&db, user, period_type, limit, output)?;
                }
                ReportType::Income { user } => {
                    commands::cmd_report_income(&db, user, output)?;
                }
                ReportType::CashFlow { user, months } => {
                    commands::cmd_report_cash_flow(&db, today, user, months, output)?;
                }
                ReportType::Creep { user, period } => {
                    let config = commands::load_config(cli.config.as_deref())?;
                    commands::cmd_report_creep(&db, &config, today, user, period, output)?;
                }
            }
        }
        Commands::Run {
            user,
            all_users,
            full,
        } => {
            let db = commands::open_db(&cli.db)?;
            let config = commands::load_config(cli.config.as_deref())?;
            if all_users {
                commands::cmd_run_all(db, config, today, full, output).await?;
            } else {
                let user = user.ok_or_else(|| anyhow::anyhow!("--user or --all-users is required"))?;
                commands::cmd_run(&db, &config, today, user, full, output)?;
            }
        }
        Commands::Status { user } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_status(&db, user)?;
        }
        Commands::Reset { yes } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_reset(&db, yes)?;
        }
    }

    Ok(())
}
