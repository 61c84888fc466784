//! Computation command implementations
//!
//! Every command here writes derived data. `run --all-users` fans out one
//! blocking job per user; a user never has two jobs in flight.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use driftwatch_core::{
    db::Database, models::PeriodType, period, AnalyticsPipeline, BaselineCalculator,
    BaselineComputationResult, ComputationManager, ComputationResult, CreepScorer, EngineConfig,
    LifestyleCreepComputationResult, PacingResponse, PipelineResult, RecomputeMode, Repositories,
};
use tracing::info;

use super::{print_json, truncate, Output};

fn recompute_mode(full: bool) -> RecomputeMode {
    if full {
        RecomputeMode::Full
    } else {
        RecomputeMode::Incremental
    }
}

/// First day of the month before `today`
pub fn last_month(today: NaiveDate) -> NaiveDate {
    period::previous_period_start(
        period::period_start(today, PeriodType::Monthly),
        PeriodType::Monthly,
    )
}

pub fn cmd_compute(
    db: &Database,
    config: &EngineConfig,
    today: NaiveDate,
    user_id: i64,
    full: bool,
    output: Output,
) -> Result<ComputationResult> {
    let mode = recompute_mode(full);
    let result = ComputationManager::new(Repositories::sqlite(db), config, today)
        .compute(user_id, mode)
        .context("Spending computation failed")?;

    if output == Output::Json {
        print_json(&result)?;
        return Ok(result);
    }

    println!("🔄 Spending recompute ({}) for user {}", mode.as_str(), user_id);
    println!("   Periods: {}", result.periods_computed);
    println!("   Categories: {}", result.categories_computed);
    println!("   Merchants: {}", result.merchants_computed);
    println!("   Transactions: {}", result.transactions_processed);
    println!("   Time: {}ms", result.computation_time_ms);

    Ok(result)
}

pub fn cmd_baselines(
    db: &Database,
    config: &EngineConfig,
    today: NaiveDate,
    user_id: i64,
    force: bool,
    output: Output,
) -> Result<BaselineComputationResult> {
    let result = BaselineCalculator::new(Repositories::sqlite(db), &config.baseline, today)
        .compute_baselines(user_id, force)
        .context("Baseline computation failed")?;

    if output == Output::Json {
        print_json(&result)?;
        return Ok(result);
    }

    println!();
    println!("📐 Lifestyle Baselines (user {})", user_id);
    println!("   ─────────────────────────────────────────────────────────────");
    if let Some(ref message) = result.message {
        println!("   {}", message);
        return Ok(result);
    }
    if let (Some(start), Some(end)) = (result.baseline_start, result.baseline_end) {
        println!("   Window: {} to {} ({} months)", start, end, result.months_analyzed);
    }
    println!();
    println!("   {:28} │ {:>10} │ {:>9} │ {:>6}", "Category", "Monthly", "Std dev", "Locked");
    println!("   ─────────────────────────────┼────────────┼───────────┼────────");
    for baseline in &result.baselines {
        println!(
            "   {:28} │ {:>10.2} │ {:>9} │ {:>6}",
            truncate(&baseline.category, 28),
            baseline.baseline_monthly_amount,
            baseline
                .standard_deviation
                .map(|s| format!("{:.2}", s))
                .unwrap_or_else(|| "-".to_string()),
            if baseline.is_locked { "yes" } else { "no" }
        );
    }

    Ok(result)
}

pub fn cmd_baselines_lock(
    db: &Database,
    config: &EngineConfig,
    today: NaiveDate,
    user_id: i64,
    lock: bool,
) -> Result<usize> {
    let calculator = BaselineCalculator::new(Repositories::sqlite(db), &config.baseline, today);
    let changed = if lock {
        calculator.lock_baselines(user_id)?
    } else {
        calculator.unlock_baselines(user_id)?
    };

    if changed == 0 {
        println!("   No baselines to {} for user {}", if lock { "lock" } else { "unlock" }, user_id);
    } else if lock {
        println!("🔒 Locked {} baselines for user {}", changed, user_id);
    } else {
        println!("🔓 Unlocked {} baselines for user {}", changed, user_id);
    }

    Ok(changed)
}

pub fn cmd_creep(
    db: &Database,
    config: &EngineConfig,
    today: NaiveDate,
    user_id: i64,
    period_start: Option<NaiveDate>,
    output: Output,
) -> Result<LifestyleCreepComputationResult> {
    let month = period_start.unwrap_or_else(|| last_month(today));
    let result = CreepScorer::new(Repositories::sqlite(db), config, today)
        .compute_for_period(user_id, month)
        .context("Lifestyle creep scoring failed")?;

    if output == Output::Json {
        print_json(&result)?;
    } else {
        print_creep(&result);
    }

    Ok(result)
}

pub(crate) fn print_creep(result: &LifestyleCreepComputationResult) {
    println!();
    println!(
        "📈 Lifestyle Creep for {} (user {})",
        result.period_start.format("%Y-%m"),
        result.user_id
    );
    println!("   ─────────────────────────────────────────────────────────────");
    if let Some(ref message) = result.message {
        println!("   {}", message);
        return;
    }

    println!(
        "   Overall: {:+.2}% ({})",
        result.overall_creep_percentage, result.overall_severity
    );
    if let Some(growth) = result.income_growth_percentage {
        println!(
            "   Income growth: {:+.2}% → adjusted creep {:+.2}%",
            growth, result.income_adjusted_creep_percentage
        );
    }
    println!();
    println!(
        "   {:24} │ {:>9} │ {:>9} │ {:>8} │ {:8} │ {}",
        "Category", "Baseline", "Current", "Change", "Severity", "Trend"
    );
    println!("   ─────────────────────────┼───────────┼───────────┼──────────┼──────────┼──────────────────");
    for score in &result.scores {
        println!(
            "   {:24} │ {:>9.2} │ {:>9.2} │ {:>7.1}% │ {:8} │ {}{}",
            truncate(&score.category, 24),
            score.baseline_amount,
            score.current_amount,
            score.percentage_change,
            score.severity.as_str(),
            score.trend_direction.as_str(),
            if score.is_seasonal { " (seasonal)" } else { "" }
        );
    }
}

pub fn cmd_pacing(
    db: &Database,
    config: &EngineConfig,
    today: NaiveDate,
    user_id: i64,
    output: Output,
) -> Result<PacingResponse> {
    let pacing = CreepScorer::new(Repositories::sqlite(db), config, today)
        .compute_pacing(user_id)
        .context("Pacing computation failed")?;

    if output == Output::Json {
        print_json(&pacing)?;
        return Ok(pacing);
    }

    println!();
    println!(
        "⏱️  Pacing for {} as of {} (user {})",
        pacing.period_start.format("%Y-%m"),
        pacing.as_of,
        user_id
    );
    println!("   ─────────────────────────────────────────────────────────────");
    if let Some(ref message) = pacing.message {
        println!("   {}", message);
        return Ok(pacing);
    }

    println!(
        "   Mode: {} (day {} of {})",
        pacing.mode, pacing.days_into_period, pacing.days_in_period
    );
    println!(
        "   Spent: ${:.2} of ${:.2} target ({:.1}% vs {:.1}% of the month)",
        pacing.current_amount,
        pacing.target_amount,
        pacing.pacing_percentage,
        pacing.expected_percentage
    );
    println!("   Status: {}", pacing.status);
    if let Some(projected) = pacing.projected_creep_percentage {
        println!("   Projected creep: {:+.2}%", projected);
    }
    if let Some(stability) = pacing.stability_score {
        println!("   Stability score: {}/100", stability);
    }

    if !pacing.categories.is_empty() {
        println!();
        println!("   {:24} │ {:>9} │ {:>9} │ {:>9}", "Category", "Baseline", "So far", "Projected");
        println!("   ─────────────────────────┼───────────┼───────────┼──────────");
        for category in &pacing.categories {
            println!(
                "   {:24} │ {:>9.2} │ {:>9.2} │ {:>9.2}",
                truncate(&category.category, 24),
                category.baseline_amount,
                category.current_amount,
                category.projected_amount
            );
        }
    }

    Ok(pacing)
}

pub fn cmd_run(
    db: &Database,
    config: &EngineConfig,
    today: NaiveDate,
    user_id: i64,
    full: bool,
    output: Output,
) -> Result<PipelineResult> {
    let result = AnalyticsPipeline::new(Repositories::sqlite(db), config, today)
        .run(user_id, recompute_mode(full));

    if output == Output::Json {
        print_json(&result)?;
    } else {
        print_pipeline(&result);
    }

    Ok(result)
}

/// Run the pipeline for every user in the ledger, one blocking task per user
pub async fn run_all_users(
    db: Database,
    config: EngineConfig,
    today: NaiveDate,
    mode: RecomputeMode,
) -> Result<Vec<PipelineResult>> {
    let users = Repositories::sqlite(&db).transactions.user_ids()?;
    info!(users = users.len(), mode = mode.as_str(), "Starting batch run");

    let config = Arc::new(config);
    let mut handles = Vec::with_capacity(users.len());
    for user_id in users {
        let db = db.clone();
        let config = Arc::clone(&config);
        handles.push(tokio::task::spawn_blocking(move || {
            AnalyticsPipeline::new(Repositories::sqlite(&db), &config, today).run(user_id, mode)
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.context("Pipeline worker panicked")?);
    }
    Ok(results)
}

pub async fn cmd_run_all(
    db: Database,
    config: EngineConfig,
    today: NaiveDate,
    full: bool,
    output: Output,
) -> Result<Vec<PipelineResult>> {
    let results = run_all_users(db, config, today, recompute_mode(full)).await?;

    if output == Output::Json {
        print_json(&results)?;
        return Ok(results);
    }

    if results.is_empty() {
        println!("   No users in the ledger. Import transactions first.");
    }
    for result in &results {
        print_pipeline(result);
    }
    let failed = results.iter().filter(|r| r.partial_failure).count();
    println!();
    println!("✅ Processed {} users ({} with failures)", results.len(), failed);

    Ok(results)
}

fn print_pipeline(result: &PipelineResult) {
    println!();
    println!(
        "🚀 Pipeline ({}) for user {} in {}ms",
        result.mode.as_str(),
        result.user_id,
        result.computation_time_ms
    );
    if let Some(ref spending) = result.spending {
        println!(
            "   Spending: {} periods, {} transactions",
            spending.periods_computed, spending.transactions_processed
        );
    }
    if let Some(ref cash_flow) = result.cash_flow {
        println!(
            "   Cash flow: {} months, {} income sources",
            cash_flow.periods_computed, cash_flow.income_sources_detected
        );
    }
    match result.baselines {
        Some(ref baselines) => match baselines.message {
            Some(ref message) => println!("   Baselines: {}", message),
            None => println!("   Baselines: {} computed", baselines.baselines_computed),
        },
        None => println!("   Baselines: unchanged"),
    }
    for creep in &result.creep {
        match creep.message {
            Some(ref message) => println!(
                "   Creep {}: {}",
                creep.period_start.format("%Y-%m"),
                message
            ),
            None => println!(
                "   Creep {}: {:+.2}% ({}), {} categories",
                creep.period_start.format("%Y-%m"),
                creep.overall_creep_percentage,
                creep.overall_severity,
                creep.categories_scored
            ),
        }
    }
    for error in &result.errors {
        println!("   ⚠️  {} failed: {}", error.stage, error.error);
    }
}
