//! Report command implementations
//!
//! Reports only read what the computation commands stored.

use anyhow::Result;
use chrono::NaiveDate;
use driftwatch_core::models::{CashFlowMetrics, IncomeSource, PeriodType, SpendingPeriod};
use driftwatch_core::{
    db::Database, period, CreepScorer, EngineConfig, LifestyleCreepSummary, Repositories,
};

use super::{last_month, print_json, truncate, Output};

pub fn cmd_report_spending(
    db: &Database,
    user_id: i64,
    period_type: PeriodType,
    limit: usize,
    output: Output,
) -> Result<Vec<SpendingPeriod>> {
    let repos = Repositories::sqlite(db);
    let mut periods = repos
        .spending_periods
        .get_periods_for_user(user_id, period_type)?;
    let skip = periods.len().saturating_sub(limit);
    let periods = periods.split_off(skip);

    if output == Output::Json {
        print_json(&periods)?;
        return Ok(periods);
    }

    println!();
    println!("📊 Spending by {} period (user {})", period_type, user_id);
    println!("   ─────────────────────────────────────────────────────────────");

    if periods.is_empty() {
        println!("   No spending computed yet. Run 'driftwatch compute --user {} --full'.", user_id);
        return Ok(periods);
    }

    println!(
        "   {:10} │ {:>11} │ {:>11} │ {:>11} │ {:>5} │ {}",
        "Start", "Inflow", "Outflow", "Net", "Count", "Final"
    );
    println!("   ───────────┼─────────────┼─────────────┼─────────────┼───────┼──────");
    for p in &periods {
        println!(
            "   {:10} │ {:>11.2} │ {:>11.2} │ {:>11.2} │ {:>5} │ {}",
            p.period_start,
            p.total_inflow_excluding_transfers,
            p.total_outflow_excluding_transfers,
            p.net_flow_excluding_transfers,
            p.transaction_count,
            if p.is_finalized { "yes" } else { "" }
        );
    }

    if let Some(latest) = periods.last() {
        let mut categories = repos.category_spending.get_by_user_and_period(
            user_id,
            period_type,
            latest.period_start,
        )?;
        categories.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));

        println!();
        println!("   Top categories for {}", latest.period_start);
        for c in categories.iter().take(5) {
            println!(
                "   {:28} │ {:>10.2} │ {:>4} txns",
                truncate(&c.category, 28),
                c.total_amount,
                c.transaction_count
            );
        }
    }

    Ok(periods)
}

pub fn cmd_report_income(
    db: &Database,
    user_id: i64,
    output: Output,
) -> Result<Vec<IncomeSource>> {
    let sources = Repositories::sqlite(db).income_sources.get_by_user_id(user_id)?;

    if output == Output::Json {
        print_json(&sources)?;
        return Ok(sources);
    }

    println!();
    println!("💵 Income Sources (user {})", user_id);
    println!("   ─────────────────────────────────────────────────────────────");

    if sources.is_empty() {
        println!("   No recurring income detected.");
        return Ok(sources);
    }

    println!(
        "   {:26} │ {:10} │ {:12} │ {:>10} │ {:>5} │ {}",
        "Source", "Type", "Frequency", "Average", "Conf", "Next"
    );
    println!("   ───────────────────────────┼────────────┼──────────────┼────────────┼───────┼───────────");
    for s in &sources {
        println!(
            "   {:26} │ {:10} │ {:12} │ {:>10.2} │ {:>5.2} │ {}{}",
            truncate(&s.display_name, 26),
            s.source_type.as_str(),
            s.frequency.as_str(),
            s.average_amount,
            s.confidence_score,
            s.next_expected_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            if s.is_active { "" } else { " (inactive)" }
        );
    }

    Ok(sources)
}

pub fn cmd_report_cash_flow(
    db: &Database,
    today: NaiveDate,
    user_id: i64,
    months: u32,
    output: Output,
) -> Result<Vec<CashFlowMetrics>> {
    let current = period::period_start(today, PeriodType::Monthly);
    let back = months.max(1).saturating_sub(1) as i32;
    let start = period::shift_period(current, PeriodType::Monthly, -back);
    let metrics = Repositories::sqlite(db)
        .cash_flow
        .get_periods_in_range(user_id, start, current)?;

    if output == Output::Json {
        print_json(&metrics)?;
        return Ok(metrics);
    }

    println!();
    println!("💰 Cash Flow (user {})", user_id);
    println!("   ─────────────────────────────────────────────────────────────");

    if metrics.is_empty() {
        println!("   No cash flow computed for {} to {}.", start, current);
        return Ok(metrics);
    }

    println!(
        "   {:7} │ {:>10} │ {:>10} │ {:>10} │ {:>7} │ {}",
        "Month", "Income", "Expenses", "Net", "Saved", "Largest"
    );
    println!("   ────────┼────────────┼────────────┼────────────┼─────────┼──────────────────────");
    for m in &metrics {
        println!(
            "   {:7} │ {:>10.2} │ {:>10.2} │ {:>10.2} │ {:>7} │ {}",
            m.period_start.format("%Y-%m"),
            m.total_income,
            m.total_expenses,
            m.net_cash_flow,
            m.savings_rate
                .map(|r| format!("{:.1}%", r * rust_decimal::Decimal::ONE_HUNDRED))
                .unwrap_or_else(|| "-".to_string()),
            m.largest_expense_category.as_deref().unwrap_or("-")
        );
    }

    Ok(metrics)
}

pub fn cmd_report_creep(
    db: &Database,
    config: &EngineConfig,
    today: NaiveDate,
    user_id: i64,
    period_start: Option<NaiveDate>,
    output: Output,
) -> Result<LifestyleCreepSummary> {
    let month = period_start.unwrap_or_else(|| last_month(today));
    let summary = CreepScorer::new(Repositories::sqlite(db), config, today)
        .get_summary(user_id, month)?;

    if output == Output::Json {
        print_json(&summary)?;
        return Ok(summary);
    }

    println!();
    println!(
        "📈 Lifestyle Creep Summary for {} (user {})",
        summary.period_start.format("%Y-%m"),
        user_id
    );
    println!("   ─────────────────────────────────────────────────────────────");

    if summary.categories_scored == 0 {
        println!(
            "   No scores stored. Run 'driftwatch creep --user {} --period {}'.",
            user_id,
            summary.period_start.format("%Y-%m")
        );
        return Ok(summary);
    }

    println!(
        "   Baseline ${:.2} → current ${:.2} ({:+.2})",
        summary.total_baseline, summary.total_current, summary.total_change
    );
    println!(
        "   Overall: {:+.2}% ({}), {} of {} categories creeping",
        summary.overall_creep_percentage,
        summary.overall_severity,
        summary.categories_creeping,
        summary.categories_scored
    );

    if !summary.top_creeping.is_empty() {
        println!();
        println!("   Top creeping categories:");
        for score in &summary.top_creeping {
            let trail: Vec<String> = summary
                .history
                .get(&score.category)
                .map(|h| {
                    h.iter()
                        .map(|s| format!("{:.0}%", s.percentage_change))
                        .collect()
                })
                .unwrap_or_default();
            println!(
                "   {:24} │ {:>+7.1}% │ {:8} │ {} │ recent: {}",
                truncate(&score.category, 24),
                score.percentage_change,
                score.severity.as_str(),
                score.trend_direction.as_str(),
                trail.join(", ")
            );
        }
    }

    Ok(summary)
}
