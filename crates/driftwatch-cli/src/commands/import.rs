//! Import command implementations

use std::path::Path;

use anyhow::{Context, Result};
use driftwatch_core::{
    db::Database,
    import::{import_csv_file, import_recurring_streams_file},
    ImportResult, Repositories,
};

pub fn cmd_import(db: &Database, file: &Path) -> Result<ImportResult> {
    println!("📥 Importing transactions from {}...", file.display());

    let result = import_csv_file(db, file)
        .with_context(|| format!("Failed to import {}", file.display()))?;

    println!("✅ Import complete!");
    println!("   Rows: {}", result.rows);
    println!("   Imported: {}", result.imported);
    println!("   Skipped (duplicates): {}", result.duplicates);

    if result.imported > 0 {
        println!();
        println!("Next: driftwatch run --all-users --full");
    }

    Ok(result)
}

pub fn cmd_import_streams(db: &Database, file: &Path) -> Result<usize> {
    println!("📥 Importing recurring streams from {}...", file.display());

    let repos = Repositories::sqlite(db);
    let count = import_recurring_streams_file(repos.recurring_streams, file)
        .with_context(|| format!("Failed to import streams from {}", file.display()))?;

    println!("✅ Imported {} recurring streams", count);
    Ok(count)
}
