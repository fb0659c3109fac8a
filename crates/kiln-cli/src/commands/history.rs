//! History command - show recent runs from the build ledger

use anyhow::{Context, Result};
use colored::*;
use kiln_build::{BuildOverrides, Pipeline, RunRecord};
use std::path::Path;

pub fn run(project_dir: &Path, count: usize, json: bool) -> Result<()> {
    let config = super::resolve_config(project_dir, &BuildOverrides::default())?;
    let records = Pipeline::new(config)
        .history(count)
        .context("Failed to read build history")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No builds recorded yet");
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

fn format_record(record: &RunRecord) -> String {
    let when = record
        .local_time()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| record.timestamp.clone());
    let status = if record.success {
        "ok".green().bold()
    } else {
        "FAILED".red().bold()
    };
    let mut line = format!(
        "{}  {:<6} {}  {}/{} compiled, {} cached, {:.2}s",
        when,
        status,
        record.version,
        record.compiled,
        record.total_files,
        record.cache_hits,
        record.elapsed_ms as f64 / 1000.0
    );
    if let Some(stage) = &record.failed_stage {
        line.push_str(&format!(" ({} stage)", stage));
    }
    line
}
