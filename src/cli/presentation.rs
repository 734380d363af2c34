//! CLI presentation: text and json formatters per command.

use crate::cli::parse::OutputFormat;
use crate::error::{ApiError, StorageError};
use crate::pipeline::{EntityOutcome, RenderReport, RunReport};
use crate::store::RecordStore;
use crate::types::Record;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::Path;

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::StorageError(StorageError::Serialization(e.to_string())))
}

fn section_title(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn outcome_label(outcome: EntityOutcome) -> String {
    match outcome {
        EntityOutcome::New => outcome.as_str().green().to_string(),
        EntityOutcome::Updated => outcome.as_str().cyan().to_string(),
        EntityOutcome::Skipped => outcome.as_str().dimmed().to_string(),
        EntityOutcome::Failed => outcome.as_str().red().to_string(),
    }
}

pub fn format_run_report(report: &RunReport, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        #[derive(Serialize)]
        struct RunReportJson<'a> {
            counts: crate::pipeline::RunCounts,
            #[serde(flatten)]
            report: &'a RunReport,
        }
        return to_json(&RunReportJson {
            counts: report.counts(),
            report,
        });
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Key", "Outcome", "Reasons", "Failures"]);
    for entity in &report.entities {
        let reasons: Vec<&str> = entity.reasons.iter().map(|r| r.as_str()).collect();
        let failures: Vec<String> = entity.failures.iter().map(|f| f.to_string()).collect();
        table.add_row(vec![
            entity.key.to_string(),
            outcome_label(entity.outcome),
            if reasons.is_empty() { "-".to_string() } else { reasons.join(", ") },
            if failures.is_empty() { "-".to_string() } else { failures.join("\n") },
        ]);
    }

    let counts = report.counts();
    let elapsed = report.finished_at - report.started_at;
    Ok(format!(
        "{}\n{}\n\nnew: {}  updated: {}  skipped: {}  failed: {}  ({:.1}s)",
        section_title("Sync run"),
        table,
        counts.new,
        counts.updated,
        counts.skipped,
        counts.failed,
        elapsed.num_milliseconds() as f64 / 1000.0,
    ))
}

pub fn format_render_report(report: &RenderReport, output_dir: &Path) -> String {
    let mut lines = vec![format!(
        "Rendered {} record(s) to {}",
        report.rendered.len(),
        output_dir.display()
    )];
    if !report.skipped.is_empty() {
        let keys: Vec<String> = report.skipped.iter().map(|k| k.to_string()).collect();
        lines.push(format!("Skipped (no generated content): {}", keys.join(", ")));
    }
    for (key, reason) in &report.failed {
        lines.push(format!("{} {}: {}", "Failed".red(), key, reason));
    }
    lines.join("\n")
}

#[derive(Serialize)]
struct StatusRow<'a> {
    key: String,
    has_fetched_content: bool,
    has_generated_content: bool,
    last_updated: &'a chrono::DateTime<chrono::Utc>,
}

pub fn format_status(store: &RecordStore, format: OutputFormat) -> Result<String, ApiError> {
    let rows: Vec<StatusRow<'_>> = store
        .iter()
        .map(|(key, record)| StatusRow {
            key: key.to_string(),
            has_fetched_content: record.has_fetched_content(),
            has_generated_content: record.has_generated_content(),
            last_updated: &record.last_updated,
        })
        .collect();

    if format == OutputFormat::Json {
        return to_json(&rows);
    }
    if rows.is_empty() {
        return Ok(format!("No records in {}", store.path().display()));
    }

    let mark = |present: bool| {
        if present {
            "yes".green().to_string()
        } else {
            "no".yellow().to_string()
        }
    };
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Key", "Fetched", "Generated", "Last Updated"]);
    for row in &rows {
        table.add_row(vec![
            row.key.clone(),
            mark(row.has_fetched_content),
            mark(row.has_generated_content),
            row.last_updated.to_rfc3339(),
        ]);
    }
    Ok(format!(
        "{}\n{}\n{} record(s) in {}",
        section_title("Records"),
        table,
        rows.len(),
        store.path().display()
    ))
}

pub fn format_record(record: &Record) -> Result<String, ApiError> {
    to_json(record)
}
