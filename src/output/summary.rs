use std::fmt::Write;

use anyhow::Result;
use comfy_table::{Cell, Color as TableColor};

use crate::model::{MetricsConfig, RunReport};

use super::styling::{bright, bright_red, bright_yellow, cyan, dim, status};
use super::tables::{
    color_coded_coverage_cell, color_coded_failure_count_cell, create_table, cyan_header,
};

/// Prints a human-readable summary of a finished run to stdout.
///
/// Displays:
/// - Overview: project, run id, status, timing
/// - Files: listed, processed, ingested, skipped, failed, with coverage
///   color-coded (green >80%, yellow 50-80%, red <50%)
/// - Failed Files: path and error for every file that failed
pub fn print_summary(report: &RunReport) {
    println!("{}", render_summary(report));
}

/// Serializes a run report as JSON.
pub fn render_json(report: &RunReport, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    })
}

/// Prints the configured metric names, one per row.
pub fn print_metric_names(metrics: &MetricsConfig) {
    println!("{}", render_metric_names(metrics));
}

fn render_metric_names(metrics: &MetricsConfig) -> String {
    if metrics.is_empty() {
        return format!("{}", bright_yellow("No metrics configured."));
    }

    let mut table = create_table();
    table.set_header(cyan_header(&["#", "Metric"]));
    for (idx, name) in metrics.keys().enumerate() {
        table.add_row(vec![Cell::new(idx + 1), Cell::new(name)]);
    }
    table.to_string()
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn ingested_files(report: &RunReport) -> usize {
    report.processed_files - report.skipped_files.len() - report.failures.len()
}

#[allow(clippy::cast_precision_loss)]
fn coverage(report: &RunReport) -> f64 {
    let eligible = report.total_files - report.skipped_files.len();
    if eligible == 0 {
        return 100.0;
    }
    (ingested_files(report) as f64 / eligible as f64) * 100.0
}

fn render_summary(report: &RunReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");
    let elapsed = report.finished_at - report.started_at;
    let _ = write!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        dim("Project:"),
        cyan(&report.project),
        dim("Run:"),
        dim(report.run_id),
        dim("Status:"),
        status(report.status),
        dim("Started:"),
        dim(report.started_at.format("%Y-%m-%d %H:%M UTC")),
        dim("Duration:"),
        bright_yellow(format!("{:.1}s", elapsed.num_milliseconds() as f64 / 1000.0)),
    );
    if let Some(error) = &report.error {
        let _ = writeln!(output, "  {} {}", dim("Error:"), bright_red(error));
    }
    output.push('\n');

    if report.total_files == 0 {
        let _ = writeln!(output, "{}", bright_yellow("No files found."));
        return output;
    }

    add_section_header(&mut output, "📁", "Files");
    let mut files_table = create_table();
    files_table.set_header(cyan_header(&[
        "Listed",
        "Processed",
        "Ingested",
        "Skipped",
        "Failed",
        "Metrics",
        "Coverage",
    ]));
    files_table.add_row(vec![
        Cell::new(report.total_files),
        Cell::new(report.processed_files),
        Cell::new(ingested_files(report)),
        Cell::new(report.skipped_files.len()).fg(TableColor::DarkGrey),
        color_coded_failure_count_cell(report.failures.len()),
        Cell::new(report.metrics_extracted),
        color_coded_coverage_cell(coverage(report)),
    ]);
    let _ = write!(output, "{files_table}\n\n");

    if report.failures.is_empty() {
        return output;
    }

    add_section_header(&mut output, "❌", "Failed Files");
    let mut failures_table = create_table();
    failures_table.set_header(cyan_header(&["#", "Path", "Error"]));
    for failure in &report.failures {
        failures_table.add_row(vec![
            Cell::new(failure.index + 1),
            Cell::new(&failure.path),
            Cell::new(&failure.error).fg(TableColor::Red),
        ]);
    }
    let _ = writeln!(output, "{failures_table}");

    output
}
