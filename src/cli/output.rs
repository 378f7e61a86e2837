//! Output formatting for CLI

use clap::ValueEnum;
use serde::Serialize;

use super::error::CliError;
use crate::pipeline::{PipelineReport, PipelineStage};
use crate::report::PassReport;
use crate::scaffold::ScaffoldSummary;

/// How command results are printed on stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::OutputError(e.to_string()))
}

/// Format a pass report
pub fn format_pass_report(report: &PassReport, format: OutputFormat) -> Result<String, CliError> {
    if format == OutputFormat::Json {
        return to_json(report);
    }

    let mut output = report.summary();
    for path in &report.files_changed {
        output.push_str(&format!("\n  changed: {}", path.display()));
    }
    for path in &report.files_skipped {
        output.push_str(&format!("\n  skipped (not TMDL): {}", path.display()));
    }
    if report.is_noop() {
        output.push_str("\n  nothing to do");
    }
    Ok(output)
}

/// Format the result of a scaffold run
pub fn format_scaffold_summary(
    summary: &ScaffoldSummary,
    format: OutputFormat,
) -> Result<String, CliError> {
    if format == OutputFormat::Json {
        return to_json(&serde_json::json!({
            "manifest": summary.manifest,
            "report_dir": summary.report_dir,
            "semantic_model_dir": summary.semantic_model_dir,
            "tables": summary.tables,
        }));
    }

    let mut output = format!("Scaffolded {}", summary.manifest.display());
    output.push_str(&format!("\n  report: {}", summary.report_dir.display()));
    output.push_str(&format!(
        "\n  semantic model: {}",
        summary.semantic_model_dir.display()
    ));
    output.push_str(&format!("\n  tables: {}", summary.tables.join(", ")));
    Ok(output)
}

/// Format a table list, one name per line in text mode
pub fn format_tables(tables: &[String], format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => to_json(&tables),
        OutputFormat::Text => Ok(tables.join("\n")),
    }
}

/// Format a pipeline report; text mode lists the pass summaries per stage
pub fn format_pipeline_report(
    report: &PipelineReport,
    format: OutputFormat,
) -> Result<String, CliError> {
    if format == OutputFormat::Json {
        return to_json(report);
    }

    let mut lines = vec![format!(
        "Pipeline {} {} in {}",
        report.run_id,
        report.status,
        report.duration_formatted()
    )];
    for stage in PipelineStage::all() {
        let Some(output) = report.outputs.get(stage.name()) else {
            continue;
        };
        if output.skipped {
            let reason = output.skip_reason.as_deref().unwrap_or("skipped");
            lines.push(format!("  {}: skipped ({reason})", stage.name()));
            continue;
        }
        let pass: Option<PassReport> = output
            .metadata
            .get("report")
            .and_then(|value| serde_json::from_value(value.clone()).ok());
        match pass {
            Some(pass) => lines.push(format!("  {}", pass.summary())),
            None => lines.push(format!(
                "  {}: {} file(s)",
                stage.name(),
                output.files.len()
            )),
        }
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_text_pass_report() {
        let mut report = PassReport::new("normalize");
        report.record(Path::new("tables/Orders.tmdl"), 2);
        report.skip(Path::new("tables/Broken.tmdl"));

        let text = format_pass_report(&report, OutputFormat::Text).unwrap();
        assert!(text.starts_with("normalize: 2 file(s) scanned, 1 changed"));
        assert!(text.contains("changed: tables/Orders.tmdl"));
        assert!(text.contains("skipped (not TMDL): tables/Broken.tmdl"));
    }

    #[test]
    fn test_json_pass_report() {
        let report = PassReport::new("polish-tables");
        let json = format_pass_report(&report, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["pass"], "polish-tables");
        assert_eq!(value["files_scanned"], 0);
    }

    #[test]
    fn test_tables_output() {
        let tables = vec!["Orders".to_string(), "People".to_string()];
        assert_eq!(
            format_tables(&tables, OutputFormat::Text).unwrap(),
            "Orders\nPeople"
        );
    }
}
