//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans,
//! reports, and recorded state in text or JSON form.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::planner::{DeploymentPlan, DiffOp, PassReport};
use crate::state::RecordedState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan operation row for table display.
#[derive(Tabled)]
struct PlanOpRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Op")]
    op: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Report row for table display.
#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Op")]
    op: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// State row for table display.
#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Physical ID")]
    physical_id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Hash")]
    hash: String,
}

/// JSON mirror of a deployment plan.
#[derive(serde::Serialize)]
struct PlanJson {
    config_hash: String,
    deletions: Vec<PlanOpJson>,
    operations: Vec<PlanOpJson>,
    replacements: Vec<ReplaceJson>,
    waves: Vec<Vec<String>>,
}

/// JSON mirror of a replacement notice.
#[derive(serde::Serialize)]
struct ReplaceJson {
    id: String,
    fields: Vec<String>,
}

/// JSON mirror of a planned operation.
#[derive(serde::Serialize)]
struct PlanOpJson {
    op: DiffOp,
    id: String,
    kind: String,
    reason: String,
    depends_on: Vec<String>,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a deployment plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &DeploymentPlan) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required - stack is up to date.\n",
                "✓".green()
            );
        }

        let mut output = String::new();
        let mut rows = Vec::new();

        for (index, op) in plan
            .deletions
            .iter()
            .chain(plan.actionable_operations())
            .enumerate()
        {
            rows.push(PlanOpRow {
                index,
                op: colored_op(op.op),
                resource: op.id.clone(),
                kind: op.kind.to_string(),
                reason: op.reason.clone(),
            });
        }

        let _ = writeln!(output, "Deployment plan:");
        let _ = writeln!(output, "{}", Table::new(rows));

        let creates = plan
            .actionable_operations()
            .iter()
            .filter(|op| op.op == DiffOp::Create)
            .count();
        let updates = plan
            .actionable_operations()
            .iter()
            .filter(|op| matches!(op.op, DiffOp::Update | DiffOp::Replace))
            .count();
        let _ = writeln!(
            output,
            "\nSummary: {} to create, {} to change, {} to delete.",
            creates.to_string().green(),
            updates.to_string().yellow(),
            plan.deletions.len().to_string().red(),
        );

        if !plan.replacements.is_empty() {
            let ids: Vec<&str> = plan.replacements.iter().map(|n| n.id.as_str()).collect();
            let _ = writeln!(
                output,
                "{} {} resource(s) will be replaced (new physical identity): {}. Re-run with --allow-replace to confirm.",
                "!".red().bold(),
                plan.replacements.len(),
                ids.join(", ")
            );
        }

        output
    }

    /// Formats a pass report for display.
    #[must_use]
    pub fn format_report(&self, report: &PassReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats a report as text.
    fn format_report_text(report: &PassReport) -> String {
        let mut output = String::new();

        let rows: Vec<ReportRow> = report
            .outcomes
            .values()
            .map(|outcome| ReportRow {
                resource: outcome.id.clone(),
                op: outcome.op.to_string(),
                result: outcome.terminal.to_string(),
                error: outcome.error.clone().unwrap_or_default(),
            })
            .collect();

        if !rows.is_empty() {
            let _ = writeln!(output, "{}", Table::new(rows));
        }

        let marker = if report.success {
            "✓".green()
        } else {
            "✗".red()
        };
        let _ = writeln!(output, "\n{marker} {report}");

        if report.incomplete {
            let _ = writeln!(
                output,
                "{} Pass was cancelled; abandoned operations were not started.",
                "!".yellow()
            );
        }

        output
    }

    /// Formats recorded state for display.
    #[must_use]
    pub fn format_state(&self, state: &RecordedState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => Self::format_state_text(state),
        }
    }

    /// Formats recorded state as text.
    fn format_state_text(state: &RecordedState) -> String {
        let mut output = String::new();

        let _ = writeln!(
            output,
            "Stack: {}/{} (updated {})",
            state.project,
            state.environment,
            state.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
        );

        if state.is_empty() {
            let _ = writeln!(output, "No resources recorded.");
            return output;
        }

        let rows: Vec<StateRow> = state
            .resource_ids()
            .into_iter()
            .filter_map(|id| state.resource(id))
            .map(|record| StateRow {
                resource: record.id.clone(),
                kind: record.kind.to_string(),
                physical_id: record.physical_id.clone(),
                status: record.status.to_string(),
                hash: record.config_hash.chars().take(8).collect(),
            })
            .collect();

        let _ = writeln!(output, "{}", Table::new(rows));
        output
    }
}

/// Renders an operation with its conventional color.
fn colored_op(op: DiffOp) -> String {
    match op {
        DiffOp::Create => format!("{}", "create".green()),
        DiffOp::Update => format!("{}", "update".yellow()),
        DiffOp::Replace => format!("{}", "replace".red().bold()),
        DiffOp::Delete => format!("{}", "delete".red()),
        DiffOp::NoOp => String::from("no change"),
    }
}

impl From<&DeploymentPlan> for PlanJson {
    fn from(plan: &DeploymentPlan) -> Self {
        let op_json = |op: &crate::planner::PlannedOp| PlanOpJson {
            op: op.op,
            id: op.id.clone(),
            kind: op.kind.to_string(),
            reason: op.reason.clone(),
            depends_on: op.depends_on.clone(),
        };

        Self {
            config_hash: plan.config_hash.clone(),
            deletions: plan.deletions.iter().map(op_json).collect(),
            operations: plan.operations.iter().map(op_json).collect(),
            replacements: plan
                .replacements
                .iter()
                .map(|notice| ReplaceJson {
                    id: notice.id.clone(),
                    fields: notice.fields.clone(),
                })
                .collect(),
            waves: plan.waves.clone(),
        }
    }
}
