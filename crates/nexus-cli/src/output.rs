//! Rendering of command results for terminals and for scripts.

use std::io::Write;

use clap::ValueEnum;
use nexus_rpc::{PlanReport, StepOutcome};
use serde_json::{Value, json};

use crate::AppError;

/// Output format selection.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Selects `human` for terminal output and `json` for redirected output.
    #[default]
    Auto,
    /// Always render human-readable output.
    Human,
    /// Always emit JSON.
    Json,
}

/// Output format after `auto` has been decided.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolvedOutputFormat {
    /// Human-readable lines.
    Human,
    /// One JSON document.
    Json,
}

impl OutputFormat {
    /// Resolves `auto` against whether stdout is a terminal.
    #[must_use]
    pub const fn resolve(self, stdout_is_terminal: bool) -> ResolvedOutputFormat {
        match self {
            Self::Human => ResolvedOutputFormat::Human,
            Self::Json => ResolvedOutputFormat::Json,
            Self::Auto if stdout_is_terminal => ResolvedOutputFormat::Human,
            Self::Auto => ResolvedOutputFormat::Json,
        }
    }
}

pub(crate) fn objects<W: Write>(
    out: &mut W,
    format: ResolvedOutputFormat,
    names: &[String],
) -> Result<(), AppError> {
    match format {
        ResolvedOutputFormat::Json => write_json(out, &json!(names)),
        ResolvedOutputFormat::Human if names.is_empty() => {
            writeln!(out, "(the scene is empty)")?;
            Ok(())
        }
        ResolvedOutputFormat::Human => {
            for name in names {
                writeln!(out, "{name}")?;
            }
            Ok(())
        }
    }
}

pub(crate) fn detail<W: Write>(
    out: &mut W,
    format: ResolvedOutputFormat,
    detail: &Value,
) -> Result<(), AppError> {
    match (format, detail) {
        (ResolvedOutputFormat::Human, Value::Object(fields)) => {
            for (key, value) in fields {
                writeln!(out, "{key}: {}", plain(value))?;
            }
            Ok(())
        }
        (ResolvedOutputFormat::Human, other) => {
            writeln!(out, "{}", plain(other))?;
            Ok(())
        }
        (ResolvedOutputFormat::Json, _) => write_json(out, detail),
    }
}

pub(crate) fn context<W: Write>(
    out: &mut W,
    format: ResolvedOutputFormat,
    context: &str,
) -> Result<(), AppError> {
    match format {
        ResolvedOutputFormat::Human => {
            writeln!(out, "{context}")?;
            Ok(())
        }
        ResolvedOutputFormat::Json => write_json(out, &json!({ "context": context })),
    }
}

pub(crate) fn report<W: Write>(
    out: &mut W,
    format: ResolvedOutputFormat,
    report: &PlanReport,
) -> Result<(), AppError> {
    if format == ResolvedOutputFormat::Json {
        return write_json(out, &serde_json::to_value(report)?);
    }

    for step in &report.steps {
        let operation = step.operation.as_deref().unwrap_or("(no operation)");
        let summary = match &step.outcome {
            StepOutcome::Invalid => "skipped".to_owned(),
            StepOutcome::Completed(payload) => format!("completed: {}", payload_summary(payload)),
            StepOutcome::Failed(error) => format!("failed: {} [{}]", error.message, error.code),
            StepOutcome::Transport(reason) => format!("not answered: {reason}"),
        };
        writeln!(out, "{}. {operation}: {summary}", step.number)?;
    }
    let suffix = if report.aborted { " (aborted)" } else { "" };
    writeln!(
        out,
        "{} of {} steps completed{suffix}",
        report.completed(),
        report.steps.len()
    )?;
    Ok(())
}

fn write_json<W: Write>(out: &mut W, value: &Value) -> Result<(), AppError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Strings without quotes, everything else as compact JSON.
fn plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn payload_summary(payload: &Value) -> String {
    payload
        .get("message")
        .or_else(|| payload.get("data"))
        .map_or_else(|| plain(payload), plain)
}
