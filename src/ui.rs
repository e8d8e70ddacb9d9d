use colored::Colorize;
use declarative::{ChangeEvent, ChangeOp, DiffSummary, ExecuteReport, NodeResult};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

// ============================================================================
// Changes
// ============================================================================

fn marker(op: ChangeOp) -> colored::ColoredString {
    match op {
        ChangeOp::Create => "+".green().bold(),
        ChangeOp::Update => "~".yellow().bold(),
        ChangeOp::Delete => "-".red().bold(),
    }
}

/// Print one change; updates also show their field-level diff.
pub fn change(event: &ChangeEvent) {
    println!(
        "  {} {} {} {}",
        marker(event.op),
        event.kind.to_string().cyan(),
        event.identity,
        format!("({})", event.id).dimmed()
    );
    if event.op != ChangeOp::Update {
        return;
    }
    let (Some(previous), Some(payload)) = (&event.previous, &event.payload) else {
        return;
    };
    for (tag, line) in json_diff(previous, payload) {
        match tag {
            ChangeTag::Delete => println!("      {}", format!("- {line}").red()),
            ChangeTag::Insert => println!("      {}", format!("+ {line}").green()),
            ChangeTag::Equal => {}
        }
    }
}

/// Changed lines between the pretty-printed forms of two values.
///
/// Timestamps are left out; they never represent an intended change.
pub fn json_diff(old: &Value, new: &Value) -> Vec<(ChangeTag, String)> {
    let old = pretty(old);
    let new = pretty(new);
    TextDiff::from_lines(&old, &new)
        .iter_all_changes()
        .filter(|c| c.tag() != ChangeTag::Equal)
        .map(|c| (c.tag(), c.value().trim_end().to_string()))
        .collect()
}

fn pretty(value: &Value) -> String {
    let mut value = value.clone();
    if let Value::Object(fields) = &mut value {
        fields.remove("created_at");
        fields.remove("updated_at");
    }
    serde_json::to_string_pretty(&value).unwrap_or_default()
}

/// Print per-kind change counts.
pub fn summary(summary: &DiffSummary) {
    for (kind, counts) in &summary.by_kind {
        println!(
            "  {:<20} {} {} {}",
            kind.to_string(),
            format!("+{}", counts.creates).green(),
            format!("~{}", counts.updates).yellow(),
            format!("-{}", counts.deletes).red()
        );
    }
    let totals = summary.totals();
    println!(
        "  {:<20} {} to create, {} to update, {} to delete",
        "total".bold(),
        totals.creates,
        totals.updates,
        totals.deletes
    );
}

/// One line describing a failed, skipped or cancelled event.
pub fn failure_line(result: &NodeResult) -> String {
    let error = result
        .error()
        .map(ToString::to_string)
        .unwrap_or_default();
    format!("{} {} {}: {error}", result.op, result.kind, result.identity)
}

/// Print the outcome of a sync.
pub fn report(report: &ExecuteReport) {
    let summary = report.summary();
    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        header("Failures");
        for result in failures {
            error(&failure_line(result));
        }
    }

    println!();
    let line = format!(
        "{} created, {} updated, {} deleted",
        summary.created, summary.updated, summary.deleted
    );
    if summary.is_success() {
        success(&line);
    } else {
        warn(&format!(
            "{line}; {} failed, {} skipped, {} cancelled",
            summary.failed, summary.skipped, summary.cancelled
        ));
    }
}
