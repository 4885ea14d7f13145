// crates/core/src/diagnostics.rs
//! Stack-trace extraction from the job-info endpoint.
//!
//! The payload is a tree: every node may carry `exc_info`, a `description`,
//! and a `children` map keyed by priority level whose values are ordered
//! lists of sub-job nodes. The first usable trace wins, searched depth-first
//! in the order the server sent the keys.

use serde_json::Value;

/// Find the first usable stack trace in a job-info payload and split it into
/// display lines. Returns `None` when no node carries anything usable.
pub fn extract_stacktrace(info: &Value) -> Option<Vec<String>> {
    find_trace(info).map(normalize_trace_lines)
}

fn find_trace(node: &Value) -> Option<&Value> {
    let fields = node.as_object()?;

    if let Some(exc_info) = fields.get("exc_info").filter(|v| is_usable(v)) {
        return Some(exc_info);
    }

    if let Some(children) = fields.get("children").and_then(Value::as_object) {
        for jobs in children.values() {
            let Some(jobs) = jobs.as_array() else {
                continue;
            };
            if let Some(found) = jobs.iter().find_map(find_trace) {
                return Some(found);
            }
        }
    }

    fields.get("description").filter(|v| is_usable(v))
}

fn is_usable(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::Bool(true) | Value::Number(_) => true,
    }
}

/// Normalize a trace value into lines: strings are split on line breaks,
/// arrays have each element stringified.
pub fn normalize_trace_lines(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => text.lines().map(str::to_owned).collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}
