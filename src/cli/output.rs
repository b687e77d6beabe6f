//! Output formatting helpers for CLI commands

use crate::quality::AnswerGenerationResult;
use crate::store::UsageMetricRow;
use crate::vault::CredentialSummary;
use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Pretty JSON with a single top-level key.
pub fn wrap_json<T: Serialize>(key: &str, value: &T) -> Result<String, serde_json::Error> {
    let mut object = serde_json::Map::new();
    object.insert(key.to_string(), serde_json::to_value(value)?);
    serde_json::to_string_pretty(&object)
}

/// Format credentials as a table
pub fn format_credentials_table(credentials: &[CredentialSummary]) -> String {
    let mut table = new_table(vec![
        "ID", "Provider", "Label", "Key", "Default", "Expires", "Last Used",
    ]);

    for c in credentials {
        let default = if c.is_default {
            "yes".green().to_string()
        } else {
            "no".to_string()
        };
        let expires = if c.expired {
            format!("{} (expired)", format_time(c.expires_at)).red().to_string()
        } else {
            format_time(c.expires_at)
        };

        table.add_row(vec![
            Cell::new(c.id),
            Cell::new(&c.provider),
            Cell::new(&c.label),
            Cell::new(&c.masked_key),
            Cell::new(default),
            Cell::new(expires),
            Cell::new(format_time(c.last_used_at)),
        ]);
    }

    table.to_string()
}

/// Format usage rows as a table
pub fn format_usage_table(rows: &[UsageMetricRow]) -> String {
    let mut table = new_table(vec!["Date", "Metric", "Source", "Value"]);

    for row in rows {
        table.add_row(vec![
            Cell::new(&row.date),
            Cell::new(&row.metric_type),
            Cell::new(&row.source),
            Cell::new(row.value),
        ]);
    }

    table.to_string()
}

/// Format a gated answer for the terminal
pub fn format_answer(result: &AnswerGenerationResult) -> String {
    let mut output = result.answer.clone();
    output.push_str("\n\n");

    let confidence = result
        .confidence
        .map(|c| format!("{:.0}%", c * 100.0))
        .unwrap_or_else(|| "-".to_string());
    let meta = format!(
        "provider: {}  model: {}  confidence: {}  tokens: {}",
        result.provider,
        result.model.as_deref().unwrap_or("auto"),
        confidence,
        result.usage.total_tokens
    );
    output.push_str(&meta.dimmed().to_string());

    if result.used_fallback {
        output.push('\n');
        output.push_str(&"fallback message used".yellow().to_string());
    }
    output
}
