//! Terminal formatting for records and run results.
//!
//! Supports a table view and JSON.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::domain::{ExportRecord, GeoLocation, ItemDiagnostic, Platform, ProcessingResult};

/// Output format options.
#[derive(Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Compact table listing.
    #[default]
    Table,
    /// JSON format for programmatic use.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {s}. Use: table, json")),
        }
    }
}

/// Serializable view of a normalized record.
#[derive(Debug, Serialize)]
struct RecordView<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<GeoLocation>,
    overlays: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
}

impl<'a> From<&'a ExportRecord> for RecordView<'a> {
    fn from(r: &'a ExportRecord) -> Self {
        Self {
            id: &r.id,
            timestamp: r.timestamp.map(|t| t.to_rfc3339()),
            media_path: r.media_path.as_deref(),
            caption: r.caption.as_deref(),
            text: r.text.as_deref(),
            sender: r.sender.as_deref(),
            reply_to: r.reply_to.as_deref(),
            location: r.location,
            overlays: r.overlays.len(),
            source: r.source.as_deref(),
        }
    }
}

/// Formats records as JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_records_json(records: &[ExportRecord]) -> Result<String, serde_json::Error> {
    let views = records.iter().map(RecordView::from).collect::<Vec<_>>();
    serde_json::to_string_pretty(&views)
}

/// Formats a table listing of records.
pub fn format_records_table(records: &[ExportRecord]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Date", "Sender", "Overlays", "Text / Caption"]);

    for record in records {
        let date = record.timestamp.map_or_else(
            || "-".to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M").to_string(),
        );
        let body = record
            .text
            .as_deref()
            .or(record.caption.as_deref())
            .or(record.media_path.as_deref())
            .unwrap_or("-");

        table.add_row(vec![
            truncate(&record.id, 24),
            date,
            record.sender.clone().unwrap_or_else(|| "-".to_string()),
            record.overlays.len().to_string(),
            truncate(body, 40),
        ]);
    }

    table.to_string()
}

/// Formats the outcome of a run for display.
pub fn format_summary(platform: Platform, result: &ProcessingResult) -> String {
    let status = if result.processed == result.total {
        "✅ Restore complete".green().bold()
    } else {
        "⚠️  Restore finished with omissions".yellow().bold()
    };

    let mut out = format!(
        "{status}\n  Platform: {}\n  Restored: {} of {}\n  Output files: {}\n  Previews: {}",
        platform.display_name().cyan(),
        result.processed.to_string().green(),
        result.total.to_string().cyan(),
        result.files.len().to_string().cyan(),
        result.previews.len().to_string().cyan(),
    );
    if let Some(note) = &result.note {
        out.push_str(&format!("\n  Note: {}", note.dimmed()));
    }
    out
}

/// Formats per-item diagnostics as a table.
pub fn format_diagnostics_table(diagnostics: &[ItemDiagnostic], limit: usize) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Record", "Problem"]);

    for d in diagnostics.iter().take(limit) {
        table.add_row(vec![truncate(&d.record_id, 30), truncate(&d.message, 60)]);
    }

    let mut out = table.to_string();
    if diagnostics.len() > limit {
        out.push_str(&format!("\n... and {} more", diagnostics.len() - limit));
    }
    out
}

/// Formats the platform catalog.
pub fn format_platforms_table() -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Platform", "Name", "Output", "Status"]);

    for platform in Platform::ALL {
        let output = match platform.output_mode() {
            crate::domain::OutputMode::MediaArchive => "zip archive",
            crate::domain::OutputMode::Document => "html document",
        };
        let status = if platform.is_available() {
            "available"
        } else {
            "not yet available"
        };
        table.add_row(vec![
            platform.file_prefix(),
            platform.display_name(),
            output,
            status,
        ]);
    }

    table.to_string()
}

/// Truncates a string to max characters with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept = s.chars().take(max_len.saturating_sub(3)).collect::<String>();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world!", 8), "hello...");
        assert_eq!(truncate("żółć gęślą jaźń", 7), "żółć...");
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table)));
        assert!(matches!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_records_json() {
        let mut record = ExportRecord::with_id("abc");
        record.caption = Some("beach".to_string());
        let json = format_records_json(&[record]).unwrap();
        assert!(json.contains("\"id\": \"abc\""));
        assert!(json.contains("\"caption\": \"beach\""));
        assert!(!json.contains("timestamp"));
    }

    #[test]
    fn test_platforms_table_lists_all() {
        let table = format_platforms_table();
        for platform in Platform::ALL {
            assert!(table.contains(platform.display_name()));
        }
        assert!(table.contains("not yet available"));
    }
}
