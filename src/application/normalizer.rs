//! Metadata normalization.
//!
//! Locates the record array inside a platform's JSON document using an
//! ordered list of pure strategies, then converts every element into an
//! [`ExportRecord`].

use std::collections::VecDeque;
use std::path::Path;

use serde_json::Value;

use crate::domain::{AppError, ExportRecord, Platform, Result};
use crate::infrastructure::Container;

use super::markup;
use super::parser::{has_id_field, record_from_value};

/// How deep the known-key search descends into nested objects.
const MAX_KEY_DEPTH: usize = 4;

/// A pure extraction strategy: raw document to an optional record sequence.
pub type Strategy = fn(&Value, Platform) -> Option<Vec<Value>>;

/// Strategies in the order they are tried. The first non-empty result wins.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("bare-array", bare_array),
    ("known-key", known_key),
    ("record-array", first_record_array),
];

/// A document that has been read and classified.
#[derive(Debug, Clone)]
pub enum Document {
    Json { name: String, value: Value },
    Html { name: String, markup: String },
}

impl Document {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Json { name, .. } | Self::Html { name, .. } => name,
        }
    }

    /// Classifies text by its leading characters.
    ///
    /// # Errors
    /// Returns a format error if the text is neither JSON nor markup, or if
    /// it looks like JSON but is malformed.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let trimmed = text.trim_start_matches('\u{feff}').trim_start();

        if trimmed.starts_with('<') {
            return Ok(Self::Html {
                name,
                markup: trimmed.to_string(),
            });
        }

        let json = strip_assignment(trimmed);
        if json.starts_with('{') || json.starts_with('[') {
            let value =
                serde_json::from_str(json).map_err(|e| AppError::malformed_json(&name, e))?;
            return Ok(Self::Json { name, value });
        }

        Err(AppError::format(format!("{name} is neither JSON nor HTML")))
    }
}

/// Thread title carried by a document, if any.
#[must_use]
pub fn document_title(doc: &Document) -> Option<String> {
    match doc {
        Document::Json { value, .. } => value
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        Document::Html { markup, .. } => markup::document_title(markup),
    }
}

/// Strips a `window.YTD.tweet.part0 = ` style prefix.
#[must_use]
pub fn strip_assignment(text: &str) -> &str {
    if !text.starts_with("window.") {
        return text;
    }
    text.split_once('=')
        .map_or(text, |(_, rest)| rest.trim_start())
        .trim_end()
        .trim_end_matches(';')
}

/// The document itself is an array.
#[must_use]
pub fn bare_array(doc: &Value, _platform: Platform) -> Option<Vec<Value>> {
    doc.as_array().filter(|a| !a.is_empty()).cloned()
}

/// A platform-specific key holds the array, possibly a few levels down.
#[must_use]
pub fn known_key(doc: &Value, platform: Platform) -> Option<Vec<Value>> {
    let keys = platform.record_keys();
    let mut queue = VecDeque::from([(doc, 0_usize)]);

    while let Some((value, depth)) = queue.pop_front() {
        let Some(obj) = value.as_object() else {
            continue;
        };

        for key in keys {
            let hit = obj.get(*key).or_else(|| {
                obj.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            });
            if let Some(records) = hit.and_then(Value::as_array).filter(|a| !a.is_empty()) {
                return Some(records.clone());
            }
        }

        if depth < MAX_KEY_DEPTH {
            queue.extend(obj.values().filter(|v| v.is_object()).map(|v| (v, depth + 1)));
        }
    }

    None
}

/// The first top-level field holding an array of id-bearing objects.
#[must_use]
pub fn first_record_array(doc: &Value, _platform: Platform) -> Option<Vec<Value>> {
    doc.as_object()?
        .values()
        .filter_map(Value::as_array)
        .find(|items| !items.is_empty() && items.iter().map(unwrap_element).any(has_id_field))
        .cloned()
}

/// Unwraps single-key wrapper objects such as `{"tweet": {...}}`.
#[must_use]
pub fn unwrap_element(value: &Value) -> &Value {
    match value.as_object() {
        Some(obj) if obj.len() == 1 => match obj.values().next() {
            Some(inner @ Value::Object(_)) => inner,
            _ => value,
        },
        _ => value,
    }
}

/// Top-level keys of a document, for schema diagnostics.
#[must_use]
pub fn top_level_keys(doc: &Value) -> Vec<String> {
    doc.as_object()
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default()
}

/// Locates the raw record array of a JSON document.
///
/// # Errors
/// Returns a schema error listing the top-level keys when no strategy
/// finds a non-empty array.
pub fn locate_records(doc: &Value, platform: Platform) -> Result<Vec<Value>> {
    for (name, strategy) in STRATEGIES {
        if let Some(records) = strategy(doc, platform) {
            tracing::debug!(strategy = name, count = records.len(), "Record array located");
            return Ok(records);
        }
    }

    Err(AppError::schema(
        "no record array found",
        top_level_keys(doc),
    ))
}

/// Normalizes one parsed document into export records.
///
/// # Errors
/// Returns a schema error when no record structure is found.
pub fn normalize_document(
    doc: &Document,
    platform: Platform,
    default_font_size: f32,
) -> Result<Vec<ExportRecord>> {
    match doc {
        Document::Json { name, value } => {
            let raw = locate_records(value, platform)?;
            Ok(raw
                .iter()
                .enumerate()
                .map(|(i, element)| {
                    let fallback_id = format!("item{}", i + 1);
                    let mut record =
                        record_from_value(unwrap_element(element), &fallback_id, default_font_size);
                    record.source = Some(name.clone());
                    record
                })
                .collect())
        }
        Document::Html { name, markup } => {
            let mut records = markup::extract_records(markup, platform);
            for record in &mut records {
                record.source = Some(name.clone());
            }
            if records.is_empty() {
                return Err(AppError::schema(
                    format!("no message blocks in {name}"),
                    Vec::new(),
                ));
            }
            Ok(records)
        }
    }
}

/// Whether an archive entry is a metadata document.
#[must_use]
pub fn is_metadata_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    [".json", ".js", ".html", ".htm"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

fn file_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name)
}

/// Metadata documents worth parsing for `platform`, most specific first.
///
/// When any of the platform's well-known documents exist only those are
/// used; otherwise every JSON/HTML entry is a candidate.
#[must_use]
pub fn metadata_candidates(container: &Container, platform: Platform) -> Vec<String> {
    let docs = container
        .list()
        .iter()
        .filter(|n| is_metadata_entry(n) && !file_name(n).eq_ignore_ascii_case("metadata.json"))
        .cloned()
        .collect::<Vec<_>>();

    let preferred = docs
        .iter()
        .filter(|n| platform.is_metadata_document(file_name(n)))
        .cloned()
        .collect::<Vec<_>>();

    if preferred.is_empty() {
        docs
    } else {
        preferred
    }
}

/// Reads and parses one archive document.
///
/// # Errors
/// Returns error if the entry is missing or unparseable.
pub fn read_document(container: &Container, name: &str) -> Result<Document> {
    let text = container.read_text(name)?;
    Document::parse(name, &text)
}

/// Normalizes every metadata document in an archive.
///
/// Documents that fail to parse are skipped as long as at least one
/// document yields records.
///
/// # Errors
/// Returns a schema error (carrying the first document's keys) when no
/// document yields records.
pub fn normalize_container(
    container: &Container,
    platform: Platform,
    default_font_size: f32,
) -> Result<Vec<ExportRecord>> {
    let candidates = metadata_candidates(container, platform);
    if candidates.is_empty() {
        return Err(AppError::schema(
            "archive contains no metadata document",
            Vec::new(),
        ));
    }

    let mut records = Vec::new();
    let mut first_error = None;

    for name in &candidates {
        let outcome = read_document(container, name)
            .and_then(|doc| normalize_document(&doc, platform, default_font_size));
        match outcome {
            Ok(found) => {
                tracing::debug!(document = %name, records = found.len(), "Document normalized");
                records.extend(found);
            }
            Err(e) => {
                tracing::debug!(document = %name, error = %e, "Document skipped");
                first_error.get_or_insert(e);
            }
        }
    }

    match (records.is_empty(), first_error) {
        (false, _) => Ok(records),
        (true, Some(e)) => Err(e),
        (true, None) => Err(AppError::schema("no records found", Vec::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, OutputFiles};
    use crate::infrastructure::build_archive;
    use serde_json::json;

    #[test]
    fn test_bare_array() {
        let doc = json!([{"id": "a"}]);
        assert_eq!(bare_array(&doc, Platform::Snapchat).unwrap().len(), 1);
        assert!(bare_array(&json!([]), Platform::Snapchat).is_none());
    }

    #[test]
    fn test_known_key_nested() {
        let doc = json!({"Video": {"Videos": {"VideoList": [{"Date": "2020-01-01"}]}}});
        assert_eq!(known_key(&doc, Platform::TikTok).unwrap().len(), 1);
    }

    #[test]
    fn test_known_key_case_insensitive() {
        let doc = json!({"SAVED MEDIA": [{"Date": "2020-01-01"}]});
        assert!(known_key(&doc, Platform::Snapchat).is_some());
    }

    #[test]
    fn test_first_record_array_requires_ids() {
        let doc = json!({"meta": [1, 2], "things": [{"id": "x"}]});
        let found = first_record_array(&doc, Platform::Instagram).unwrap();
        assert_eq!(found[0]["id"], "x");

        let doc = json!({"meta": [{"name": "n"}]});
        assert!(first_record_array(&doc, Platform::Instagram).is_none());
    }

    #[test]
    fn test_schema_error_lists_keys() {
        let err = locate_records(&json!({"Other": []}), Platform::Snapchat).unwrap_err();
        match &err {
            AppError::Schema { keys, .. } => assert_eq!(keys, &vec!["Other".to_string()]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("\"Other\""));
    }

    #[test]
    fn test_twitter_assignment_prefix() {
        let doc = Document::parse(
            "data/tweets.js",
            "window.YTD.tweets.part0 = [{\"tweet\": {\"id_str\": \"42\", \"full_text\": \"hello\"}}];",
        )
        .unwrap();
        let records = normalize_document(&doc, Platform::Twitter, 24.0).unwrap();
        assert_eq!(records[0].id, "42");
        assert_eq!(records[0].text.as_deref(), Some("hello"));
        assert_eq!(records[0].source.as_deref(), Some("data/tweets.js"));
    }

    #[test]
    fn test_document_parse_rejects_binary() {
        let err = Document::parse("x.bin", "\u{0}\u{1}garbage").unwrap_err();
        assert!(matches!(err, AppError::Format { .. }));
    }

    #[test]
    fn test_malformed_json_is_a_format_error() {
        let err = Document::parse("memories.json", "{\"Memories\":[{\"MemoryKey\":\"a\",}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("memories.json"));

        let mut files = OutputFiles::new();
        files.insert(
            "json/memories_history.json",
            b"{\"Saved Media\": [{\"MemoryKey\": \"m1\",}".to_vec(),
        );
        let archive = Container::open(build_archive(&files).unwrap()).unwrap();
        let err = normalize_container(&archive, Platform::Snapchat, 24.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_normalize_container_prefers_known_documents() {
        let mut files = OutputFiles::new();
        files.insert(
            "json/memories_history.json",
            br#"{"Saved Media": [{"Date": "2020-01-01 00:00:00 UTC", "MemoryKey": "m1"}]}"#.to_vec(),
        );
        files.insert("json/account.json", br#"{"friends": [{"id": "f1"}]}"#.to_vec());
        let archive = Container::open(build_archive(&files).unwrap()).unwrap();

        let records = normalize_container(&archive, Platform::Snapchat, 24.0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "m1");
    }

    #[test]
    fn test_normalize_container_without_documents() {
        let mut files = OutputFiles::new();
        files.insert("a.jpg", vec![0xFF, 0xD8]);
        let archive = Container::open(build_archive(&files).unwrap()).unwrap();

        let err = normalize_container(&archive, Platform::Snapchat, 24.0).unwrap_err();
        assert!(matches!(err, AppError::Schema { .. }));
    }
}
