//! Restoration run shared by document platforms: rebuild conversations and
//! render them into one HTML file.

use crate::application::conversations::{group_by_reply, segment_by_gap};
use crate::application::normalizer::{
    document_title, metadata_candidates, normalize_document, read_document, Document,
};
use crate::application::packager::{document_name, render_conversations, render_document};
use crate::application::pipeline::{diagnostic, InputKind, RunContext, SourceInput, Stage};
use crate::domain::{
    AppError, Conversation, ExportRecord, ItemDiagnostic, OutputFiles, Platform,
    ProcessingResult, Result,
};
use crate::infrastructure::Container;

/// How a platform's flat records become conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// Each document is a thread, split where messages are far apart.
    TimeGap,
    /// Records are threaded by reply references across all documents.
    ReplyChain,
}

struct ParsedDocument {
    name: String,
    title: Option<String>,
    records: Vec<ExportRecord>,
}

fn parse_one(doc: &Document, platform: Platform, font: f32) -> Result<ParsedDocument> {
    Ok(ParsedDocument {
        name: doc.name().to_string(),
        title: document_title(doc),
        records: normalize_document(doc, platform, font)?,
    })
}

/// Thread name from a document path, e.g. `inbox/alex_123/message_1.json`
/// gives `alex_123`.
fn folder_title(name: &str) -> Option<String> {
    let mut parts = name.rsplit('/');
    parts.next()?;
    parts.next().filter(|p| !p.is_empty()).map(str::to_string)
}

fn read_documents(
    platform: Platform,
    input: &SourceInput,
    kind: InputKind,
    ctx: &mut RunContext<'_>,
) -> Result<(Vec<ParsedDocument>, Vec<ItemDiagnostic>)> {
    let font = ctx.config.image.default_font_size;

    if kind != InputKind::Archive {
        if !matches!(kind, InputKind::Json | InputKind::Html) {
            return Err(AppError::format(format!(
                "{} cannot read {kind:?} input",
                platform.display_name()
            )));
        }
        ctx.progress.enter(Stage::Parsing, "Parsing export document...");
        let doc = Document::parse(input.name.clone(), &input.text())?;
        return Ok((vec![parse_one(&doc, platform, font)?], Vec::new()));
    }

    ctx.progress.enter(Stage::Extracting, "Opening archive...");
    let container = Container::open(input.bytes.clone())?;

    ctx.progress.enter(Stage::Parsing, "Parsing export documents...");
    let candidates = metadata_candidates(&container, platform);
    let mut parsed = Vec::new();
    let mut skipped = Vec::new();
    let mut first_error = None;

    for name in &candidates {
        match read_document(&container, name).and_then(|doc| parse_one(&doc, platform, font)) {
            Ok(doc) => parsed.push(doc),
            Err(e) => {
                tracing::warn!(document = %name, error = %e, "Skipping document");
                skipped.push(diagnostic(name, &e));
                first_error.get_or_insert(e);
            }
        }
    }

    if parsed.is_empty() {
        return Err(first_error.unwrap_or_else(|| {
            AppError::schema("archive contains no conversation documents", Vec::new())
        }));
    }
    Ok((parsed, skipped))
}

fn build_conversations(
    grouping: Grouping,
    documents: Vec<ParsedDocument>,
    gap: chrono::Duration,
) -> Vec<Conversation> {
    match grouping {
        Grouping::TimeGap => documents
            .into_iter()
            .flat_map(|doc| {
                let title = doc.title.or_else(|| folder_title(&doc.name));
                let segments = segment_by_gap(doc.records, gap);
                let parts = segments.len();
                segments.into_iter().enumerate().map(move |(i, mut c)| {
                    c.title = match (&title, parts) {
                        (Some(t), 1) => Some(t.clone()),
                        (Some(t), _) => Some(format!("{t} (part {})", i + 1)),
                        (None, _) => None,
                    };
                    c
                })
            })
            .collect(),
        Grouping::ReplyChain => {
            let records = documents.into_iter().flat_map(|d| d.records).collect();
            group_by_reply(records)
        }
    }
}

/// Runs the document pipeline.
///
/// # Errors
/// Returns the structural error that stopped the run.
pub async fn restore(
    platform: Platform,
    grouping: Grouping,
    input: SourceInput,
    ctx: &mut RunContext<'_>,
) -> Result<ProcessingResult> {
    ctx.progress
        .enter(Stage::Reading, format!("Reading {} export...", platform.display_name()));
    let kind = input.kind()?;
    tokio::task::yield_now().await;

    let (documents, diagnostics) = read_documents(platform, &input, kind, ctx)?;
    let total = documents.iter().map(|d| d.records.len()).sum::<usize>();
    if total == 0 {
        return Err(AppError::schema("export contains no messages", Vec::new()));
    }

    ctx.progress
        .enter(Stage::MatchingAndTransforming, "Reconstructing conversations...");
    let conversations = build_conversations(grouping, documents, ctx.config.conversation_gap());
    let processed = conversations.iter().map(Conversation::message_count).sum::<usize>();
    ctx.progress.item(processed, total);
    tracing::info!(conversations = conversations.len(), messages = processed, "Conversations rebuilt");

    ctx.progress.enter(Stage::Packaging, "Rendering document...");
    tokio::task::yield_now().await;
    let title = format!("{} conversations", platform.display_name());
    let html = render_document(&title, &render_conversations(&conversations));

    let mut files = OutputFiles::new();
    files.insert(document_name(platform), html.into_bytes());

    Ok(ProcessingResult {
        success: true,
        processed,
        total,
        files,
        note: Some(format!("{} conversations reconstructed", conversations.len())),
        diagnostics,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_title() {
        assert_eq!(
            folder_title("messages/inbox/alex_123/message_1.json").as_deref(),
            Some("alex_123")
        );
        assert_eq!(folder_title("message_1.json"), None);
    }
}
