//! Output packaging.
//!
//! Media platforms deliver a new archive of restored items plus a
//! `metadata.json` sidecar; document platforms deliver one HTML file built
//! from a fixed template. Filenames are allocated so that no two outputs
//! collide, even on case-insensitive filesystems.

use std::collections::HashSet;
use std::fmt::Write as _;

use serde::Serialize;

use crate::domain::{
    AppError, Conversation, ExportRecord, GeoLocation, MediaKind, OutputFiles, OutputMode,
    Platform, Preview, RestoredItem, Result,
};
use crate::infrastructure::{build_archive, generate_thumbnail, ThumbnailConfig};

/// Name of the sidecar written into media archives.
pub const SIDECAR_NAME: &str = "metadata.json";

const DOCUMENT_STYLE: &str = "\
body { font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif; max-width: 820px; margin: 2em auto; color: #1c1e21; }
h1 { font-size: 1.6em; border-bottom: 1px solid #ddd; padding-bottom: .3em; }
section.conversation { page-break-after: always; margin-bottom: 2em; }
section.conversation h2 { font-size: 1.2em; margin-bottom: .2em; }
p.meta { color: #65676b; font-size: .85em; margin-top: 0; }
div.message { margin: .6em 0; padding: .5em .8em; border-radius: 8px; background: #f0f2f5; }
div.message.reply { margin-left: 2em; }
span.sender { font-weight: 600; margin-right: .5em; }
time { color: #65676b; font-size: .8em; }
p.text { margin: .3em 0 0; white-space: pre-wrap; }
";

/// Escapes text for inclusion in HTML.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wraps body markup in the document template.
///
/// The wrapper structure is fixed; only the title and body vary.
#[must_use]
pub fn render_document(title: &str, body: &str) -> String {
    let title = escape_html(title);
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>\n{DOCUMENT_STYLE}</style>\n</head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n"
    )
}

fn render_message(out: &mut String, record: &ExportRecord) {
    let class = if record.reply_to.is_some() {
        "message reply"
    } else {
        "message"
    };
    let _ = write!(out, "<div class=\"{class}\">");
    if let Some(sender) = &record.sender {
        let _ = write!(out, "<span class=\"sender\">{}</span>", escape_html(sender));
    }
    if let Some(ts) = record.timestamp {
        let _ = write!(
            out,
            "<time datetime=\"{}\">{}</time>",
            ts.to_rfc3339(),
            ts.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    let body = record
        .text
        .as_deref()
        .or(record.caption.as_deref())
        .unwrap_or_default();
    let _ = writeln!(out, "<p class=\"text\">{}</p></div>", escape_html(body));
}

/// Renders conversations as document body markup.
#[must_use]
pub fn render_conversations(conversations: &[Conversation]) -> String {
    let mut out = String::new();
    for (i, conversation) in conversations.iter().enumerate() {
        let heading = conversation
            .title
            .clone()
            .unwrap_or_else(|| format!("Conversation {}", i + 1));
        let _ = writeln!(out, "<section class=\"conversation\" id=\"c{}\">", i + 1);
        let _ = writeln!(out, "<h2>{}</h2>", escape_html(&heading));

        let mut meta = format!("{} messages", conversation.message_count());
        if !conversation.participants.is_empty() {
            let _ = write!(meta, " · {}", conversation.participants.join(", "));
        }
        if let (Some(start), Some(end)) = (conversation.started_at(), conversation.ended_at()) {
            let _ = write!(
                meta,
                " · {} to {}",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M")
            );
        }
        let _ = writeln!(out, "<p class=\"meta\">{}</p>", escape_html(&meta));

        for record in &conversation.records {
            render_message(&mut out, record);
        }
        out.push_str("</section>\n");
    }
    out
}

/// Document filename for a platform.
#[must_use]
pub fn document_name(platform: Platform) -> String {
    format!("{}_conversations.html", platform.file_prefix())
}

/// Keeps alphanumerics and underscores, mapping everything else to `_`,
/// and bounds the length.
#[must_use]
pub fn sanitize_id(id: &str, max_len: usize) -> String {
    let cleaned = id
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>();
    let trimmed = cleaned.trim_matches('_');
    trimmed.chars().take(max_len).collect()
}

/// Allocates `{prefix}_{date|unknown}_{id}.{ext}` names without collisions.
#[derive(Debug)]
pub struct FilenameAllocator {
    prefix: &'static str,
    max_id_len: usize,
    used: HashSet<String>,
    counter: usize,
}

impl FilenameAllocator {
    #[must_use]
    pub fn new(platform: Platform, max_id_len: usize) -> Self {
        Self {
            prefix: platform.file_prefix(),
            max_id_len: max_id_len.max(1),
            used: HashSet::new(),
            counter: 0,
        }
    }

    /// Reserves a name for the record's output.
    pub fn allocate(&mut self, record: &ExportRecord, extension: &str) -> String {
        self.counter += 1;
        let date = record
            .timestamp
            .map_or_else(|| "unknown".to_string(), |t| t.format("%Y-%m-%d").to_string());
        let mut id = sanitize_id(&record.id, self.max_id_len);
        if id.is_empty() {
            id = format!("item{}", self.counter);
        }

        let stem = format!("{}_{date}_{id}", self.prefix);
        let mut name = format!("{stem}.{extension}");
        let mut suffix = 2;
        // Case-insensitive so the archive extracts cleanly everywhere.
        while !self.used.insert(name.to_ascii_lowercase()) {
            name = format!("{stem}_{suffix}.{extension}");
            suffix += 1;
        }
        name
    }
}

/// Hands out at most `limit` previews, thumbnailing images only.
#[derive(Debug)]
pub struct PreviewCollector {
    limit: usize,
    config: ThumbnailConfig,
    issued: usize,
}

impl PreviewCollector {
    #[must_use]
    pub const fn new(limit: usize, config: ThumbnailConfig) -> Self {
        Self {
            limit,
            config,
            issued: 0,
        }
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.issued >= self.limit
    }

    /// Generates a thumbnail if there is room.
    pub fn offer(&mut self, filename: &str, bytes: &[u8], kind: MediaKind) -> Option<Vec<u8>> {
        if self.is_full() || kind != MediaKind::Image {
            return None;
        }
        match generate_thumbnail(bytes, self.config) {
            Ok(thumbnail) => {
                self.issued += 1;
                Some(thumbnail)
            }
            Err(e) => {
                tracing::debug!(filename, error = %e, "No preview for item");
                None
            }
        }
    }
}

/// One restored item as described in the sidecar.
#[derive(Debug, Clone, Serialize)]
pub struct SidecarEntry {
    pub filename: String,
    pub id: String,
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    pub source_entry: String,
}

impl SidecarEntry {
    #[must_use]
    pub fn new(item: &RestoredItem, record: &ExportRecord, source_entry: &str) -> Self {
        Self {
            filename: item.filename.clone(),
            id: record.id.clone(),
            kind: item.kind,
            timestamp: record.timestamp.map(|t| t.to_rfc3339()),
            caption: record.caption.clone(),
            location: record.location,
            source_entry: source_entry.to_string(),
        }
    }
}

/// Splits restored items into output files, sidecar entries and previews.
#[must_use]
pub fn package_items(
    restored: Vec<(RestoredItem, SidecarEntry)>,
) -> (OutputFiles, Vec<SidecarEntry>, Vec<Preview>) {
    let mut files = OutputFiles::new();
    let mut sidecar = Vec::with_capacity(restored.len());
    let mut previews = Vec::new();
    for (item, entry) in restored {
        if let Some(thumbnail) = item.thumbnail {
            previews.push(Preview {
                filename: item.filename.clone(),
                thumbnail,
            });
        }
        files.insert(item.filename, item.bytes);
        sidecar.push(entry);
    }
    (files, sidecar, previews)
}

#[derive(Serialize)]
struct Sidecar<'a> {
    platform: Platform,
    items: &'a [SidecarEntry],
}

/// Serializes the sidecar document.
///
/// # Errors
/// Returns error if serialization fails.
pub fn render_sidecar(platform: Platform, entries: &[SidecarEntry]) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(&Sidecar {
        platform,
        items: entries,
    })
    .map_err(AppError::json_parse)
}

/// The single file a user downloads.
#[derive(Debug, Clone)]
pub struct Deliverable {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Turns a run's output files into its deliverable: the document itself for
/// document platforms, a fresh archive otherwise.
///
/// # Errors
/// Returns error if there is nothing to deliver or the archive cannot be
/// built.
pub fn deliverable(platform: Platform, files: &OutputFiles) -> Result<Deliverable> {
    match platform.output_mode() {
        OutputMode::Document => {
            let name = document_name(platform);
            let bytes = files
                .get(&name)
                .or_else(|| files.iter().next().map(|(_, b)| b))
                .ok_or_else(|| AppError::NotFound { name: name.clone() })?;
            Ok(Deliverable {
                name,
                bytes: bytes.to_vec(),
            })
        }
        OutputMode::MediaArchive => Ok(Deliverable {
            name: format!("{}_restored.zip", platform.file_prefix()),
            bytes: build_archive(files)?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use image::{DynamicImage, ImageOutputFormat, RgbImage};
    use std::io::Cursor;

    fn dated(id: &str) -> ExportRecord {
        ExportRecord {
            timestamp: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single(),
            ..ExportRecord::with_id(id)
        }
    }

    #[test]
    fn test_filename_format() {
        let mut names = FilenameAllocator::new(Platform::Snapchat, 64);
        assert_eq!(names.allocate(&dated("abc123"), "jpg"), "snap_2020-01-01_abc123.jpg");
        assert_eq!(
            names.allocate(&ExportRecord::with_id("x"), "mp4"),
            "snap_unknown_x.mp4"
        );
    }

    #[test]
    fn test_case_and_separator_variants_do_not_collide() {
        let mut names = FilenameAllocator::new(Platform::Instagram, 64);
        let a = names.allocate(&dated("ab-cd"), "jpg");
        let b = names.allocate(&dated("ab_cd"), "jpg");
        let c = names.allocate(&dated("AB_CD"), "jpg");
        assert_eq!(a, "insta_2020-01-01_ab_cd.jpg");
        assert_ne!(a.to_lowercase(), b.to_lowercase());
        assert_ne!(b.to_lowercase(), c.to_lowercase());
        assert_ne!(a.to_lowercase(), c.to_lowercase());
    }

    #[test]
    fn test_sanitize_id_bounds() {
        assert_eq!(sanitize_id("a/b c", 64), "a_b_c");
        assert_eq!(sanitize_id("abcdef", 3), "abc");
        assert_eq!(sanitize_id("???", 64), "");

        let mut names = FilenameAllocator::new(Platform::TikTok, 64);
        assert_eq!(names.allocate(&ExportRecord::with_id("???"), "mp4"), "tiktok_unknown_item1.mp4");
    }

    #[test]
    fn test_document_template() {
        let html = render_document("A & B", "<p>hi</p>\n");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>A &amp; B</title>"));
        assert!(html.contains("<style>"));
        assert!(html.contains("<p>hi</p>"));
    }

    #[test]
    fn test_render_conversations_escapes() {
        let mut record = dated("1");
        record.sender = Some("<script>".to_string());
        record.text = Some("1 < 2".to_string());
        let body = render_conversations(&[Conversation::new("1", vec![record])]);
        assert!(body.contains("&lt;script&gt;"));
        assert!(body.contains("1 &lt; 2"));
        assert!(!body.contains("<script>"));
    }

    fn restored(filename: &str, kind: MediaKind, thumbnail: Option<Vec<u8>>) -> RestoredItem {
        RestoredItem {
            filename: filename.to_string(),
            bytes: vec![1, 2, 3],
            kind,
            thumbnail,
        }
    }

    #[test]
    fn test_preview_limit() {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(400, 400))
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .unwrap();

        let mut previews = PreviewCollector::new(2, ThumbnailConfig::default());
        let issued = (0..4)
            .filter_map(|i| previews.offer(&format!("{i}.png"), &png, MediaKind::Image))
            .collect::<Vec<_>>();
        assert!(previews.is_full());
        assert!(previews.offer("v.mp4", b"video", MediaKind::Video).is_none());

        assert_eq!(issued.len(), 2);
        let thumb = image::load_from_memory(&issued[0]).unwrap();
        assert!(thumb.width() <= 200 && thumb.height() <= 200);
    }

    #[test]
    fn test_package_items_takes_previews_from_items() {
        let record = ExportRecord::with_id("a");
        let photo = restored("snap_a.jpg", MediaKind::Image, Some(vec![0xFF, 0xD8]));
        let clip = restored("snap_b.mp4", MediaKind::Video, None);
        let photo_entry = SidecarEntry::new(&photo, &record, "memories/a.jpg");
        let clip_entry = SidecarEntry::new(&clip, &record, "memories/b.mp4");

        let (files, sidecar, previews) =
            package_items(vec![(photo, photo_entry), (clip, clip_entry)]);
        assert_eq!(files.len(), 2);
        assert_eq!(sidecar[1].kind, MediaKind::Video);
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].filename, "snap_a.jpg");

        let json = String::from_utf8(render_sidecar(Platform::Snapchat, &sidecar).unwrap()).unwrap();
        assert!(json.contains("\"kind\": \"video\""));
    }

    #[test]
    fn test_media_deliverable_is_archive() {
        let mut files = OutputFiles::new();
        files.insert("snap_unknown_a.jpg", vec![1, 2, 3]);
        let out = deliverable(Platform::Snapchat, &files).unwrap();
        assert_eq!(out.name, "snap_restored.zip");
        assert!(crate::infrastructure::looks_like_zip(&out.bytes));
    }
}
