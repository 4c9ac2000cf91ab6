//! Domain models for restored export data.
//!
//! These models are the canonical shapes every platform's metadata is
//! normalized into, plus the result handed back to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Image or video payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Extensions recognized as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "heic"];

/// Extensions recognized as videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "webm", "avi", "3gp"];

impl MediaKind {
    /// Infer the kind from a file name's extension.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = extension(path)?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// Lowercased extension of a path, without the dot.
#[must_use]
pub fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Geographic coordinates attached to a record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Placement of an overlay on the base image.
///
/// Relative positions are fractions of the base image's size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub relative: bool,
}

impl Position {
    /// Absolute position in pixels.
    #[must_use]
    pub const fn absolute(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            relative: false,
        }
    }

    /// Resolve against base image dimensions.
    #[must_use]
    pub fn resolve(&self, width: u32, height: u32) -> (f32, f32) {
        if self.relative {
            (self.x * width as f32, self.y * height as f32)
        } else {
            (self.x, self.y)
        }
    }
}

/// Where an image overlay's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlaySource {
    /// Another entry of the same archive.
    ArchiveEntry(String),
    /// Inline `data:` URL.
    DataUrl(String),
    /// Remote `http(s)` URL, fetched with a timeout.
    Remote(String),
}

impl OverlaySource {
    /// Classify a raw reference string.
    #[must_use]
    pub fn from_reference(reference: &str) -> Self {
        if reference.starts_with("data:") {
            Self::DataUrl(reference.to_string())
        } else if reference.starts_with("http://") || reference.starts_with("https://") {
            Self::Remote(reference.to_string())
        } else {
            Self::ArchiveEntry(reference.to_string())
        }
    }
}

/// An image layered onto the base.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOverlay {
    pub source: OverlaySource,
    pub position: Position,
    /// Target size; the overlay's natural size when absent.
    pub width: Option<f32>,
    pub height: Option<f32>,
    /// 0.0 (invisible) to 1.0 (opaque).
    pub opacity: f32,
}

/// Text drawn onto the base.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub text: String,
    pub position: Position,
    pub font_size: f32,
    /// CSS-style color (`#fff`, `#ffffff`, `#ffffffcc` or a basic name).
    pub color: String,
    /// Wrap words onto new lines past this width.
    pub max_width: Option<f32>,
}

/// One compositing step, applied in source order.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayDirective {
    Image(ImageOverlay),
    Text(TextOverlay),
}

/// Canonical description of one media or message item.
#[derive(Debug, Clone, Default)]
pub struct ExportRecord {
    /// Identifier or key; empty when the export had none.
    pub id: String,
    /// When the item was captured or sent.
    pub timestamp: Option<DateTime<Utc>>,
    /// Explicit media path or download reference.
    pub media_path: Option<String>,
    /// Kind declared by the metadata, if any.
    pub media_kind: Option<MediaKind>,
    /// Caption text lost during export.
    pub caption: Option<String>,
    /// Overlays and stickers, in source order.
    pub overlays: Vec<OverlayDirective>,
    pub location: Option<GeoLocation>,
    pub sender: Option<String>,
    /// Id of the record this one replies to.
    pub reply_to: Option<String>,
    /// Message or post body.
    pub text: Option<String>,
    /// Document the record was read from.
    pub source: Option<String>,
}

impl ExportRecord {
    /// Create a record with just an id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Timestamp in milliseconds, missing timestamps sort as epoch zero.
    #[must_use]
    pub fn sort_key(&self) -> i64 {
        self.timestamp.map_or(0, |t| t.timestamp_millis())
    }
}

/// A binary payload resolved for a record.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub bytes: Vec<u8>,
    /// Entry name inside the source archive.
    pub path: String,
    pub kind: MediaKind,
}

/// A media asset after compositing and timestamp restoration.
#[derive(Debug, Clone)]
pub struct RestoredItem {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub kind: MediaKind,
    /// Preview generated while the item was restored, if any.
    pub thumbnail: Option<Vec<u8>>,
}

/// Records linked by reply-reference or temporal proximity.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    /// Id of the first record, or a generated index.
    pub id: String,
    pub title: Option<String>,
    /// Records ordered by timestamp.
    pub records: Vec<ExportRecord>,
    /// Distinct senders, in order of first appearance.
    pub participants: Vec<String>,
}

impl Conversation {
    /// Build a conversation and derive its participant set.
    #[must_use]
    pub fn new(id: impl Into<String>, records: Vec<ExportRecord>) -> Self {
        let mut participants: Vec<String> = Vec::new();
        for sender in records.iter().filter_map(|r| r.sender.as_deref()) {
            if !participants.iter().any(|p| p == sender) {
                participants.push(sender.to_string());
            }
        }
        Self {
            id: id.into(),
            title: None,
            records,
            participants,
        }
    }

    /// Get total message count.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.records.len()
    }

    /// Timestamp of the earliest record.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.records.iter().filter_map(|r| r.timestamp).min()
    }

    /// Timestamp of the latest record.
    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.records.iter().filter_map(|r| r.timestamp).max()
    }
}

/// Filename to bytes mapping that keeps insertion order.
#[derive(Debug, Clone, Default)]
pub struct OutputFiles {
    entries: Vec<(String, Vec<u8>)>,
}

impl OutputFiles {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert a file, replacing an existing one with the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = bytes;
        } else {
            self.entries.push((name, bytes));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.as_slice())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(n, b)| (n.as_str(), b.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Downscaled preview of one restored item.
#[derive(Debug, Clone)]
pub struct Preview {
    pub filename: String,
    /// JPEG thumbnail bytes, never the full-resolution asset.
    pub thumbnail: Vec<u8>,
}

/// Previews of one run.
///
/// While a set is alive, the session that produced it refuses to start
/// another run. Call [`PreviewSet::release`] (or drop the set) to end it.
#[derive(Debug, Default)]
pub struct PreviewSet {
    items: Vec<Preview>,
    lease: Option<Arc<AtomicBool>>,
}

impl PreviewSet {
    /// Create a set tied to a session's lease flag.
    #[must_use]
    pub fn leased(items: Vec<Preview>, lease: Arc<AtomicBool>) -> Self {
        lease.store(true, Ordering::SeqCst);
        Self {
            items,
            lease: Some(lease),
        }
    }

    /// Create a set that is not tied to any session.
    #[must_use]
    pub const fn detached(items: Vec<Preview>) -> Self {
        Self { items, lease: None }
    }

    #[must_use]
    pub fn items(&self) -> &[Preview] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Release the previews, returning them to the caller.
    #[must_use]
    pub fn release(mut self) -> Vec<Preview> {
        self.end_lease();
        std::mem::take(&mut self.items)
    }

    fn end_lease(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for PreviewSet {
    fn drop(&mut self) {
        self.end_lease();
    }
}

/// Why one record was left out of the output.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDiagnostic {
    pub record_id: String,
    pub message: String,
}

/// Progress notification sent to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub message: String,
    /// 0 to 100, never decreasing within a run.
    pub percent: u8,
}

/// Outcome of one run, owned by the caller.
#[derive(Debug, Default)]
pub struct ProcessingResult {
    pub success: bool,
    /// Records that produced output.
    pub processed: usize,
    /// Records found in the metadata.
    pub total: usize,
    pub files: OutputFiles,
    pub previews: PreviewSet,
    pub note: Option<String>,
    pub diagnostics: Vec<ItemDiagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_path() {
        assert_eq!(MediaKind::from_path("memories/a.JPG"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_path("videos/b.mp4"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_path("memories_history.json"), None);
        assert_eq!(MediaKind::from_path(".jpg"), None);
    }

    #[test]
    fn test_conversation_participants_are_distinct() {
        let mut a = ExportRecord::with_id("1");
        a.sender = Some("ana".into());
        let mut b = ExportRecord::with_id("2");
        b.sender = Some("ben".into());
        let mut c = ExportRecord::with_id("3");
        c.sender = Some("ana".into());

        let conv = Conversation::new("1", vec![a, b, c]);
        assert_eq!(conv.participants, vec!["ana", "ben"]);
    }

    #[test]
    fn test_output_files_keep_insertion_order() {
        let mut files = OutputFiles::new();
        files.insert("b.jpg", vec![1]);
        files.insert("a.jpg", vec![2]);
        files.insert("b.jpg", vec![3]);

        assert_eq!(files.names().collect::<Vec<_>>(), vec!["b.jpg", "a.jpg"]);
        assert_eq!(files.get("b.jpg"), Some(&[3u8][..]));
    }

    #[test]
    fn test_preview_lease_released_on_drop() {
        let lease = Arc::new(AtomicBool::new(false));
        let set = PreviewSet::leased(Vec::new(), Arc::clone(&lease));
        assert!(lease.load(Ordering::SeqCst));
        drop(set);
        assert!(!lease.load(Ordering::SeqCst));
    }

    #[test]
    fn test_preview_release_returns_items() {
        let lease = Arc::new(AtomicBool::new(false));
        let set = PreviewSet::leased(
            vec![Preview {
                filename: "x.jpg".into(),
                thumbnail: vec![0xFF],
            }],
            Arc::clone(&lease),
        );
        let items = set.release();
        assert_eq!(items.len(), 1);
        assert!(!lease.load(Ordering::SeqCst));
    }
}
