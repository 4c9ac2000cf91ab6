//! Run orchestration.
//!
//! A [`RestoreSession`] owns the configuration and overlay fetcher of one
//! tool instance. Each call to [`RestoreSession::process`] walks the stage
//! machine through the platform's processor and hands the caller a
//! [`ProcessingResult`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::domain::{
    AppError, ExportRecord, ItemDiagnostic, Platform, PreviewSet, ProcessingResult, ProgressUpdate,
    RestoreConfig, Result,
};
use crate::infrastructure::{looks_like_zip, Container, HttpOverlayFetcher, OverlayFetcher};

use super::normalizer::{normalize_container, normalize_document, Document};
use super::processors::processor_for;

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    Reading,
    Extracting,
    Parsing,
    MatchingAndTransforming,
    Packaging,
    Done,
    Failed,
}

impl Stage {
    /// Progress reported on entering the stage.
    #[must_use]
    pub const fn floor(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Reading => 5,
            Self::Extracting => 10,
            Self::Parsing => 25,
            Self::MatchingAndTransforming => 35,
            Self::Packaging => 92,
            Self::Done => 100,
            // Failure keeps whatever was reached.
            Self::Failed => 0,
        }
    }
}

/// Span of the per-item stage.
const ITEM_START: u8 = 35;
const ITEM_END: u8 = 90;

/// Forwards progress to the caller, never letting the percentage drop.
pub struct ProgressReporter<'a> {
    sink: Box<dyn FnMut(ProgressUpdate) + Send + 'a>,
    stage: Stage,
    percent: u8,
}

impl std::fmt::Debug for ProgressReporter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("stage", &self.stage)
            .field("percent", &self.percent)
            .finish_non_exhaustive()
    }
}

impl<'a> ProgressReporter<'a> {
    #[must_use]
    pub fn new(sink: impl FnMut(ProgressUpdate) + Send + 'a) -> Self {
        Self {
            sink: Box::new(sink),
            stage: Stage::Idle,
            percent: 0,
        }
    }

    /// A reporter that only logs.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(|_| {})
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub const fn percent(&self) -> u8 {
        self.percent
    }

    /// Moves to `stage` and reports its floor percentage.
    pub fn enter(&mut self, stage: Stage, message: impl Into<String>) {
        if stage < self.stage {
            tracing::warn!(from = ?self.stage, to = ?stage, "Ignoring backwards stage transition");
            return;
        }
        self.stage = stage;
        let message = message.into();
        tracing::info!(stage = ?stage, "{message}");
        self.report(message, stage.floor());
    }

    /// Reports per-item progress inside the matching stage.
    pub fn item(&mut self, done: usize, total: usize) {
        let span = usize::from(ITEM_END - ITEM_START);
        let offset = if total == 0 {
            span
        } else {
            span * done.min(total) / total
        };
        let percent = ITEM_START + u8::try_from(offset).unwrap_or(ITEM_END - ITEM_START);
        self.report(format!("Restoring item {done} of {total}"), percent);
    }

    /// Marks the run as failed.
    pub fn fail(&mut self, error: &AppError) {
        self.stage = Stage::Failed;
        tracing::error!(kind = ?error.kind(), "Run failed: {error}");
        self.report(format!("Failed: {error}"), self.percent);
    }

    fn report(&mut self, message: String, percent: u8) {
        let percent = percent.clamp(self.percent, 100);
        self.percent = percent;
        (self.sink)(ProgressUpdate { message, percent });
    }
}

/// What a raw input turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Archive,
    Json,
    Html,
    Video,
    Database,
}

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const BACKUP_EXTENSIONS: &[&str] = &[".crypt12", ".crypt14", ".crypt15", ".db"];

/// A file handed to the pipeline.
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub name: String,
    pub bytes: Bytes,
}

impl SourceInput {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Sniffs the input's format from its leading bytes and name.
    ///
    /// # Errors
    /// Returns a format error for anything unrecognized.
    pub fn kind(&self) -> Result<InputKind> {
        let bytes = &self.bytes[..];
        let lower = self.name.to_ascii_lowercase();

        if looks_like_zip(bytes) {
            return Ok(InputKind::Archive);
        }
        if bytes.starts_with(SQLITE_MAGIC) || BACKUP_EXTENSIONS.iter().any(|e| lower.ends_with(e)) {
            return Ok(InputKind::Database);
        }
        if bytes.get(4..8) == Some(b"ftyp".as_slice()) {
            return Ok(InputKind::Video);
        }

        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(64)]);
        let head = head.trim_start_matches('\u{feff}').trim_start();
        if head.starts_with('<') {
            Ok(InputKind::Html)
        } else if head.starts_with('{') || head.starts_with('[') || head.starts_with("window.") {
            Ok(InputKind::Json)
        } else {
            Err(AppError::format(format!(
                "{} is not an archive or a supported export document",
                self.name
            )))
        }
    }

    /// The input as text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Shared state handed to a processor for one run.
pub struct RunContext<'a> {
    pub config: &'a RestoreConfig,
    pub fetcher: &'a dyn OverlayFetcher,
    pub progress: ProgressReporter<'a>,
}

impl std::fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

/// Result of one item step inside the per-item fold.
#[derive(Debug)]
pub enum ItemOutcome<T> {
    Restored(T),
    /// No media was found; counts toward total only.
    Unmatched { record_id: String },
    Failed(ItemDiagnostic),
}

/// Accumulator of the per-item fold.
#[derive(Debug)]
pub struct Tally<T> {
    pub restored: Vec<T>,
    pub diagnostics: Vec<ItemDiagnostic>,
    pub unmatched: usize,
}

impl<T> Default for Tally<T> {
    fn default() -> Self {
        Self {
            restored: Vec::new(),
            diagnostics: Vec::new(),
            unmatched: 0,
        }
    }
}

impl<T> Tally<T> {
    /// Folds one item outcome in.
    #[must_use]
    pub fn push(mut self, outcome: ItemOutcome<T>) -> Self {
        match outcome {
            ItemOutcome::Restored(item) => self.restored.push(item),
            ItemOutcome::Unmatched { record_id } => {
                self.unmatched += 1;
                self.diagnostics.push(ItemDiagnostic {
                    record_id,
                    message: "no matching media in archive".to_string(),
                });
            }
            ItemOutcome::Failed(diagnostic) => {
                tracing::warn!(record = %diagnostic.record_id, "{}", diagnostic.message);
                self.diagnostics.push(diagnostic);
            }
        }
        self
    }
}

/// Turns a per-item error into a diagnostic.
#[must_use]
pub fn diagnostic(record_id: &str, error: &AppError) -> ItemDiagnostic {
    let message = match error {
        AppError::PerItem { message, .. } => message.clone(),
        other => other.to_string(),
    };
    ItemDiagnostic {
        record_id: record_id.to_string(),
        message,
    }
}

/// Normalizes an input's records without matching or transforming media.
///
/// # Errors
/// Returns the structural error that would stop a full run.
pub fn inspect(
    platform: Platform,
    input: &SourceInput,
    config: &RestoreConfig,
) -> Result<Vec<ExportRecord>> {
    let font = config.image.default_font_size;
    match input.kind()? {
        InputKind::Archive => {
            let container = Container::open(input.bytes.clone())?;
            normalize_container(&container, platform, font)
        }
        InputKind::Json | InputKind::Html => {
            let doc = Document::parse(input.name.clone(), &input.text())?;
            normalize_document(&doc, platform, font)
        }
        other => Err(AppError::format(format!(
            "{other:?} input has no metadata to inspect"
        ))),
    }
}

/// One tool instance. At most one run's previews may be live at a time.
pub struct RestoreSession {
    config: RestoreConfig,
    fetcher: Arc<dyn OverlayFetcher>,
    lease: Arc<AtomicBool>,
}

impl std::fmt::Debug for RestoreSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreSession")
            .field("config", &self.config)
            .field("previews_live", &self.previews_live())
            .finish_non_exhaustive()
    }
}

impl RestoreSession {
    /// Session fetching remote overlays over HTTP.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: RestoreConfig) -> Result<Self> {
        let fetcher = HttpOverlayFetcher::new(config.fetch_timeout(), &config.fetch.user_agent)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    #[must_use]
    pub fn with_fetcher(config: RestoreConfig, fetcher: Arc<dyn OverlayFetcher>) -> Self {
        Self {
            config,
            fetcher,
            lease: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RestoreConfig {
        &self.config
    }

    /// Whether a previous run's previews are still held.
    #[must_use]
    pub fn previews_live(&self) -> bool {
        self.lease.load(Ordering::SeqCst)
    }

    /// Runs `platform`'s processor over `input`.
    ///
    /// # Errors
    /// Returns [`AppError::PreviewsOutstanding`] while an earlier result's
    /// previews are live, and the classified structural error when the run
    /// fails. Per-item failures never surface here.
    pub async fn process<F>(
        &self,
        platform: Platform,
        input: SourceInput,
        on_progress: F,
    ) -> Result<ProcessingResult>
    where
        F: FnMut(ProgressUpdate) + Send,
    {
        if self.previews_live() {
            return Err(AppError::PreviewsOutstanding);
        }

        let mut ctx = RunContext {
            config: &self.config,
            fetcher: self.fetcher.as_ref(),
            progress: ProgressReporter::new(on_progress),
        };

        tracing::info!(platform = %platform, input = %input.name, bytes = input.bytes.len(), "Starting run");
        let processor = processor_for(platform);

        match processor.process(input, &mut ctx).await {
            Ok(mut result) => {
                let previews = std::mem::take(&mut result.previews).release();
                if !previews.is_empty() {
                    result.previews = PreviewSet::leased(previews, Arc::clone(&self.lease));
                }
                ctx.progress.enter(
                    Stage::Done,
                    format!("Restored {} of {} items", result.processed, result.total),
                );
                tracing::info!(
                    processed = result.processed,
                    total = result.total,
                    diagnostics = result.diagnostics.len(),
                    "Run complete"
                );
                Ok(result)
            }
            Err(e) => {
                ctx.progress.fail(&e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_is_monotonic() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut progress = ProgressReporter::new(move |u: ProgressUpdate| {
            sink.lock().unwrap().push(u.percent);
        });

        progress.enter(Stage::Reading, "read");
        progress.enter(Stage::MatchingAndTransforming, "match");
        progress.item(1, 4);
        progress.item(4, 4);
        progress.enter(Stage::Parsing, "backwards");
        progress.enter(Stage::Packaging, "pack");
        progress.fail(&AppError::format("boom"));

        let seen = seen.lock().unwrap().clone();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
        assert_eq!(seen.first(), Some(&5));
        assert_eq!(progress.stage(), Stage::Failed);
    }

    #[test]
    fn test_item_progress_with_no_items() {
        let mut progress = ProgressReporter::silent();
        progress.item(0, 0);
        assert_eq!(progress.percent(), ITEM_END);
    }

    #[test]
    fn test_sniff_inputs() {
        let kind = |name: &str, bytes: &[u8]| SourceInput::new(name, bytes.to_vec()).kind();

        assert_eq!(kind("a.zip", b"PK\x03\x04rest").unwrap(), InputKind::Archive);
        assert_eq!(kind("a.json", b"\xEF\xBB\xBF {\"a\":1}").unwrap(), InputKind::Json);
        assert_eq!(kind("tweets.js", b"window.YTD.tweets.part0 = []").unwrap(), InputKind::Json);
        assert_eq!(kind("m.html", b"<!DOCTYPE html>").unwrap(), InputKind::Html);
        assert_eq!(kind("v.mp4", b"\0\0\0\x18ftypmp42").unwrap(), InputKind::Video);
        assert_eq!(kind("msgstore.db.crypt14", b"\x01\x02").unwrap(), InputKind::Database);
        assert!(matches!(kind("x.bin", b"\x00\x01\x02\x03garbage"), Err(AppError::Format { .. })));
    }

    #[test]
    fn test_tally_fold() {
        let tally = [
            ItemOutcome::Restored("a"),
            ItemOutcome::Unmatched {
                record_id: "b".to_string(),
            },
            ItemOutcome::Failed(ItemDiagnostic {
                record_id: "c".to_string(),
                message: "bad".to_string(),
            }),
        ]
        .into_iter()
        .fold(Tally::default(), Tally::push);

        assert_eq!(tally.restored, vec!["a"]);
        assert_eq!(tally.unmatched, 1);
        assert_eq!(tally.diagnostics.len(), 2);
    }
}
