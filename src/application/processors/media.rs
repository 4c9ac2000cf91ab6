//! Restoration run shared by media-archive platforms.

use crate::application::matcher::{MediaMatch, MediaMatcher};
use crate::application::normalizer::{normalize_container, normalize_document, Document};
use crate::application::packager::{
    package_items, render_sidecar, FilenameAllocator, PreviewCollector, SidecarEntry, SIDECAR_NAME,
};
use crate::application::parser::full_frame_overlay;
use crate::application::pipeline::{
    diagnostic, InputKind, ItemOutcome, RunContext, SourceInput, Stage, Tally,
};
use crate::domain::{
    extension, AppError, ExportRecord, MediaAsset, MediaKind, OutputFiles, Platform, PreviewSet,
    ProcessingResult, RestoredItem, Result,
};
use crate::infrastructure::{
    restore_capture_date, Compositor, Container, OverlayResolver, ThumbnailConfig,
};

/// Platform-specific switches for a media run.
#[derive(Debug, Clone, Copy)]
pub struct MediaOptions {
    /// Composite `-overlay` companions onto their `-main` files.
    pub bake_companion_overlays: bool,
}

/// Per-run transformation state.
struct Restorer<'r> {
    platform: Platform,
    options: MediaOptions,
    container: Option<&'r Container>,
    compositor: Compositor,
    resolver: OverlayResolver<'r>,
    names: FilenameAllocator,
    previews: PreviewCollector,
}

/// A restored item plus its sidecar description.
type Restored = (RestoredItem, SidecarEntry);

impl Restorer<'_> {
    async fn restore(&mut self, matcher: &mut MediaMatcher<'_>, record: &ExportRecord) -> ItemOutcome<Restored> {
        let Some(found) = matcher.find(record) else {
            tracing::debug!(record = %record.id, "No media for record");
            return ItemOutcome::Unmatched {
                record_id: record.id.clone(),
            };
        };

        let companion = if self.options.bake_companion_overlays {
            matcher.overlay_sibling(&found.entry)
        } else {
            None
        };

        match self.transform(record, &found, companion).await {
            Ok(item) => ItemOutcome::Restored(item),
            Err(e) => ItemOutcome::Failed(diagnostic(&record.id, &e)),
        }
    }

    async fn transform(
        &mut self,
        record: &ExportRecord,
        found: &MediaMatch,
        companion: Option<&str>,
    ) -> Result<Restored> {
        let container = self.container.ok_or_else(|| AppError::NotFound {
            name: found.entry.clone(),
        })?;
        let MediaAsset { bytes, path, kind } = found
            .load(container)
            .map_err(|e| AppError::per_item(&record.id, e.to_string()))?;
        let original_ext = extension(&path).unwrap_or_else(|| "bin".to_string());

        let (bytes, ext) = match kind {
            MediaKind::Video => (bytes, original_ext),
            MediaKind::Image => {
                let mut directives = Vec::with_capacity(record.overlays.len() + 1);
                directives.extend(companion.map(full_frame_overlay));
                directives.extend(record.overlays.iter().cloned());

                let (bytes, ext) = if directives.is_empty() {
                    (bytes, original_ext)
                } else {
                    let composited = self
                        .compositor
                        .composite(&bytes, &directives, &self.resolver)
                        .await
                        .map_err(|e| AppError::per_item(&record.id, e.to_string()))?;
                    if !composited.skipped.is_empty() {
                        tracing::info!(
                            record = %record.id,
                            skipped = composited.skipped.len(),
                            "Some overlays were skipped"
                        );
                    }
                    (composited.bytes, composited.extension.to_string())
                };

                match record.timestamp {
                    Some(ts) => (restore_capture_date(&bytes, ts), ext),
                    None => (bytes, ext),
                }
            }
        };

        let filename = self.names.allocate(record, &ext);
        let thumbnail = self.previews.offer(&filename, &bytes, kind);
        tracing::debug!(record = %record.id, filename = %filename, platform = %self.platform, "Item restored");

        let item = RestoredItem {
            filename,
            bytes,
            kind,
            thumbnail,
        };
        let sidecar = SidecarEntry::new(&item, record, &path);
        Ok((item, sidecar))
    }
}

/// Reads records from an archive or a direct metadata document.
fn read_records(
    platform: Platform,
    container: Option<&Container>,
    input: &SourceInput,
    kind: InputKind,
    ctx: &RunContext<'_>,
) -> Result<Vec<ExportRecord>> {
    let font = ctx.config.image.default_font_size;
    match container {
        Some(container) => normalize_container(container, platform, font),
        None => {
            let doc = match kind {
                InputKind::Json | InputKind::Html => Document::parse(input.name.clone(), &input.text())?,
                _ => {
                    return Err(AppError::format(format!(
                        "{} cannot read {kind:?} input",
                        platform.display_name()
                    )))
                }
            };
            normalize_document(&doc, platform, font)
        }
    }
}

/// Runs the media restoration pipeline.
///
/// # Errors
/// Returns the structural error that stopped the run. Item failures are
/// reported as diagnostics on the result.
pub async fn restore(
    platform: Platform,
    options: MediaOptions,
    input: SourceInput,
    ctx: &mut RunContext<'_>,
) -> Result<ProcessingResult> {
    ctx.progress
        .enter(Stage::Reading, format!("Reading {} export...", platform.display_name()));
    let kind = input.kind()?;

    let container = if kind == InputKind::Archive {
        ctx.progress.enter(Stage::Extracting, "Opening archive...");
        tokio::task::yield_now().await;
        Some(Container::open(input.bytes.clone())?)
    } else {
        None
    };

    ctx.progress.enter(Stage::Parsing, "Parsing metadata...");
    let records = read_records(platform, container.as_ref(), &input, kind, ctx)?;
    if records.is_empty() {
        return Err(AppError::schema("metadata contains no records", Vec::new()));
    }
    let total = records.len();
    tracing::info!(platform = %platform, total, "Records parsed");

    ctx.progress
        .enter(Stage::MatchingAndTransforming, format!("Restoring {total} items..."));
    let no_entries: Vec<String> = Vec::new();
    let entries = container.as_ref().map_or(no_entries.as_slice(), Container::list);
    let mut matcher = MediaMatcher::new(platform, entries);
    tracing::info!(platform = %platform, media = matcher.media_count(), "Media entries indexed");

    let config = ctx.config;
    let mut restorer = Restorer {
        platform,
        options,
        container: container.as_ref(),
        compositor: Compositor::new(config.image.jpeg_quality),
        resolver: OverlayResolver::new(container.as_ref(), ctx.fetcher),
        names: FilenameAllocator::new(platform, config.output.max_id_len),
        previews: PreviewCollector::new(
            config.output.preview_limit,
            ThumbnailConfig {
                max_width: config.image.thumbnail_max_width,
                max_height: config.image.thumbnail_max_height,
                quality: config.image.thumbnail_quality,
            },
        ),
    };

    let mut tally = Tally::default();
    for (i, record) in records.iter().enumerate() {
        let outcome = restorer.restore(&mut matcher, record).await;
        tally = tally.push(outcome);
        ctx.progress.item(i + 1, total);
        tokio::task::yield_now().await;
    }

    ctx.progress.enter(Stage::Packaging, "Packaging restored files...");
    let (mut files, sidecar, previews) = package_items(tally.restored);
    let processed = sidecar.len();
    if processed > 0 {
        files.insert(SIDECAR_NAME, render_sidecar(platform, &sidecar)?);
    }

    let note = (tally.unmatched > 0).then(|| {
        format!(
            "{} of {total} records had no matching media in the archive",
            tally.unmatched
        )
    });

    Ok(ProcessingResult {
        success: true,
        processed,
        total,
        files,
        previews: PreviewSet::detached(previews),
        note,
        diagnostics: tally.diagnostics,
    })
}

/// Packages a bare video file as a single restored item.
///
/// # Errors
/// Returns a format error if the input is not a recognizable video.
pub fn restore_direct_video(
    platform: Platform,
    input: &SourceInput,
    ctx: &mut RunContext<'_>,
) -> Result<ProcessingResult> {
    ctx.progress.enter(Stage::Parsing, "Reading video file...");
    let ext = extension(&input.name)
        .filter(|e| MediaKind::from_path(&format!("x.{e}")) == Some(MediaKind::Video))
        .unwrap_or_else(|| "mp4".to_string());

    let stem = std::path::Path::new(&input.name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");
    let record = ExportRecord::with_id(stem);

    ctx.progress.enter(Stage::MatchingAndTransforming, "Restoring video...");
    ctx.progress.item(1, 1);

    ctx.progress.enter(Stage::Packaging, "Packaging restored files...");
    let mut names = FilenameAllocator::new(platform, ctx.config.output.max_id_len);
    let item = RestoredItem {
        filename: names.allocate(&record, &ext),
        bytes: input.bytes.to_vec(),
        kind: MediaKind::Video,
        thumbnail: None,
    };
    let sidecar = [SidecarEntry::new(&item, &record, &input.name)];

    let mut files = OutputFiles::new();
    files.insert(item.filename, item.bytes);
    files.insert(SIDECAR_NAME, render_sidecar(platform, &sidecar)?);

    Ok(ProcessingResult {
        success: true,
        processed: 1,
        total: 1,
        files,
        ..Default::default()
    })
}
