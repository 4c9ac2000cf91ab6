//! Media matching.
//!
//! Resolves an export record to an archive entry by trying, in order: the
//! id or explicit media path as written, the id with separators normalized,
//! and finally any unclaimed media file in one of the platform's
//! conventional folders.

use std::collections::HashSet;
use std::path::Path;

use crate::domain::{ExportRecord, MediaAsset, MediaKind, Platform, Result};
use crate::infrastructure::Container;

/// Ids shorter than this only match a file stem exactly.
const MIN_SUBSTRING_ID: usize = 3;

/// Stem suffix of Snapchat's companion overlay files.
const OVERLAY_SUFFIX: &str = "-overlay";
const MAIN_SUFFIX: &str = "-main";

/// Which strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Id or media path found in an entry name as written.
    Reference,
    /// Id matched after normalizing separators and case.
    NormalizedId,
    /// Unclaimed media file in a conventional folder.
    Folder,
}

/// A resolved entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMatch {
    pub entry: String,
    pub kind: MediaKind,
    pub strategy: MatchStrategy,
}

impl MediaMatch {
    /// Reads the matched entry.
    ///
    /// # Errors
    /// Returns error if the entry cannot be read.
    pub fn load(&self, container: &Container) -> Result<MediaAsset> {
        Ok(MediaAsset {
            bytes: container.read(&self.entry)?,
            path: self.entry.clone(),
            kind: self.kind,
        })
    }
}

#[derive(Debug)]
struct Candidate<'a> {
    index: usize,
    name: &'a str,
    stem: &'a str,
    kind: MediaKind,
}

/// Matches records against one archive's entries.
///
/// An entry is handed out at most once, except when a record names it
/// explicitly.
#[derive(Debug)]
pub struct MediaMatcher<'a> {
    platform: Platform,
    candidates: Vec<Candidate<'a>>,
    names: &'a [String],
    claimed: HashSet<usize>,
}

fn stem_of(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Lowercase with every non-alphanumeric character removed, which makes
/// hyphen and underscore spellings interchangeable.
#[must_use]
pub fn normalize_id(id: &str) -> String {
    id.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn in_folder(name: &str, folder: &str) -> bool {
    let name = name.to_ascii_lowercase();
    let folder = folder.to_ascii_lowercase();
    name.starts_with(&format!("{folder}/")) || name.contains(&format!("/{folder}/"))
}

impl<'a> MediaMatcher<'a> {
    #[must_use]
    pub fn new(platform: Platform, names: &'a [String]) -> Self {
        let candidates = names
            .iter()
            .enumerate()
            .filter_map(|(index, name)| {
                let kind = MediaKind::from_path(name)?;
                let stem = stem_of(name);
                (!stem.ends_with(OVERLAY_SUFFIX)).then_some(Candidate {
                    index,
                    name,
                    stem,
                    kind,
                })
            })
            .collect();

        Self {
            platform,
            candidates,
            names,
            claimed: HashSet::new(),
        }
    }

    /// Number of media entries available for matching.
    #[must_use]
    pub fn media_count(&self) -> usize {
        self.candidates.len()
    }

    /// Finds and claims the entry for `record`.
    pub fn find(&mut self, record: &ExportRecord) -> Option<MediaMatch> {
        let found = self
            .by_reference(record)
            .map(|c| (c, MatchStrategy::Reference))
            .or_else(|| self.by_normalized_id(record).map(|c| (c, MatchStrategy::NormalizedId)))
            .or_else(|| self.by_folder(record).map(|c| (c, MatchStrategy::Folder)));

        let (position, strategy) = found?;
        let candidate = &self.candidates[position];
        self.claimed.insert(candidate.index);

        tracing::debug!(
            record = %record.id,
            entry = candidate.name,
            ?strategy,
            "Media matched"
        );

        Some(MediaMatch {
            entry: candidate.name.to_string(),
            kind: candidate.kind,
            strategy,
        })
    }

    fn unclaimed(&self) -> impl Iterator<Item = (usize, &Candidate<'a>)> {
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !self.claimed.contains(&c.index))
    }

    fn by_reference(&self, record: &ExportRecord) -> Option<usize> {
        if let Some(path) = record.media_path.as_deref() {
            let path = path.trim_start_matches("./").trim_start_matches('/');
            let hit = self.candidates.iter().position(|c| {
                c.name == path || c.name.ends_with(&format!("/{path}")) || stem_of(path) == c.stem
            });
            if hit.is_some() {
                return hit;
            }
        }

        let id = record.id.trim();
        if id.is_empty() {
            return None;
        }
        self.unclaimed()
            .find(|(_, c)| c.stem == id)
            .or_else(|| {
                (id.len() >= MIN_SUBSTRING_ID)
                    .then(|| self.unclaimed().find(|(_, c)| c.name.contains(id)))
                    .flatten()
            })
            .map(|(pos, _)| pos)
    }

    fn by_normalized_id(&self, record: &ExportRecord) -> Option<usize> {
        let id = normalize_id(&record.id);
        if id.is_empty() {
            return None;
        }
        self.unclaimed()
            .find(|(_, c)| normalize_id(c.stem) == id)
            .or_else(|| {
                (id.len() >= MIN_SUBSTRING_ID)
                    .then(|| self.unclaimed().find(|(_, c)| normalize_id(c.stem).contains(&id)))
                    .flatten()
            })
            .map(|(pos, _)| pos)
    }

    fn by_folder(&self, record: &ExportRecord) -> Option<usize> {
        let folders = self.platform.media_folders();
        self.unclaimed()
            .find(|(_, c)| {
                record.media_kind.is_none_or(|k| k == c.kind)
                    && folders.iter().any(|f| in_folder(c.name, f))
            })
            .map(|(pos, _)| pos)
    }

    /// Snapchat companion overlay for a `-main` entry, if present.
    #[must_use]
    pub fn overlay_sibling(&self, entry: &str) -> Option<&'a str> {
        let stem = stem_of(entry);
        let base = stem.strip_suffix(MAIN_SUFFIX)?;
        let dir = Path::new(entry).parent();
        let wanted = format!("{base}{OVERLAY_SUFFIX}");

        self.names
            .iter()
            .find(|name| stem_of(name) == wanted && Path::new(name.as_str()).parent() == dir)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_exact_id_match() {
        let entries = names(&["memories/abc123.jpg", "memories/zzz.jpg"]);
        let mut matcher = MediaMatcher::new(Platform::Snapchat, &entries);

        let found = matcher.find(&ExportRecord::with_id("abc123")).unwrap();
        assert_eq!(found.entry, "memories/abc123.jpg");
        assert_eq!(found.strategy, MatchStrategy::Reference);
        assert_eq!(found.kind, MediaKind::Image);
    }

    #[test]
    fn test_media_path_match() {
        let entries = names(&["media/stories/202001/17890.jpg"]);
        let mut matcher = MediaMatcher::new(Platform::Instagram, &entries);

        let mut record = ExportRecord::with_id("ignored");
        record.media_path = Some("media/stories/202001/17890.jpg".to_string());
        let found = matcher.find(&record).unwrap();
        assert_eq!(found.strategy, MatchStrategy::Reference);
    }

    #[test]
    fn test_normalized_separators() {
        let entries = names(&["chat_media/ab_cd_12.mp4"]);
        let mut matcher = MediaMatcher::new(Platform::Snapchat, &entries);

        let found = matcher.find(&ExportRecord::with_id("AB-CD-12")).unwrap();
        assert_eq!(found.strategy, MatchStrategy::NormalizedId);
        assert_eq!(found.kind, MediaKind::Video);
    }

    #[test]
    fn test_folder_fallback_claims_once() {
        let entries = names(&["memories/one.jpg", "notes/readme.txt"]);
        let mut matcher = MediaMatcher::new(Platform::Snapchat, &entries);

        let first = matcher.find(&ExportRecord::with_id("unknown-1")).unwrap();
        assert_eq!(first.strategy, MatchStrategy::Folder);
        assert!(matcher.find(&ExportRecord::with_id("unknown-2")).is_none());
    }

    #[test]
    fn test_no_match_outside_folders() {
        let entries = names(&["random/photo.jpg"]);
        let mut matcher = MediaMatcher::new(Platform::Snapchat, &entries);
        assert!(matcher.find(&ExportRecord::with_id("nomatch")).is_none());
    }

    #[test]
    fn test_overlay_files_are_companions() {
        let entries = names(&[
            "memories/2020-01-01_abc-main.jpg",
            "memories/2020-01-01_abc-overlay.png",
        ]);
        let mut matcher = MediaMatcher::new(Platform::Snapchat, &entries);
        assert_eq!(matcher.media_count(), 1);

        let found = matcher.find(&ExportRecord::with_id("abc")).unwrap();
        assert_eq!(found.entry, "memories/2020-01-01_abc-main.jpg");
        assert_eq!(
            matcher.overlay_sibling(&found.entry),
            Some("memories/2020-01-01_abc-overlay.png")
        );
    }
}
