//! Zip container access.
//!
//! Uniform list/read/build over an in-memory archive. The archive keeps a
//! shared byte buffer, so reads clone a cheap handle instead of the data.

use std::io::{Cursor, Read, Write};

use bytes::Bytes;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::domain::{AppError, OutputFiles, Result};

/// Local file header signature.
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";
/// End-of-central-directory signature of an empty archive.
const ZIP_EMPTY_MAGIC: [u8; 4] = *b"PK\x05\x06";

/// Read-only view over a zip archive.
#[derive(Clone)]
pub struct Container {
    archive: ZipArchive<Cursor<Bytes>>,
    names: Vec<String>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("entries", &self.names.len())
            .finish()
    }
}

/// Whether bytes start like a zip archive.
#[must_use]
pub fn looks_like_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZIP_MAGIC) || bytes.starts_with(&ZIP_EMPTY_MAGIC)
}

impl Container {
    /// Opens an archive from raw bytes.
    ///
    /// # Errors
    /// Returns a format error if the bytes are not a readable zip archive.
    pub fn open(bytes: impl Into<Bytes>) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes.into())).map_err(AppError::zip)?;

        let names = (0..archive.len())
            .filter_map(|i| archive.name_for_index(i))
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect::<Vec<_>>();

        tracing::debug!(entries = names.len(), "Opened archive");

        Ok(Self { archive, names })
    }

    /// File entry names in archive order (directories excluded).
    #[must_use]
    pub fn list(&self) -> &[String] {
        &self.names
    }

    /// Reads one entry fully.
    ///
    /// # Errors
    /// Returns `NotFound` if the entry is absent, or a format error if it
    /// cannot be decompressed.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let mut archive = self.archive.clone();
        let mut file = match archive.by_name(name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(AppError::NotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(AppError::zip(e)),
        };

        let capacity = usize::try_from(file.size()).unwrap_or(0);
        let mut buf = Vec::with_capacity(capacity);
        file.read_to_end(&mut buf)
            .map_err(|e| AppError::io(format!("Failed to read entry {name}"), e))?;

        Ok(buf)
    }

    /// Reads an entry as UTF-8 text, replacing invalid sequences.
    ///
    /// # Errors
    /// Same as [`Container::read`].
    pub fn read_text(&self, name: &str) -> Result<String> {
        let bytes = self.read(name)?;
        Ok(String::from_utf8_lossy(strip_bom(&bytes)).into_owned())
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Builds a new archive; entry order follows the mapping's insertion order.
///
/// # Errors
/// Returns error if the archive cannot be written.
pub fn build(files: &OutputFiles) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, bytes) in files.iter() {
        writer.start_file(name, options).map_err(AppError::zip)?;
        writer
            .write_all(bytes)
            .map_err(|e| AppError::io(format!("Failed to write entry {name}"), e))?;
    }

    let cursor = writer.finish().map_err(AppError::zip)?;

    tracing::debug!(entries = files.len(), "Built archive");

    Ok(cursor.into_inner())
}
