//! Domain-level error types for social-restore.
//!
//! Fatal errors halt a run and surface one classified message. Per-item
//! errors are recovered inside the pipeline and only ever appear as
//! diagnostics on the result.

use thiserror::Error;

/// Coarse classification used to pick a presentation for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unreadable or unsupported container or file.
    Format,
    /// No recognizable record structure.
    Schema,
    /// A required sub-resource is absent.
    NotFound,
    /// Failure scoped to a single record.
    PerItem,
    /// The platform processor is intentionally stubbed.
    Unimplemented,
    /// Configuration, I/O and everything else.
    Other,
}

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Input is not an archive or a supported direct document.
    #[error("Unsupported or unreadable input: {message}")]
    Format {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No plausible record array was found in the export metadata.
    #[error("No recognizable records: {message} (top-level keys: {})", format_keys(.keys))]
    Schema { message: String, keys: Vec<String> },

    /// A named entry is missing from the archive.
    #[error("Entry not found: {name}")]
    NotFound { name: String },

    /// Matching, compositing or rewriting failed for one record.
    #[error("Item {item} failed: {message}")]
    PerItem { item: String, message: String },

    /// The platform has no working processor yet.
    #[error("{platform} restoration is not yet available")]
    Unimplemented { platform: String },

    /// A previous run's previews have not been released.
    #[error("Previews from the previous run are still live; release them first")]
    PreviewsOutstanding,

    /// Remote overlay fetch failed.
    #[error("Fetch error: {message}")]
    Fetch {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Image decode or encode failed.
    #[error("Image error: {message}")]
    Image {
        message: String,
        #[source]
        source: Option<image::ImageError>,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create a format error from a zip error.
    pub fn zip(err: zip::result::ZipError) -> Self {
        Self::Format {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a format error without an underlying cause.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
            source: None,
        }
    }

    /// Create a schema error listing the keys that were seen.
    pub fn schema(message: impl Into<String>, keys: Vec<String>) -> Self {
        Self::Schema {
            message: message.into(),
            keys,
        }
    }

    /// Create a per-item error.
    pub fn per_item(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PerItem {
            item: item.into(),
            message: message.into(),
        }
    }

    /// Create an image error.
    pub fn image(message: impl Into<String>, err: image::ImageError) -> Self {
        Self::Image {
            message: format!("{}: {err}", message.into()),
            source: Some(err),
        }
    }

    /// Create a fetch error from a reqwest error.
    pub fn fetch(url: &str, err: reqwest::Error) -> Self {
        Self::Fetch {
            message: format!("{url}: {err}"),
            source: Some(Box::new(err)),
        }
    }

    /// Create a format error for a metadata document that is not valid JSON.
    pub fn malformed_json(name: &str, err: serde_json::Error) -> Self {
        Self::Format {
            message: format!("{name} is not valid JSON: {err}"),
            source: Some(Box::new(err)),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Classify this error for presentation.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } => ErrorKind::Format,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PerItem { .. } => ErrorKind::PerItem,
            Self::Unimplemented { .. } => ErrorKind::Unimplemented,
            _ => ErrorKind::Other,
        }
    }
}

fn format_keys(keys: &[String]) -> String {
    if keys.is_empty() {
        return "none".to_string();
    }
    keys.iter()
        .map(|k| format!("\"{k}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_lists_keys() {
        let err = AppError::schema("no record array", vec!["Other".into(), "meta".into()]);
        let text = err.to_string();
        assert!(text.contains("\"Other\""));
        assert!(text.contains("\"meta\""));
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn test_unimplemented_is_distinct() {
        let err = AppError::Unimplemented {
            platform: "WhatsApp".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
        assert!(err.to_string().contains("not yet available"));
    }
}
