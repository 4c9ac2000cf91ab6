//! Domain layer - core types and error taxonomy.
//!
//! This layer contains pure domain models and error types
//! without any I/O.

pub mod config;
pub mod error;
pub mod models;
pub mod platform;

pub use config::{FetchConfig, ImageConfig, OutputConfig, RestoreConfig};
pub use error::{AppError, ErrorKind, Result};
pub use models::{
    extension, Conversation, ExportRecord, GeoLocation, ImageOverlay, ItemDiagnostic, MediaAsset, MediaKind,
    OutputFiles, OverlayDirective, OverlaySource, Position, Preview, PreviewSet,
    ProcessingResult, ProgressUpdate, RestoredItem, TextOverlay,
};
pub use platform::{OutputMode, Platform};
