//! Application layer - use cases and orchestration.
//!
//! This layer turns raw exports into canonical records, matches and
//! transforms media, rebuilds conversations and packages the output.

pub mod conversations;
pub mod formatter;
pub mod markup;
pub mod matcher;
pub mod normalizer;
pub mod packager;
pub mod parser;
pub mod pipeline;
pub mod processors;

pub use conversations::{group_by_reply, segment_by_gap};
pub use formatter::{
    format_diagnostics_table, format_platforms_table, format_records_json, format_records_table,
    format_summary, OutputFormat,
};
pub use matcher::{MatchStrategy, MediaMatch, MediaMatcher};
pub use normalizer::{normalize_container, normalize_document, Document};
pub use packager::{deliverable, Deliverable, FilenameAllocator};
pub use pipeline::{inspect, InputKind, ProgressReporter, RestoreSession, SourceInput, Stage};
pub use processors::{processor_for, Processor};
