//! Social Restore - restore social media data exports.
//!
//! Export archives lose information on the way out: media is separated from
//! its metadata, captions and stickers are stripped, capture dates are
//! replaced and messages are flattened. This crate reunites and repairs
//! them, one platform processor per supported export format.

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

pub use application::{RestoreSession, SourceInput};
pub use domain::{AppError, ErrorKind, Platform, ProcessingResult, ProgressUpdate, Result};
