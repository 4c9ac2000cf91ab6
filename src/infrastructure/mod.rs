//! Infrastructure layer - binary formats and external adapters.
//!
//! This layer handles archives, image codecs, embedded metadata,
//! network fetches and the config file.

pub mod compositor;
pub mod config;
pub mod container;
pub mod exif;
pub mod overlay_fetch;
pub mod thumbnail;

pub use compositor::{Composited, Compositor};
pub use config::{ensure_config_exists, load_config, save_config};
pub use container::{build as build_archive, looks_like_zip, Container};
pub use exif::{read_capture_date, read_orientation, restore_capture_date};
pub use overlay_fetch::{HttpOverlayFetcher, OfflineFetcher, OverlayFetcher, OverlayResolver};
pub use thumbnail::{generate_thumbnail, ThumbnailConfig};
