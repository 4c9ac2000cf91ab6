//! Platform processors.
//!
//! Every platform has exactly one processor, chosen by a `match` on
//! [`Platform`] at compile time.

pub mod document;
pub mod facebook;
pub mod instagram;
pub mod media;
pub mod snapchat;
pub mod tiktok;
pub mod twitter;
pub mod whatsapp;

use async_trait::async_trait;

use crate::application::pipeline::{RunContext, SourceInput};
use crate::domain::{Platform, ProcessingResult, Result};

pub use facebook::FacebookProcessor;
pub use instagram::InstagramProcessor;
pub use snapchat::SnapchatProcessor;
pub use tiktok::TikTokProcessor;
pub use twitter::TwitterProcessor;
pub use whatsapp::WhatsAppProcessor;

/// Restores one platform's exports.
#[async_trait]
pub trait Processor: Send + Sync {
    fn platform(&self) -> Platform;

    /// Runs the pipeline over `input`, reporting through `ctx`.
    async fn process(&self, input: SourceInput, ctx: &mut RunContext<'_>) -> Result<ProcessingResult>;
}

/// The processor for `platform`.
#[must_use]
pub fn processor_for(platform: Platform) -> &'static dyn Processor {
    match platform {
        Platform::Snapchat => &SnapchatProcessor,
        Platform::Instagram => &InstagramProcessor,
        Platform::TikTok => &TikTokProcessor,
        Platform::Facebook => &FacebookProcessor,
        Platform::Twitter => &TwitterProcessor,
        Platform::WhatsApp => &WhatsAppProcessor,
    }
}
