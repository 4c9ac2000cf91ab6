//! Snapchat Memories.
//!
//! Exports pair `memories_history.json` with media files. Newer exports
//! split captioned snaps into `<id>-main` and `<id>-overlay` files, which
//! are composited back together.

use async_trait::async_trait;

use super::media::{self, MediaOptions};
use super::Processor;
use crate::application::pipeline::{RunContext, SourceInput};
use crate::domain::{Platform, ProcessingResult, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct SnapchatProcessor;

#[async_trait]
impl Processor for SnapchatProcessor {
    fn platform(&self) -> Platform {
        Platform::Snapchat
    }

    async fn process(&self, input: SourceInput, ctx: &mut RunContext<'_>) -> Result<ProcessingResult> {
        let options = MediaOptions {
            bake_companion_overlays: true,
        };
        media::restore(Platform::Snapchat, options, input, ctx).await
    }
}
