//! TikTok videos.
//!
//! Accepts the full data archive or a single downloaded video.

use async_trait::async_trait;

use super::media::{self, MediaOptions};
use super::Processor;
use crate::application::pipeline::{InputKind, RunContext, SourceInput, Stage};
use crate::domain::{Platform, ProcessingResult, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct TikTokProcessor;

#[async_trait]
impl Processor for TikTokProcessor {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn process(&self, input: SourceInput, ctx: &mut RunContext<'_>) -> Result<ProcessingResult> {
        if input.kind()? == InputKind::Video {
            ctx.progress.enter(Stage::Reading, "Reading TikTok video...");
            return media::restore_direct_video(Platform::TikTok, &input, ctx);
        }

        let options = MediaOptions {
            bake_companion_overlays: false,
        };
        media::restore(Platform::TikTok, options, input, ctx).await
    }
}
