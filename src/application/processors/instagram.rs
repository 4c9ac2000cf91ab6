//! Instagram stories and posts.

use async_trait::async_trait;

use super::media::{self, MediaOptions};
use super::Processor;
use crate::application::pipeline::{RunContext, SourceInput};
use crate::domain::{Platform, ProcessingResult, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct InstagramProcessor;

#[async_trait]
impl Processor for InstagramProcessor {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn process(&self, input: SourceInput, ctx: &mut RunContext<'_>) -> Result<ProcessingResult> {
        let options = MediaOptions {
            bake_companion_overlays: false,
        };
        media::restore(Platform::Instagram, options, input, ctx).await
    }
}
