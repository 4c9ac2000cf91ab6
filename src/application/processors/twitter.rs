//! Twitter/X archives, threaded by reply.

use async_trait::async_trait;

use super::document::{self, Grouping};
use super::Processor;
use crate::application::pipeline::{RunContext, SourceInput};
use crate::domain::{Platform, ProcessingResult, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct TwitterProcessor;

#[async_trait]
impl Processor for TwitterProcessor {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn process(&self, input: SourceInput, ctx: &mut RunContext<'_>) -> Result<ProcessingResult> {
        document::restore(Platform::Twitter, Grouping::ReplyChain, input, ctx).await
    }
}
