//! Facebook Messenger threads, from JSON or HTML exports.

use async_trait::async_trait;

use super::document::{self, Grouping};
use super::Processor;
use crate::application::pipeline::{RunContext, SourceInput};
use crate::domain::{Platform, ProcessingResult, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct FacebookProcessor;

#[async_trait]
impl Processor for FacebookProcessor {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn process(&self, input: SourceInput, ctx: &mut RunContext<'_>) -> Result<ProcessingResult> {
        document::restore(Platform::Facebook, Grouping::TimeGap, input, ctx).await
    }
}
