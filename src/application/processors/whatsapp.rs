//! WhatsApp backups.
//!
//! Backups are encrypted databases and no decryption scheme is supported,
//! so every run ends as unimplemented once the input has been identified.

use async_trait::async_trait;

use super::Processor;
use crate::application::pipeline::{RunContext, SourceInput, Stage};
use crate::domain::{AppError, Platform, ProcessingResult, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct WhatsAppProcessor;

#[async_trait]
impl Processor for WhatsAppProcessor {
    fn platform(&self) -> Platform {
        Platform::WhatsApp
    }

    async fn process(&self, input: SourceInput, ctx: &mut RunContext<'_>) -> Result<ProcessingResult> {
        ctx.progress.enter(Stage::Reading, "Reading WhatsApp backup...");
        let kind = input.kind()?;
        tracing::debug!(?kind, "WhatsApp input identified");
        Err(AppError::Unimplemented {
            platform: Platform::WhatsApp.display_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::ProgressReporter;
    use crate::domain::{ErrorKind, RestoreConfig};
    use crate::infrastructure::OfflineFetcher;

    #[tokio::test]
    async fn test_backup_is_unimplemented() {
        let config = RestoreConfig::default();
        let mut ctx = RunContext {
            config: &config,
            fetcher: &OfflineFetcher,
            progress: ProgressReporter::silent(),
        };
        let input = SourceInput::new("msgstore.db.crypt14", b"\x00\x01".to_vec());

        let err = WhatsAppProcessor.process(input, &mut ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unimplemented);
    }
}
