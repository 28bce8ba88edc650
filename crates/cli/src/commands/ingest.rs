//! Ingest command handler.
//!
//! Loads documents from a path (or the configured documents directory),
//! indexes them and leaves the pipeline ready for questions.

use super::{open_service, print_json};
use clap::Args;
use cyclecare_core::config::AppConfig;
use std::path::PathBuf;

/// Load, chunk and index documents
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// File or directory to ingest (default: rag.documentsDir)
    pub path: Option<PathBuf>,

    /// Rebuild the index from this source only
    #[arg(long)]
    pub overwrite: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!(path = ?self.path, overwrite = self.overwrite, "Executing ingest command");

        let service = open_service(config).await?;
        let report = service.ingest(self.path.as_deref(), self.overwrite).await?;

        if self.json {
            print_json(&report)?;
        } else {
            println!(
                "Indexed {} documents ({} chunks); {} already indexed, {} files skipped",
                report.documents_indexed,
                report.chunks_indexed,
                report.documents_skipped,
                report.files_skipped
            );
        }

        Ok(())
    }
}
