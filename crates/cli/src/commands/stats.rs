//! Stats command handler.
//!
//! Shows what the persisted index holds.

use super::{open_service, print_json};
use clap::Args;
use cyclecare_core::config::AppConfig;

/// Show index statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing stats command");

        let service = open_service(config).await?;
        let stats = service.stats().await?;

        if self.json {
            print_json(&stats)?;
        } else {
            println!("Index: {}", service.pipeline().index_dir().display());
            println!("  Documents: {}", stats.documents);
            println!("  Chunks: {}", stats.chunks);
            println!("  Scheme: {}", stats.scheme);
            println!("  Dimensions: {}", stats.dimensions);
            println!("  Created: {}", stats.created_at.to_rfc3339());
        }

        Ok(())
    }
}
