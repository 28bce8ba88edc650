//! Command handlers for the CycleCare CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod clinics;
pub mod health;
pub mod ingest;
pub mod stats;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use clinics::ClinicsCommand;
pub use health::HealthCommand;
pub use ingest::IngestCommand;
pub use stats::StatsCommand;

use cyclecare_core::config::AppConfig;
use cyclecare_knowledge::CareService;
use serde::Serialize;

/// Build the service and open the existing index, if any.
pub(crate) async fn open_service(config: &AppConfig) -> anyhow::Result<CareService> {
    Ok(CareService::from_config(config).await?)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
