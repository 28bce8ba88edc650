//! Health command handler.

use super::{open_service, print_json};
use clap::Args;
use cyclecare_core::config::AppConfig;

/// Report index readiness and generator reachability
#[derive(Args, Debug)]
pub struct HealthCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl HealthCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let service = open_service(config).await?;
        let health = service.health().await;

        if self.json {
            print_json(&health)?;
        } else {
            println!("Index ready:         {}", yes_no(health.index_ready));
            println!("Generator reachable: {}", yes_no(health.generator_reachable));
        }

        if !health.index_ready || !health.generator_reachable {
            anyhow::bail!("service is not healthy");
        }
        Ok(())
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
