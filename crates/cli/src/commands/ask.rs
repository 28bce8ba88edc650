//! Ask command handler.

use super::{open_service, print_json};
use clap::Args;
use cyclecare_core::config::AppConfig;

/// Ask a question about the indexed documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Number of passages to retrieve (default: rag.topK)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing ask command");

        let service = open_service(config).await?;
        let answer = match self.top_k {
            Some(k) => service.query_with_k(&self.question, k).await?,
            None => service.query(&self.question).await?,
        };

        tracing::debug!(
            max_score = answer.max_score,
            grounded = answer.grounded,
            sources = answer.sources.len(),
            "Answer ready"
        );

        if self.json {
            return print_json(&answer);
        }

        println!("Answer:");
        println!("{}", answer.text);
        println!();

        if answer.sources.is_empty() {
            println!("Sources: (no sources available)");
        } else {
            println!("Sources:");
            for source in &answer.sources {
                if source.location.is_empty() {
                    println!("- {}", source.source);
                } else {
                    println!("- {} ({})", source.source, source.location);
                }
            }
        }

        Ok(())
    }
}
