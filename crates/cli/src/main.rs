//! CycleCare CLI
//!
//! Main entry point for the cyclecare command-line tool: ingest a document
//! collection, ask grounded questions about it and look up nearby clinics.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ClinicsCommand, HealthCommand, IngestCommand, StatsCommand};
use cyclecare_core::{config::AppConfig, logging};
use std::path::PathBuf;

/// CycleCare - menstrual health questions answered from your own documents
#[derive(Parser, Debug)]
#[command(name = "cyclecare")]
#[command(about = "Menstrual health Q&A grounded in a local document collection", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "CYCLECARE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "CYCLECARE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Generation provider (ollama, gemini, mock)
    #[arg(short, long, global = true, env = "CYCLECARE_PROVIDER")]
    provider: Option<String>,

    /// Generation model identifier
    #[arg(short, long, global = true, env = "CYCLECARE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load, chunk and index documents
    Ingest(IngestCommand),

    /// Ask a question about the indexed documents
    Ask(AskCommand),

    /// Report index readiness and generator reachability
    Health(HealthCommand),

    /// Recommend clinics near a location
    Clinics(ClinicsCommand),

    /// Show index statistics
    Stats(StatsCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ingest(_) => "ingest",
            Commands::Ask(_) => "ask",
            Commands::Health(_) => "health",
            Commands::Clinics(_) => "clinics",
            Commands::Stats(_) => "stats",
        }
    }
}

/// Environment and default config file first, then an explicit config file
/// or the one in an overridden workspace, then flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load()?;

    let file = match (&cli.config, &cli.workspace) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(workspace)) => Some(
            workspace
                .join(cyclecare_core::config::STATE_DIR)
                .join("config.yaml"),
        )
        .filter(|path| path.exists()),
        (None, None) => None,
    };
    if let Some(path) = file {
        config = config.merge_yaml(&path)?;
    }

    let config = config.with_overrides(
        cli.workspace.clone(),
        cli.config.clone(),
        cli.provider.clone(),
        cli.model.clone(),
        cli.log_level.clone(),
        cli.verbose,
        cli.no_color,
    );
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = resolve_config(&cli)?;

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("CycleCare CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_state_dir()?;

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    // Route to command handlers
    let result = match &cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Health(cmd) => cmd.execute(&config).await,
        Commands::Clinics(cmd) => cmd.execute(&config),
        Commands::Stats(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
