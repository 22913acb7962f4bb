//! Covey CLI - Command line interface for Covey
//!
//! Automated pull-request reviews by a small set of cooperating agents.

mod commands;

use clap::{Parser, Subcommand};
use covey_core::{Config, Secrets};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::ReviewArgs;

/// Covey: automated pull-request reviews by cooperating agents
#[derive(Parser, Debug)]
#[command(name = "covey")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Base URL of the chat-completions endpoint (overrides config and env)
    #[arg(long, global = true, env = "COVEY_API_BASE")]
    api_base: Option<String>,

    /// Model to use (overrides config and env)
    #[arg(long, global = true, env = "COVEY_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Review a pull request with Covey agents
    #[command(visible_alias = "r")]
    Review(ReviewArgs),

    /// Show current configuration
    Config,

    /// Create a secrets file template
    Secrets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.api_base.clone(), cli.model.clone(), None)?;

    if cli.verbose {
        tracing::info!(
            api_base = %config.llm.api_base,
            model = %config.llm.model,
            max_turns = config.orchestrator.max_turns,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("covey {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Review(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Config) => {
            println!("Covey Configuration");
            println!("===================");
            println!();
            println!("Orchestrator:");
            println!("  max_turns: {}", config.orchestrator.max_turns);
            println!("  tool_timeout: {:?}", config.orchestrator.tool_timeout);
            println!("  post_attempts: {}", config.orchestrator.post_attempts);
            println!();
            println!("LLM:");
            println!("  api_base: {}", config.llm.api_base);
            println!("  model: {}", config.llm.model);
            println!("  request_timeout: {:?}", config.llm.request_timeout);
            println!();
            if let Some(path) = Config::default_config_path() {
                println!("Config file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - using defaults)");
                }
            }
        }
        Some(Commands::Secrets) => {
            let path = Secrets::create_template()?;
            println!("Created secrets template at {}", path.display());
            println!("Edit it to add your GitHub token and LLM API key.");
        }
        None => {
            println!("Covey - automated pull-request reviews by cooperating agents");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
