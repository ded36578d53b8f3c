//! Command-line interface
//!
//! One subcommand per ability, plus config and memory inspection.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::abilities::Orchestrator;
use crate::config::{self, Config};

#[derive(Parser)]
#[command(name = "forge-agent")]
#[command(about = "Self-modifying agent with targeting, exploration and memory", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a goal and execute its subtasks
    Target {
        /// The goal to pursue
        goal: String,
    },
    /// Answer a question from stored knowledge
    Brief {
        /// The question to explore
        topic: String,
    },
    /// Run one self-modification session (patch, test, merge)
    Selfmod {
        /// Desired change to the workspace
        goal: String,
        /// Comma-separated file paths the change may touch
        #[arg(long, default_value = "src")]
        files: String,
    },
    /// Show or initialize the configuration
    Config {
        /// Print the active configuration
        #[arg(long)]
        show: bool,
    },
    /// Inspect or extend the knowledge store
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Store a piece of knowledge
    Add {
        /// The text to remember
        text: String,
    },
    /// Search stored knowledge
    Search {
        /// The query text
        query: String,
        /// Maximum results
        #[arg(long, default_value_t = 5)]
        k: usize,
    },
}

/// Parse arguments and dispatch.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Target { goal } => {
            let orch = Orchestrator::from_config(&config).await?;
            let report = orch.run_targeting(&goal).await?;

            for entry in &report.log {
                println!("{entry}\n");
            }
            println!("Mode: {}", report.mode);
        }
        Commands::Brief { topic } => {
            let orch = Orchestrator::from_config(&config).await?;
            let report = orch.run_info(&topic).await?;

            println!("{}", report.answer);
            println!("\n({} stored entries consulted)", report.context_entries);
        }
        Commands::Selfmod { goal, files } => {
            let file_list: Vec<String> = files
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();

            let orch = Orchestrator::from_config(&config).await?;
            let report = orch.run_self_mod(&goal, file_list).await;

            println!("Status: {} (attempts: {})", report.status, report.attempts);
            println!("{}", report.last_result);
        }
        Commands::Config { show } => {
            let path = config::config_path()?;
            println!("Config file: {}", path.display());
            if show {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Memory { action } => {
            let orch = Orchestrator::from_config(&config).await?;
            let store = orch.store();

            match action {
                MemoryAction::Add { text } => {
                    let metadata = [("source".to_string(), "cli".to_string())].into();
                    store.upsert(&text, metadata).await?;
                    println!("Stored.");
                }
                MemoryAction::Search { query, k } => {
                    let hits = store.search(&query, k).await?;
                    if hits.is_empty() {
                        println!("No matches.");
                    }
                    for entry in hits {
                        println!("[{}] {}", entry.created_at.format("%Y-%m-%d %H:%M"), entry.content);
                    }
                }
            }
        }
    }

    Ok(())
}
