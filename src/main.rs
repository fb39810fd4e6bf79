use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use claude_analytics::config::get_config;
use claude_analytics::display::DisplayManager;
use claude_analytics::logging::init_logging;
use claude_analytics::{AnalyzerOptions, ConversationAnalyzer, DerivedStateCache, ScanCancel};

#[derive(Parser)]
#[command(name = "claude-analytics")]
#[command(about = "Streaming analytics over Claude Code conversation logs")]
#[command(version)]
struct Cli {
    /// Log root to scan (defaults to <claude_home>/projects)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Recompute every derived value instead of using the in-memory cache
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Show corpus totals and usage sessions
    Summary,
    /// List conversations, most recently modified first
    Conversations {
        /// Show at most N conversations
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List rolling 5-hour usage sessions
    Sessions,
    /// List project directories and their activity
    Projects,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = get_config();
    let _log_guard = init_logging(&config.logging, &config.paths.log_directory);

    let root = cli.root.clone().unwrap_or_else(|| config.paths.projects_dir());
    let cache = if cli.no_cache || !config.cache.enabled {
        DerivedStateCache::disabled()
    } else {
        DerivedStateCache::in_memory()
    };
    let analyzer = ConversationAnalyzer::new(root, AnalyzerOptions::from_config(config), Arc::new(cache));

    let cancel = ScanCancel::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let report = match analyzer.scan_with_cancel(cancel).await {
        Ok(report) => report,
        Err(e) => return handle_error(e.into(), cli.json),
    };

    let display = DisplayManager::new();
    match cli.command.unwrap_or(Commands::Summary) {
        Commands::Summary => display.display_summary(&report, cli.json),
        Commands::Conversations { limit } => display.display_conversations(&report, limit, cli.json),
        Commands::Sessions => display.display_sessions(&report, cli.json),
        Commands::Projects => display.display_projects(&report, cli.json),
    }

    Ok(())
}

fn handle_error(e: anyhow::Error, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::json!({ "error": e.to_string() }));
    } else {
        eprintln!("Error: {}", e);
    }
    process::exit(1);
}
