mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kindred::config::KindredConfig;
use kindred::training::ExportFormat;

#[derive(Parser)]
#[command(name = "kindred", version, about = "Terminal AI companion that remembers you")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat (default)
    Chat {
        /// User id to chat as (defaults to config or user@host)
        #[arg(long)]
        user: Option<String>,
    },
    /// Export stored conversations as fine-tuning JSONL
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Openai)]
        format: ExportFormat,
        /// Output file (defaults to stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Only export this user's conversations
        #[arg(long)]
        user: Option<String>,
    },
    /// Show conversation corpus statistics
    Stats,
    /// List remembered facts for a user
    Memories {
        #[arg(long)]
        user: Option<String>,
    },
    /// Delete one remembered fact
    Forget {
        #[arg(long)]
        user: Option<String>,
        key: String,
    },
    /// Run database and API diagnostics
    Doctor,
    /// Delete all stored data
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = KindredConfig::load()?;

    // Log to stderr so stdout stays clean for the conversation and exports.
    let filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Command::Chat { user: None }) {
        Command::Chat { user } => cli::chat::chat(&config, user).await?,
        Command::Export {
            format,
            output,
            user,
        } => cli::export::export(&config, format, output.as_deref(), user.as_deref())?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Memories { user } => {
            let user = user.unwrap_or_else(|| config.resolved_user_id());
            cli::memories::memories(&config, &user)?
        }
        Command::Forget { user, key } => {
            let user = user.unwrap_or_else(|| config.resolved_user_id());
            cli::memories::forget(&config, &user, &key)?
        }
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::Reset => cli::reset::reset(&config)?,
    }

    Ok(())
}
