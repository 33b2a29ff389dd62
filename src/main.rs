use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use duochat::commands;
use duochat::config::Config;
use duochat::events::Provider;
use duochat::logging;

#[derive(Parser)]
#[command(name = "duochat")]
#[command(version)]
#[command(about = "Chat with OpenAI and Anthropic models from the terminal", long_about = None)]
struct Cli {
    /// Provider to start with (openai, anthropic)
    #[arg(long, global = true)]
    provider: Option<Provider>,

    /// Model id or label offered by the provider
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (default)
    Chat,
    /// Ask one question and stream the reply to stdout
    Ask {
        #[arg(required = true)]
        prompt: Vec<String>,
    },
    /// Transcribe a WAV recording and send it as one question
    Listen { path: PathBuf },
    /// List providers and their models
    Models,
    /// Write default config and an empty credential file
    Init,
    /// Print a bcrypt hash for the credential file
    HashPassword,
    /// Change a user's password
    Passwd { username: String },
    /// Forget the remembered login
    Logout,
    /// List exported conversations
    Exports,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    let _log_guard = logging::init(&config)?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => commands::chat(config, cli.provider, cli.model).await,
        Commands::Ask { prompt } => {
            commands::ask(config, &prompt.join(" "), cli.provider, cli.model).await
        }
        Commands::Listen { path } => {
            commands::listen(config, &path, cli.provider, cli.model).await
        }
        Commands::Models => commands::models(&config),
        Commands::Init => commands::init(&config),
        Commands::HashPassword => commands::hash_password(),
        Commands::Passwd { username } => commands::passwd(&config, &username),
        Commands::Logout => commands::logout(&config),
        Commands::Exports => commands::exports(&config),
    }
}
