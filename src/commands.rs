use anyhow::{Context, Result, bail};
use std::io::{self, Write};
use std::path::Path;
use strum::IntoEnumIterator;

use crate::auth::{self, AuthStatus, Authenticator, CredentialStore};
use crate::config::Config;
use crate::controller::{ConversationController, TurnOutcome};
use crate::error::ChatError;
use crate::events::Provider;
use crate::export::ExportStore;
use crate::session::SessionState;
use crate::ui::App;

/// Build a session for the requested provider and model, validated against
/// the config and seeded with the speech preferences.
pub fn new_session(
    config: &Config,
    provider: Option<Provider>,
    model: Option<&str>,
) -> Result<SessionState> {
    let provider = provider.unwrap_or(config.default_provider);
    let model = match model {
        Some(query) => config
            .model_for(provider, query)
            .map(|m| m.id.clone())
            .ok_or_else(|| ChatError::UnknownModel {
                provider,
                model: query.to_string(),
            })?,
        None => config
            .default_model(provider)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("No models configured for {}", provider))?,
    };

    let mut session = SessionState::new(provider, model);
    session.tts_enabled = config.speech.tts_enabled;
    session.voice = config.speech.voice;
    Ok(session)
}

/// Interactive terminal chat
pub async fn chat(config: Config, provider: Option<Provider>, model: Option<String>) -> Result<()> {
    let session = new_session(&config, provider, model.as_deref())?;
    let controller = ConversationController::from_config(&config)?;
    let authenticator = Authenticator::open(&config)?;

    App::new(config, controller, authenticator, session).run().await
}

fn require_login(config: &Config) -> Result<String> {
    let authenticator = Authenticator::open(config)?;
    match authenticator.resume() {
        AuthStatus::Authenticated { username, .. } => Ok(username),
        _ => bail!("Not logged in. Run `duochat` and sign in first."),
    }
}

/// Print each fragment as it arrives
fn stdout_renderer() -> impl FnMut(&str) {
    let mut printed = 0;
    move |text: &str| {
        let mut stdout = io::stdout();
        let _ = write!(stdout, "{}", &text[printed..]);
        let _ = stdout.flush();
        printed = text.len();
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    println!();
    if let Some(path) = &outcome.speech {
        eprintln!("🔊 Spoken reply saved to {}", path.display());
    }
}

/// One-shot streamed question
pub async fn ask(
    config: Config,
    prompt: &str,
    provider: Option<Provider>,
    model: Option<String>,
) -> Result<()> {
    require_login(&config)?;
    let mut session = new_session(&config, provider, model.as_deref())?;
    let controller = ConversationController::from_config(&config)?;

    let result = controller
        .handle_turn(&mut session, prompt, stdout_renderer())
        .await;
    match result {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(e) => {
            println!();
            Err(e.into())
        }
    }
}

/// One-shot voice turn from a recorded WAV file
pub async fn listen(
    config: Config,
    path: &Path,
    provider: Option<Provider>,
    model: Option<String>,
) -> Result<()> {
    require_login(&config)?;
    let mut session = new_session(&config, provider, model.as_deref())?;
    let controller = ConversationController::from_config(&config)?;

    let audio = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    match controller.transcribe(audio).await? {
        Some(transcript) => {
            println!("🎙️ {}", transcript);
            println!();
            let outcome = controller
                .handle_turn(&mut session, &transcript, stdout_renderer())
                .await?;
            print_outcome(&outcome);
        }
        None => println!("No speech detected in {}", path.display()),
    }
    Ok(())
}

pub fn models(config: &Config) -> Result<()> {
    for provider in Provider::iter() {
        let key_state = if config.has_api_key(provider) {
            "key set"
        } else {
            provider.api_key_env()
        };
        println!("{} [{}] ({})", provider.display_name(), provider, key_state);

        let default_model = config.default_model(provider);
        for option in config.models(provider) {
            let marker = if Some(option.id.as_str()) == default_model { "*" } else { " " };
            println!("  {} {:<28} {}", marker, option.id, option.label);
        }
        println!();
    }
    Ok(())
}

/// Write default config and an empty credential store if missing
pub fn init(config: &Config) -> Result<()> {
    if config.config_path().exists() {
        println!("Config already exists at {}", config.config_path().display());
    } else {
        config.save()?;
        println!("Wrote {}", config.config_path().display());
    }

    if config.credentials_path.exists() {
        println!("Credentials already exist at {}", config.credentials_path.display());
    } else {
        CredentialStore::default().save(&config.credentials_path)?;
        println!("Wrote {}", config.credentials_path.display());
    }

    ExportStore::new(config.export_dir.clone()).ensure_directories()?;
    std::fs::create_dir_all(&config.speech_dir)
        .with_context(|| format!("Failed to create {}", config.speech_dir.display()))?;

    println!();
    println!("Add users under credentials.usernames in the credential file.");
    println!("Generate password hashes with `duochat hash-password`.");
    Ok(())
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read input")?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

pub fn hash_password() -> Result<()> {
    let password = prompt_line("Password: ")?;
    println!("{}", auth::hash_password(&password)?);
    Ok(())
}

pub fn passwd(config: &Config, username: &str) -> Result<()> {
    let mut authenticator = Authenticator::open(config)?;

    let current = prompt_line("Current password: ")?;
    let new = prompt_line("New password: ")?;
    let confirm = prompt_line("Repeat new password: ")?;
    if new != confirm {
        bail!("Passwords do not match");
    }

    authenticator.reset_password(username, &current, &new)?;
    println!("Password updated for {}", username);
    Ok(())
}

pub fn logout(config: &Config) -> Result<()> {
    Authenticator::open(config)?.logout()?;
    println!("Logged out.");
    Ok(())
}

pub fn exports(config: &Config) -> Result<()> {
    let store = ExportStore::new(config.export_dir.clone());
    let exports = store.list()?;

    if exports.is_empty() {
        println!("No exported conversations yet. Use /save in a chat.");
        return Ok(());
    }

    println!("📁 Exported conversations in {}:", store.dir().display());
    for path in exports {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let messages = store.load(name).map(|m| m.len()).unwrap_or(0);
        println!("  • {} ({} messages)", name, messages);
    }
    Ok(())
}
