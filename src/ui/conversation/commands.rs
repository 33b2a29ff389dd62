use std::path::PathBuf;
use std::str::FromStr;

use crate::events::{Provider, Voice};

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Start a new chat
    New,
    /// Switch provider (openai, anthropic)
    Provider,
    /// Switch model or list the models of the current provider
    Model,
    /// Turn spoken replies on or off
    Tts,
    /// Pick the voice for spoken replies
    Voice,
    /// Export the conversation as Markdown
    Save,
    /// Show the last speech file again
    Replay,
    /// Send a recorded WAV file as voice input
    Listen,
    /// List topics seen so far
    Topics,
    /// Forget the remembered login
    Logout,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

pub fn command_entries() -> Vec<CommandEntry> {
    SlashCommand::iter()
        .map(|command| CommandEntry {
            command,
            keyword: command.command(),
            description: command.description(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: SlashCommand,
    pub keyword: &'static str,
    pub description: &'static str,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    pub fn provider_target(&self) -> Option<Provider> {
        if self.command != SlashCommand::Provider {
            return None;
        }

        let arg = self.argument()?.trim().to_lowercase();
        match arg.as_str() {
            "gpt" | "o" => Some(Provider::OpenAi),
            "claude" | "a" => Some(Provider::Anthropic),
            other => Provider::from_str(other).ok(),
        }
    }

    pub fn voice_target(&self) -> Option<Voice> {
        if self.command != SlashCommand::Voice {
            return None;
        }
        Voice::from_str(self.argument()?.trim()).ok()
    }

    /// `on`/`off` for `/tts`; `None` with no argument means toggle
    pub fn switch_target(&self) -> Option<bool> {
        let arg = self.argument()?.trim().to_lowercase();
        match arg.as_str() {
            "on" | "yes" | "true" | "1" => Some(true),
            "off" | "no" | "false" | "0" => Some(false),
            _ => None,
        }
    }

    pub fn path_target(&self) -> Option<PathBuf> {
        self.argument().map(|arg| PathBuf::from(arg.trim()))
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::New => "start a new chat",
            SlashCommand::Provider => "switch provider (openai, anthropic)",
            SlashCommand::Model => "switch model, or list models with no argument",
            SlashCommand::Tts => "turn spoken replies on or off",
            SlashCommand::Voice => "pick the voice for spoken replies",
            SlashCommand::Save => "export the conversation as Markdown",
            SlashCommand::Replay => "show the last speech file again",
            SlashCommand::Listen => "send a recorded WAV file as voice input",
            SlashCommand::Topics => "list topics seen so far",
            SlashCommand::Logout => "forget the remembered login",
            SlashCommand::Help => "show available commands",
            SlashCommand::Bye => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Return all built-in commands in a Vec paired with their command string.
pub fn built_in_slash_commands() -> Vec<(&'static str, SlashCommand)> {
    SlashCommand::iter()
        .map(|c| (c.command(), c))
        .collect()
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim_start().strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(head).ok().or_else(|| match head.to_lowercase().as_str() {
        "q" | "quit" | "exit" => Some(SlashCommand::Bye),
        "clear" | "reset" => Some(SlashCommand::New),
        "models" => Some(SlashCommand::Model),
        "speak" => Some(SlashCommand::Tts),
        "export" => Some(SlashCommand::Save),
        _ => None,
    })?;

    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for (command_str, command) in built_in_slash_commands() {
        help.push_str(&format!("/{} - {}\n", command_str, command.description()));
    }

    help.push_str("\nAliases: /q for /bye, /clear for /new, /models for /model, /export for /save");
    help.push_str("\nExamples: /provider anthropic, /model gpt-4o, /tts on, /voice shimmer, /listen ~/note.wav");

    help
}
