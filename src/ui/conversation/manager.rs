use crate::config::Config;
use crate::controller::TurnOutcome;
use crate::error::ChatError;
use crate::events::{AppEvent, Provider, Voice};
use crate::export::ExportStore;
use crate::session::SessionState;
use crate::ui::conversation::composer::ConversationResult;
use crate::ui::conversation::history::NoticeKind;
use crate::ui::conversation::{
    get_help_text, ConversationComposer, ConversationHistory, ParsedCommand, SlashCommand,
    StreamingResponse,
};
use crossterm::event::KeyEvent;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Widget,
};
use strum::IntoEnumIterator;
use tracing::info;

const PLACEHOLDER: &str = "Ask anything. Enter to send, / for commands";

/// Borrowed application state a command may read or change
pub struct ChatContext<'a> {
    pub session: &'a mut SessionState,
    pub config: &'a Config,
    pub exports: &'a ExportStore,
}

/// Manages the chat screen: input, local commands and layout
pub struct ConversationManager {
    history: ConversationHistory,
    composer: ConversationComposer,
    streaming: StreamingResponse,
    user_name: String,
}

impl ConversationManager {
    pub fn new(user_name: impl Into<String>) -> Self {
        let mut composer = ConversationComposer::new(PLACEHOLDER);
        composer.set_focus(true);

        Self {
            history: ConversationHistory::new(100),
            composer,
            streaming: StreamingResponse::new(),
            user_name: user_name.into(),
        }
    }

    /// Handle key input. Returns the work the application loop must do.
    pub fn handle_key(&mut self, key: KeyEvent, ctx: ChatContext<'_>) -> Option<AppEvent> {
        if self.streaming.is_streaming() {
            return None;
        }

        match self.composer.handle_key(key) {
            ConversationResult::Submitted(input) => Some(AppEvent::Submit(input)),
            ConversationResult::Command(command) => self.handle_slash_command(command, ctx),
            ConversationResult::None => None,
        }
    }

    pub fn handle_paste(&mut self, text: &str) {
        if !self.streaming.is_streaming() {
            self.composer.insert_str(text);
        }
    }

    pub fn notify(&mut self, session: &SessionState, text: impl Into<String>) {
        self.history
            .add_notice(session.messages().len(), NoticeKind::Info, text);
    }

    pub fn notify_error(&mut self, session: &SessionState, error: &ChatError) {
        self.history
            .add_notice(session.messages().len(), NoticeKind::Error, error.to_string());
    }

    pub fn begin_streaming(&mut self, session: &SessionState) {
        self.streaming.start_streaming(format!(
            "{} {}",
            session.provider.display_name(),
            session.model
        ));
    }

    pub fn update_streaming(&mut self, text: &str) {
        self.streaming.update(text);
    }

    pub fn end_streaming(&mut self) {
        if let Some(elapsed) = self.streaming.finish() {
            info!(elapsed_ms = elapsed.as_millis() as u64, "response rendered");
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_streaming()
    }

    /// Surface what a committed turn produced besides the reply itself
    pub fn report_outcome(&mut self, session: &SessionState, outcome: &TurnOutcome) {
        if let Some(path) = &outcome.speech {
            self.notify(session, format!("🔊 Spoken reply saved to {}", path.display()));
        }
    }

    /// Handle slash commands
    fn handle_slash_command(&mut self, command: ParsedCommand, ctx: ChatContext<'_>) -> Option<AppEvent> {
        let ChatContext {
            session,
            config,
            exports,
        } = ctx;

        match command.command {
            SlashCommand::New => {
                session.reset();
                self.history.clear();
                self.notify(session, "Started a new chat.");
            }
            SlashCommand::Provider => match command.provider_target() {
                Some(provider) => self.switch_provider(session, config, provider),
                None => {
                    let options: Vec<String> = Provider::iter().map(|p| p.to_string()).collect();
                    self.notify(
                        session,
                        format!(
                            "Current provider: {}. Choose one of: {}",
                            session.provider,
                            options.join(", ")
                        ),
                    );
                }
            },
            SlashCommand::Model => match command.argument() {
                Some(query) => self.switch_model(session, config, query),
                None => self.list_models(session, config),
            },
            SlashCommand::Tts => {
                let enabled = match (command.argument(), command.switch_target()) {
                    (None, _) => !session.tts_enabled,
                    (Some(_), Some(enabled)) => enabled,
                    (Some(arg), None) => {
                        self.notify(
                            session,
                            format!("Unknown /tts setting '{}'. Use /tts on, /tts off or /tts to toggle.", arg.trim()),
                        );
                        return None;
                    }
                };
                session.tts_enabled = enabled;
                if enabled && !config.has_api_key(Provider::OpenAi) {
                    self.notify(
                        session,
                        format!(
                            "Spoken replies need {}; replies will fail to speak until it is set.",
                            Provider::OpenAi.api_key_env()
                        ),
                    );
                }
                self.notify(
                    session,
                    format!("Spoken replies {}.", if enabled { "on" } else { "off" }),
                );
            }
            SlashCommand::Voice => match command.voice_target() {
                Some(voice) => {
                    session.voice = voice;
                    self.notify(session, format!("Voice set to {}.", voice));
                }
                None => {
                    let voices: Vec<String> = Voice::iter().map(|v| v.to_string()).collect();
                    self.notify(
                        session,
                        format!("Current voice: {}. Choose one of: {}", session.voice, voices.join(", ")),
                    );
                }
            },
            SlashCommand::Save => {
                if session.messages().is_empty() {
                    self.notify(session, "Nothing to save yet.");
                } else {
                    match exports.save(session.messages()) {
                        Ok(path) => {
                            info!(path = %path.display(), "conversation exported");
                            self.notify(session, format!("Saved conversation to {}", path.display()));
                        }
                        Err(e) => self.notify_error(session, &ChatError::Export(format!("{:#}", e))),
                    }
                }
            }
            SlashCommand::Replay => {
                let text = match session.last_speech() {
                    Some(path) => format!("🔊 Last spoken reply: {}", path.display()),
                    None => "No spoken reply yet. Turn it on with /tts on.".to_string(),
                };
                self.notify(session, text);
            }
            SlashCommand::Listen => match command.path_target() {
                Some(path) => return Some(AppEvent::Listen(path)),
                None => self.notify(session, "Usage: /listen <path to a WAV recording>"),
            },
            SlashCommand::Topics => {
                let text = if session.topics().is_empty() {
                    "No topics yet.".to_string()
                } else {
                    format!("Topics: {}", session.topics().join(", "))
                };
                self.notify(session, text);
            }
            SlashCommand::Logout => return Some(AppEvent::Logout),
            SlashCommand::Help => self.notify(session, get_help_text()),
            SlashCommand::Bye => return Some(AppEvent::Exit),
        }

        None
    }

    fn switch_provider(&mut self, session: &mut SessionState, config: &Config, provider: Provider) {
        let Some(model) = config.default_model(provider) else {
            self.notify(session, format!("No models configured for {}.", provider));
            return;
        };

        session.select(provider, model);
        self.notify(
            session,
            format!("Switched to {} ({}).", provider.display_name(), model),
        );
        if !config.has_api_key(provider) {
            self.notify(
                session,
                format!("No API key found; set {} before sending.", provider.api_key_env()),
            );
        }
    }

    fn switch_model(&mut self, session: &mut SessionState, config: &Config, query: &str) {
        match config.model_for(session.provider, query) {
            Some(option) => {
                let id = option.id.clone();
                session.select(session.provider, id.as_str());
                self.notify(session, format!("Model set to {}.", id));
            }
            None => {
                let error = ChatError::UnknownModel {
                    provider: session.provider,
                    model: query.to_string(),
                };
                self.notify_error(session, &error);
            }
        }
    }

    fn list_models(&mut self, session: &SessionState, config: &Config) {
        let mut text = format!("{} models:", session.provider.display_name());
        for option in config.models(session.provider) {
            let marker = if option.id == session.model { "*" } else { " " };
            text.push_str(&format!("\n{} {} ({})", marker, option.id, option.label));
        }
        self.notify(session, text);
    }

    fn header_line(&self, session: &SessionState) -> Line<'static> {
        let dim = Style::default().fg(Color::DarkGray);
        let tts = if session.tts_enabled {
            format!("TTS on ({})", session.voice)
        } else {
            "TTS off".to_string()
        };

        Line::from(vec![
            Span::styled("duochat", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled(" · ", dim),
            Span::raw(self.user_name.clone()),
            Span::styled(" · ", dim),
            Span::styled(
                format!("{} {}", session.provider.display_name(), session.model),
                Style::default().fg(Color::Green),
            ),
            Span::styled(" · ", dim),
            Span::raw(tts),
            Span::styled(" · ", dim),
            Span::styled(format!("{} turns", session.completed_turns()), dim),
        ])
    }

    /// Render the chat screen
    pub fn render(&self, area: Rect, buf: &mut Buffer, session: &SessionState) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // Header
                Constraint::Min(5),    // History
                Constraint::Length(1), // Streaming indicator
                Constraint::Length(3), // Composer
            ])
            .split(area);

        buf.set_line(chunks[0].x, chunks[0].y, &self.header_line(session), chunks[0].width);

        self.history
            .view(session.messages(), self.streaming.text())
            .render(chunks[1], buf);

        self.streaming.clone().render(chunks[2], buf);

        self.composer.clone().render(chunks[3], buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyModifiers};
    use std::path::PathBuf;

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        exports: ExportStore,
        session: SessionState,
        manager: ConversationManager,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = Config::with_home(dir.path().to_path_buf());
            let exports = ExportStore::new(config.export_dir.clone());
            Self {
                _dir: dir,
                config,
                exports,
                session: SessionState::new(Provider::OpenAi, "gpt-4o-mini"),
                manager: ConversationManager::new("Alice"),
            }
        }

        fn enter(&mut self, text: &str) -> Option<AppEvent> {
            for c in text.chars() {
                self.key(KeyCode::Char(c));
            }
            self.key(KeyCode::Enter)
        }

        fn key(&mut self, code: KeyCode) -> Option<AppEvent> {
            let ctx = ChatContext {
                session: &mut self.session,
                config: &self.config,
                exports: &self.exports,
            };
            self.manager.handle_key(KeyEvent::new(code, KeyModifiers::NONE), ctx)
        }

        fn last_notice(&self) -> String {
            self.manager.history.notices().last().map(|n| n.text.clone()).unwrap_or_default()
        }
    }

    #[test]
    fn plain_text_becomes_a_submit_event() {
        let mut fx = Fixture::new();
        assert_eq!(fx.enter("hello world"), Some(AppEvent::Submit("hello world".to_string())));
    }

    #[test]
    fn provider_switch_selects_default_model() {
        let mut fx = Fixture::new();
        assert_eq!(fx.enter("/provider anthropic"), None);
        assert_eq!(fx.session.provider, Provider::Anthropic);
        assert_eq!(fx.session.model, "claude-3-haiku-20240307");
    }

    #[test]
    fn model_switch_is_checked_against_provider() {
        let mut fx = Fixture::new();
        fx.enter("/model gpt-4o");
        assert_eq!(fx.session.model, "gpt-4o");

        fx.enter("/model claude-3-opus-20240229");
        assert_eq!(fx.session.model, "gpt-4o");
        assert!(fx.last_notice().contains("not offered by openai"));
    }

    #[test]
    fn tts_and_voice_update_session() {
        let mut fx = Fixture::new();
        fx.enter("/tts on");
        assert!(fx.session.tts_enabled);
        fx.enter("/tts");
        assert!(!fx.session.tts_enabled);

        fx.enter("/tts loud");
        assert!(!fx.session.tts_enabled);
        assert!(fx.last_notice().contains("Unknown /tts setting 'loud'"));

        fx.enter("/voice onyx");
        assert_eq!(fx.session.voice, Voice::Onyx);
    }

    #[test]
    fn save_writes_export_named_after_topic() {
        let mut fx = Fixture::new();
        fx.enter("/save");
        assert_eq!(fx.last_notice(), "Nothing to save yet.");

        fx.session.push_display(crate::events::Message::user("hello world"));
        fx.session.push_display(crate::events::Message::assistant("world peace"));
        fx.enter("/save");

        let path = fx.config.export_dir.join("world.md");
        assert!(path.exists());
        assert!(fx.last_notice().contains("world.md"));
    }

    #[test]
    fn new_chat_resets_session_and_notices() {
        let mut fx = Fixture::new();
        fx.session.push_display(crate::events::Message::user("hi"));
        fx.enter("/topics");
        fx.enter("/new");

        assert!(fx.session.messages().is_empty());
        assert_eq!(fx.manager.history.notices().len(), 1);
        assert_eq!(fx.last_notice(), "Started a new chat.");
    }

    #[test]
    fn app_level_commands_are_returned() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.enter("/listen /tmp/voice.wav"),
            Some(AppEvent::Listen(PathBuf::from("/tmp/voice.wav")))
        );
        assert_eq!(fx.enter("/logout"), Some(AppEvent::Logout));
        assert_eq!(fx.enter("/bye"), Some(AppEvent::Exit));
    }

    #[test]
    fn input_is_ignored_while_streaming() {
        let mut fx = Fixture::new();
        fx.manager.begin_streaming(&fx.session);
        assert_eq!(fx.enter("hello"), None);

        fx.manager.end_streaming();
        assert_eq!(fx.enter("hello"), Some(AppEvent::Submit("hello".to_string())));
    }
}
