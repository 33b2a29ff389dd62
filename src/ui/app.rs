use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, widgets::Widget, Terminal};
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::auth::{AuthStatus, Authenticator};
use crate::config::Config;
use crate::controller::ConversationController;
use crate::events::{AppEvent, TuiEvent};
use crate::export::ExportStore;
use crate::session::SessionState;
use crate::ui::conversation::{ChatContext, ConversationManager};
use crate::ui::login::{LoginAction, LoginScreen};

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

enum Screen {
    Login(LoginScreen),
    Chat(ConversationManager),
}

/// Interactive application: login gate followed by the chat screen
pub struct App {
    config: Config,
    controller: ConversationController,
    authenticator: Authenticator,
    exports: ExportStore,
    session: SessionState,
    screen: Screen,
}

impl App {
    pub fn new(
        config: Config,
        controller: ConversationController,
        authenticator: Authenticator,
        session: SessionState,
    ) -> Self {
        let exports = ExportStore::new(config.export_dir.clone());
        let screen = match authenticator.resume() {
            AuthStatus::Authenticated { username, name } => {
                info!(%username, "resumed remembered login");
                Screen::Chat(ConversationManager::new(name))
            }
            _ => Screen::Login(LoginScreen::new()),
        };

        Self {
            config,
            controller,
            authenticator,
            exports,
            session,
            screen,
        }
    }

    /// Run until the user quits
    pub async fn run(mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.event_loop(&mut terminal).await;

        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableBracketedPaste
        )?;
        terminal.show_cursor()?;

        info!(session = %self.session.id(), turns = self.session.completed_turns(), "session ended");
        result
    }

    async fn event_loop(&mut self, terminal: &mut Tui) -> Result<()> {
        loop {
            self.draw(terminal)?;

            if !event::poll(Duration::from_millis(100))? {
                continue;
            }
            let Some(tui_event) = TuiEvent::from_crossterm(event::read()?) else {
                continue;
            };

            let app_event = match tui_event {
                TuiEvent::Key(key) => {
                    if key.kind == KeyEventKind::Press
                        && key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        return Ok(());
                    }
                    self.handle_key(key)?
                }
                TuiEvent::Paste(text) => {
                    match &mut self.screen {
                        Screen::Login(login) => login.handle_paste(&text),
                        Screen::Chat(manager) => manager.handle_paste(&text),
                    }
                    None
                }
                TuiEvent::Resize(..) | TuiEvent::Draw => None,
            };

            match app_event {
                Some(AppEvent::Submit(input)) => self.run_turn(terminal, input).await?,
                Some(AppEvent::Listen(path)) => self.run_voice_turn(terminal, &path).await?,
                Some(AppEvent::Logout) => self.logout(),
                Some(AppEvent::Exit) => return Ok(()),
                None => {}
            }
        }
    }

    fn handle_key(&mut self, key: crossterm::event::KeyEvent) -> Result<Option<AppEvent>> {
        match &mut self.screen {
            Screen::Login(login) => match login.handle_key(key) {
                LoginAction::Submit { username, password } => {
                    let status = match self.authenticator.login(&username, &password) {
                        Ok(status) => status,
                        Err(e) => {
                            error!(error = %e, "login failed");
                            login.show_error(e.to_string());
                            return Ok(None);
                        }
                    };
                    match status {
                        AuthStatus::Authenticated { name, .. } => {
                            self.session.reset();
                            self.screen = Screen::Chat(ConversationManager::new(name));
                        }
                        other => login.apply_status(&other),
                    }
                    Ok(None)
                }
                LoginAction::Exit => Ok(Some(AppEvent::Exit)),
                LoginAction::None => Ok(None),
            },
            Screen::Chat(manager) => {
                let ctx = ChatContext {
                    session: &mut self.session,
                    config: &self.config,
                    exports: &self.exports,
                };
                Ok(manager.handle_key(key, ctx))
            }
        }
    }

    fn logout(&mut self) {
        if let Err(e) = self.authenticator.logout() {
            error!(error = %e, "failed to clear remembered login");
        }
        self.session.reset();
        self.screen = Screen::Login(LoginScreen::new());
    }

    fn draw(&self, terminal: &mut Tui) -> Result<()> {
        terminal.draw(|frame| {
            let area = frame.size();
            match &self.screen {
                Screen::Login(login) => login.render(area, frame.buffer_mut()),
                Screen::Chat(manager) => manager.render(area, frame.buffer_mut(), &self.session),
            }
        })?;
        Ok(())
    }

    /// Stream one turn, redrawing after every fragment
    async fn run_turn(&mut self, terminal: &mut Tui, input: String) -> Result<()> {
        let Screen::Chat(manager) = &mut self.screen else {
            return Ok(());
        };

        manager.begin_streaming(&self.session);
        let mut pending = match self.controller.begin_turn(&mut self.session, &input).await {
            Ok(pending) => pending,
            Err(e) => {
                manager.end_streaming();
                manager.notify_error(&self.session, &e);
                return Ok(());
            }
        };
        draw_chat(terminal, manager, &self.session)?;

        while let Some(fragment) = pending.next_fragment().await {
            match fragment {
                Ok(_) => {
                    manager.update_streaming(pending.text());
                    draw_chat(terminal, manager, &self.session)?;
                }
                Err(e) => {
                    let err = self.controller.abort_turn(&mut self.session, pending, e);
                    manager.end_streaming();
                    manager.notify_error(&self.session, &err);
                    return Ok(());
                }
            }
        }

        manager.end_streaming();
        match self.controller.finish_turn(&mut self.session, pending).await {
            Ok(outcome) => manager.report_outcome(&self.session, &outcome),
            Err(e) => manager.notify_error(&self.session, &e),
        }
        Ok(())
    }

    async fn run_voice_turn(&mut self, terminal: &mut Tui, path: &Path) -> Result<()> {
        let Screen::Chat(manager) = &mut self.screen else {
            return Ok(());
        };

        let audio = match tokio::fs::read(path).await {
            Ok(audio) => audio,
            Err(e) => {
                manager.notify(&self.session, format!("Cannot read {}: {}", path.display(), e));
                return Ok(());
            }
        };

        manager.notify(&self.session, format!("🎙️ Transcribing {}...", path.display()));
        draw_chat(terminal, manager, &self.session)?;

        match self.controller.transcribe(audio).await {
            Ok(Some(transcript)) => self.run_turn(terminal, transcript).await,
            Ok(None) => {
                manager.notify(&self.session, "No speech detected in the recording.");
                Ok(())
            }
            Err(e) => {
                manager.notify_error(&self.session, &e);
                Ok(())
            }
        }
    }
}

fn draw_chat(terminal: &mut Tui, manager: &ConversationManager, session: &SessionState) -> Result<()> {
    terminal
        .draw(|frame| {
            let area = frame.size();
            manager.render(area, frame.buffer_mut(), session);
        })
        .context("Failed to draw chat screen")?;
    Ok(())
}
