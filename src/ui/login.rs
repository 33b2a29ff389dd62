//! Username/password prompt shown until a login succeeds

use crate::auth::AuthStatus;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

pub const REJECTED_MESSAGE: &str = "Username/password is incorrect";
pub const PENDING_MESSAGE: &str = "Please enter your username and password";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Username,
    Password,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAction {
    None,
    Submit { username: String, password: String },
    Exit,
}

#[derive(Debug, Clone)]
pub struct LoginScreen {
    username: String,
    password: String,
    focus: Field,
    message: Option<(String, Color)>,
}

impl Default for LoginScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginScreen {
    pub fn new() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            focus: Field::Username,
            message: Some((PENDING_MESSAGE.to_string(), Color::Yellow)),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> LoginAction {
        if key.kind != KeyEventKind::Press {
            return LoginAction::None;
        }

        match key.code {
            KeyCode::Esc => return LoginAction::Exit,
            KeyCode::Tab | KeyCode::Down | KeyCode::Up | KeyCode::BackTab => {
                self.toggle_focus();
            }
            KeyCode::Enter => {
                if self.focus == Field::Username && self.password.is_empty() {
                    self.focus = Field::Password;
                } else {
                    return LoginAction::Submit {
                        username: self.username.trim().to_string(),
                        password: self.password.clone(),
                    };
                }
            }
            KeyCode::Backspace => {
                self.field_mut().pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.field_mut().clear();
            }
            KeyCode::Char(c) => {
                self.field_mut().push(c);
            }
            _ => {}
        }

        LoginAction::None
    }

    pub fn handle_paste(&mut self, text: &str) {
        let line = text.lines().next().unwrap_or_default();
        self.field_mut().push_str(line);
    }

    /// Show the result of a failed attempt and clear the password
    pub fn apply_status(&mut self, status: &AuthStatus) {
        match status {
            AuthStatus::Authenticated { .. } => self.message = None,
            AuthStatus::Rejected => {
                self.message = Some((REJECTED_MESSAGE.to_string(), Color::Red));
                self.password.clear();
                self.focus = Field::Password;
            }
            AuthStatus::Pending => {
                self.message = Some((PENDING_MESSAGE.to_string(), Color::Yellow));
            }
        }
    }

    pub fn show_error(&mut self, text: impl Into<String>) {
        self.message = Some((text.into(), Color::Red));
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_ref().map(|(text, _)| text.as_str())
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Field::Username => Field::Password,
            Field::Password => Field::Username,
        };
    }

    fn field_mut(&mut self) -> &mut String {
        match self.focus {
            Field::Username => &mut self.username,
            Field::Password => &mut self.password,
        }
    }

    fn field_line(&self, label: &str, field: Field) -> Line<'static> {
        let value = match field {
            Field::Username => self.username.clone(),
            Field::Password => "•".repeat(self.password.chars().count()),
        };
        let focused = self.focus == field;
        let label_style = if focused {
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        let cursor = if focused { "▌" } else { "" };

        Line::from(vec![
            Span::styled(format!("{:<10}", label), label_style),
            Span::raw(value),
            Span::styled(cursor, Style::default().fg(Color::Green)),
        ])
    }
}

impl Widget for &LoginScreen {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let width = area.width.min(60);
        let height = area.height.min(9);
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(height),
                Constraint::Min(0),
            ])
            .split(area);
        let horizontal = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(width),
                Constraint::Min(0),
            ])
            .split(vertical[1]);
        let form_area = horizontal[1];

        let block = Block::default()
            .borders(Borders::ALL)
            .title("🔐 duochat login")
            .style(Style::default().fg(Color::Cyan));
        let inner = block.inner(form_area);
        block.render(form_area, buf);

        let mut lines = vec![
            self.field_line("Username", Field::Username),
            Line::from(""),
            self.field_line("Password", Field::Password),
            Line::from(""),
        ];
        if let Some((text, color)) = &self.message {
            lines.push(Line::from(Span::styled(text.clone(), Style::default().fg(*color))));
        }
        lines.push(Line::from(Span::styled(
            "Tab switch field · Enter log in · Esc quit",
            Style::default().fg(Color::DarkGray),
        )));

        for (i, line) in lines.iter().enumerate() {
            if i < inner.height as usize {
                buf.set_line(inner.x, inner.y + i as u16, line, inner.width);
            }
        }
    }
}
