//! Conversation history display component

use crate::events::{Message, Role};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

pub const EMPTY_HISTORY: &str = "No conversation history.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// Local status line shown between messages; never sent to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Number of transcript messages that precede this notice
    pub after: usize,
    pub kind: NoticeKind,
    pub text: String,
}

/// Notices layered over the session transcript
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    notices: Vec<Notice>,
    max_notices: usize,
}

impl ConversationHistory {
    pub fn new(max_notices: usize) -> Self {
        Self {
            notices: Vec::new(),
            max_notices,
        }
    }

    pub fn add_notice(&mut self, after: usize, kind: NoticeKind, text: impl Into<String>) {
        self.notices.push(Notice {
            after,
            kind,
            text: text.into(),
        });

        if self.notices.len() > self.max_notices {
            self.notices.remove(0);
        }
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn clear(&mut self) {
        self.notices.clear();
    }

    /// Build the widget for one frame
    pub fn view<'a>(&'a self, messages: &'a [Message], streaming: Option<&'a str>) -> HistoryView<'a> {
        HistoryView {
            history: self,
            messages,
            streaming,
        }
    }
}

/// Transcript, notices and the in-flight reply, bottom-aligned
pub struct HistoryView<'a> {
    history: &'a ConversationHistory,
    messages: &'a [Message],
    streaming: Option<&'a str>,
}

impl Widget for HistoryView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("💬 Conversation History");

        let inner_area = block.inner(area);
        block.render(area, buf);

        let width = inner_area.width.saturating_sub(2) as usize;
        let mut all_lines: Vec<Line> = Vec::new();

        if self.messages.is_empty() && self.streaming.is_none() {
            all_lines.push(Line::from(vec![Span::styled(
                EMPTY_HISTORY,
                Style::default().fg(Color::Gray),
            )]));
            all_lines.push(Line::from(vec![Span::raw("")]));
        }

        let mut notices = self.history.notices.iter().peekable();
        for (index, message) in self.messages.iter().enumerate() {
            while let Some(notice) = notices.next_if(|n| n.after <= index) {
                all_lines.extend(render_notice(notice, width));
            }
            all_lines.extend(render_message(message, width));
            all_lines.push(Line::from(vec![Span::raw("")]));
        }
        if let Some(text) = self.streaming {
            all_lines.extend(render_streaming_message(text, width));
        }
        for notice in notices {
            all_lines.extend(render_notice(notice, width));
        }

        // Keep the newest lines in view
        let height = inner_area.height as usize;
        let start = all_lines.len().saturating_sub(height);

        for (i, line) in all_lines[start..].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

fn role_header(role: Role) -> Line<'static> {
    let (icon, color) = match role {
        Role::User => ("👤", Color::Blue),
        Role::Assistant => ("🤖", Color::Green),
    };
    Line::from(vec![
        Span::styled(
            format!("{} {} ", icon, role.label()),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled("─".repeat(20), Style::default().fg(Color::DarkGray)),
    ])
}

fn content_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Blue),
        Role::Assistant => Style::default(),
    }
}

fn render_message(message: &Message, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![role_header(message.role())];
    for content_line in wrap_text(message.content(), width) {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(content_line, content_style(message.role())),
        ]));
    }
    lines
}

fn render_streaming_message(text: &str, width: usize) -> Vec<Line<'static>> {
    let mut lines = vec![role_header(Role::Assistant)];

    let content_lines = wrap_text(text, width);
    let last = content_lines.len().saturating_sub(1);
    for (i, content_line) in content_lines.into_iter().enumerate() {
        let cursor = if i == last { "▋" } else { "" };
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::raw(content_line),
            Span::styled(cursor, Style::default().fg(Color::Yellow)),
        ]));
    }
    lines
}

fn render_notice(notice: &Notice, width: usize) -> Vec<Line<'static>> {
    let (prefix, style) = match notice.kind {
        NoticeKind::Info => ("ℹ️ ", Style::default().fg(Color::Yellow)),
        NoticeKind::Error => ("❌ ", Style::default().fg(Color::Red)),
    };

    let mut lines = Vec::new();
    for (i, text) in wrap_text(&notice.text, width).into_iter().enumerate() {
        let lead = if i == 0 { prefix } else { "   " };
        lines.push(Line::from(vec![Span::styled(lead, style), Span::styled(text, style)]));
    }
    lines.push(Line::from(vec![Span::raw("")]));
    lines
}

/// Word-wrap to `width` columns, keeping explicit line breaks
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return text.lines().map(str::to_string).collect();
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        let mut current_width = 0;

        for word in paragraph.split_whitespace() {
            let word_width = word.chars().count();
            if current_width > 0 && current_width + 1 + word_width > width {
                lines.push(std::mem::take(&mut current_line));
                current_width = 0;
            }
            if current_width > 0 {
                current_line.push(' ');
                current_width += 1;
            }
            current_line.push_str(word);
            current_width += word_width;
        }

        lines.push(current_line);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(view: HistoryView<'_>, width: u16, height: u16) -> String {
        let area = Rect::new(0, 0, width, height);
        let mut buf = Buffer::empty(area);
        view.render(area, &mut buf);

        let mut out = String::new();
        for y in 0..height {
            for x in 0..width {
                out.push_str(buf.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn empty_history_shows_placeholder() {
        let history = ConversationHistory::new(10);
        let text = rendered(history.view(&[], None), 40, 6);
        assert!(text.contains(EMPTY_HISTORY));
    }

    #[test]
    fn messages_and_streaming_text_are_drawn() {
        let history = ConversationHistory::new(10);
        let messages = vec![Message::user("hello world")];
        let text = rendered(history.view(&messages, Some("world pea")), 40, 10);

        assert!(text.contains("User"));
        assert!(text.contains("hello world"));
        assert!(text.contains("world pea"));
        assert!(!text.contains(EMPTY_HISTORY));
    }

    #[test]
    fn notices_are_capped() {
        let mut history = ConversationHistory::new(2);
        history.add_notice(0, NoticeKind::Info, "one");
        history.add_notice(0, NoticeKind::Info, "two");
        history.add_notice(1, NoticeKind::Error, "three");

        let texts: Vec<_> = history.notices().iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn wrap_respects_width_and_newlines() {
        assert_eq!(
            wrap_text("one two three\nfour", 7),
            vec!["one two", "three", "four"]
        );
        assert_eq!(wrap_text("", 10), vec![""]);
    }
}
