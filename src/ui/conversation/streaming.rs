use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Widget,
};
use std::time::{Duration, Instant};

/// The reply currently streaming in, if any
#[derive(Clone, Default)]
pub struct StreamingResponse {
    current_response: String,
    is_streaming: bool,
    responder: String,
    fragments: usize,
    started: Option<Instant>,
}

impl StreamingResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start streaming a new response from `responder` (e.g. "OpenAI gpt-4o")
    pub fn start_streaming(&mut self, responder: impl Into<String>) {
        self.is_streaming = true;
        self.current_response.clear();
        self.responder = responder.into();
        self.fragments = 0;
        self.started = Some(Instant::now());
    }

    /// Replace the shown text with the running response
    pub fn update(&mut self, text: &str) {
        self.current_response.clear();
        self.current_response.push_str(text);
        self.fragments += 1;
    }

    /// Stop streaming; returns how long the reply took
    pub fn finish(&mut self) -> Option<Duration> {
        self.is_streaming = false;
        self.current_response.clear();
        self.started.take().map(|started| started.elapsed())
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    /// Text for the history pane while streaming
    pub fn text(&self) -> Option<&str> {
        self.is_streaming.then_some(self.current_response.as_str())
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }
}

impl Widget for StreamingResponse {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if !self.is_streaming || area.height == 0 {
            return;
        }

        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        let dots = match (elapsed.as_millis() / 300) % 4 {
            0 => ".",
            1 => "..",
            2 => "...",
            _ => "   ",
        };

        let indicator = Line::from(vec![
            Span::styled("🤖 ", Style::default().fg(Color::Green)),
            Span::styled(
                format!("{} is responding", self.responder),
                Style::default().fg(Color::Green),
            ),
            Span::styled(dots, Style::default().fg(Color::Yellow)),
            Span::styled(
                format!("  {:.1}s", elapsed.as_secs_f32()),
                Style::default().fg(Color::DarkGray),
            ),
        ]);
        buf.set_line(area.x, area.y, &indicator, area.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_running_text_until_finished() {
        let mut streaming = StreamingResponse::new();
        assert_eq!(streaming.text(), None);

        streaming.start_streaming("OpenAI gpt-4o-mini");
        assert_eq!(streaming.text(), Some(""));

        streaming.update("wor");
        streaming.update("world");
        assert_eq!(streaming.text(), Some("world"));
        assert_eq!(streaming.fragments(), 2);

        assert!(streaming.finish().is_some());
        assert!(!streaming.is_streaming());
        assert_eq!(streaming.text(), None);
    }
}
