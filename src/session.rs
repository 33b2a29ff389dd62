use std::path::PathBuf;
use uuid::Uuid;

use crate::events::{Message, Provider, Voice};

/// In-memory chat state for one interactive session.
///
/// `messages` is the display transcript and grows without bound.
/// `chat_session` only ever receives committed (user, assistant) pairs and is
/// what the provider sees, through [`SessionState::history_window`].
#[derive(Debug, Clone)]
pub struct SessionState {
    id: Uuid,
    messages: Vec<Message>,
    chat_session: Vec<Message>,
    pub provider: Provider,
    pub model: String,
    pub tts_enabled: bool,
    pub voice: Voice,
    topics: Vec<String>,
    last_speech: Option<PathBuf>,
}

impl SessionState {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
            chat_session: Vec::new(),
            provider,
            model: model.into(),
            tts_enabled: false,
            voice: Voice::default(),
            topics: Vec::new(),
            last_speech: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn chat_session(&self) -> &[Message] {
        &self.chat_session
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn last_speech(&self) -> Option<&PathBuf> {
        self.last_speech.as_ref()
    }

    /// Most recent `limit` entries of the provider-facing history
    pub fn history_window(&self, limit: usize) -> &[Message] {
        let start = self.chat_session.len().saturating_sub(limit);
        &self.chat_session[start..]
    }

    /// Number of turns committed to the provider-facing history
    pub fn completed_turns(&self) -> usize {
        self.chat_session.len() / 2
    }

    /// Start a new chat. Provider, model and speech settings survive.
    pub fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.messages.clear();
        self.chat_session.clear();
        self.topics.clear();
    }

    /// Switch provider and model together. Past history is untouched.
    pub fn select(&mut self, provider: Provider, model: impl Into<String>) {
        self.provider = provider;
        self.model = model.into();
    }

    pub(crate) fn push_display(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Record a finished turn in both the transcript and the history
    pub(crate) fn commit_turn(&mut self, user: Message, assistant: Message) {
        self.messages.push(assistant.clone());
        self.chat_session.push(user);
        self.chat_session.push(assistant);
    }

    /// Returns true when the topic was not seen before
    pub(crate) fn add_topic(&mut self, topic: String) -> bool {
        if self.topics.contains(&topic) {
            return false;
        }
        self.topics.push(topic);
        true
    }

    pub(crate) fn set_last_speech(&mut self, path: PathBuf) {
        self.last_speech = Some(path);
    }
}
