//! Conversation session controller.
//!
//! A turn runs in three steps so the caller can render between fragments:
//! [`ConversationController::begin_turn`] records the user message and opens
//! the provider stream, [`PendingTurn::next_fragment`] pulls one fragment at a
//! time, and [`ConversationController::finish_turn`] commits the exchange.
//! [`ConversationController::handle_turn`] drives all three with a render
//! callback.

use anyhow::Context;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, clamp_history_window};
use crate::error::ChatError;
use crate::events::{Message, Provider};
use crate::llm::{ProviderSet, TextStream};
use crate::session::SessionState;
use crate::speech::{OpenAiSpeech, SpeechSynthesizer, Transcriber};
use crate::topic::extract_topic;

const SPEECH_FILE: &str = "tts.mp3";
const RECORDING_FILE: &str = "recorded_audio.wav";

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Entries of `chat_session` sent with each turn
    pub history_window: usize,
    /// Directory for synthesized speech
    pub speech_dir: PathBuf,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            history_window: clamp_history_window(config.history_window),
            speech_dir: config.speech_dir.clone(),
        }
    }
}

/// A turn whose response is still streaming
pub struct PendingTurn {
    user: Message,
    provider: Provider,
    stream: TextStream,
    response: String,
    fragments: usize,
}

impl PendingTurn {
    /// Await the next fragment and append it to the running response.
    /// `None` once the provider closes the stream.
    pub async fn next_fragment(&mut self) -> Option<anyhow::Result<String>> {
        let item = self.stream.next().await?;
        if let Ok(fragment) = &item {
            self.response.push_str(fragment);
            self.fragments += 1;
        }
        Some(item)
    }

    /// Response text received so far
    pub fn text(&self) -> &str {
        &self.response
    }
}

/// What a committed turn produced
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub response: String,
    pub topic: Option<String>,
    pub speech: Option<PathBuf>,
}

pub struct ConversationController {
    providers: ProviderSet,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    transcriber: Arc<dyn Transcriber>,
    settings: ControllerSettings,
}

impl ConversationController {
    pub fn new(
        providers: ProviderSet,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transcriber: Arc<dyn Transcriber>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            providers,
            synthesizer,
            transcriber,
            settings,
        }
    }

    /// HTTP-backed providers and OpenAI speech, as configured
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let speech = Arc::new(OpenAiSpeech::from_config(config)?);
        Ok(Self::new(
            ProviderSet::from_config(config)?,
            speech.clone(),
            speech,
            ControllerSettings::from_config(config),
        ))
    }

    /// Record the user message and open the provider stream.
    ///
    /// The user message is shown even when the provider refuses the request;
    /// nothing reaches `chat_session` until [`Self::finish_turn`].
    pub async fn begin_turn(
        &self,
        session: &mut SessionState,
        input: &str,
    ) -> Result<PendingTurn, ChatError> {
        if input.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }
        if session.model.trim().is_empty() {
            return Err(ChatError::UnknownModel {
                provider: session.provider,
                model: session.model.clone(),
            });
        }

        let user = Message::user(input);
        session.push_display(user.clone());

        let mut outgoing = session.history_window(self.settings.history_window).to_vec();
        outgoing.push(user.clone());

        let provider = session.provider;
        info!(
            session = %session.id(),
            %provider,
            model = %session.model,
            history = outgoing.len() - 1,
            "turn started"
        );

        let stream = self
            .providers
            .get(provider)
            .stream_completion(&session.model, &outgoing)
            .await
            .map_err(|e| {
                warn!(session = %session.id(), %provider, error = %e, "provider refused turn");
                ChatError::Provider(format!("{:#}", e))
            })?;

        Ok(PendingTurn {
            user,
            provider,
            stream,
            response: String::new(),
            fragments: 0,
        })
    }

    /// Commit a fully streamed turn, derive its topic and speak it if enabled.
    ///
    /// The turn is committed before speech runs; a speech failure is returned
    /// as an error but leaves the turn in place.
    pub async fn finish_turn(
        &self,
        session: &mut SessionState,
        pending: PendingTurn,
    ) -> Result<TurnOutcome, ChatError> {
        let PendingTurn {
            user,
            response,
            fragments,
            ..
        } = pending;

        let topic = extract_topic(user.content(), &response);
        session.commit_turn(user, Message::assistant(response.clone()));
        if let Some(topic) = &topic {
            session.add_topic(topic.clone());
        }

        info!(
            session = %session.id(),
            fragments,
            chars = response.len(),
            turns = session.completed_turns(),
            "turn committed"
        );

        let speech = if session.tts_enabled {
            Some(self.speak(session, &response).await?)
        } else {
            None
        };

        Ok(TurnOutcome {
            response,
            topic,
            speech,
        })
    }

    /// Abandon a turn whose stream failed.
    ///
    /// Text already rendered stays in the transcript as a partial assistant
    /// message; the provider-facing history is left untouched.
    pub fn abort_turn(
        &self,
        session: &mut SessionState,
        pending: PendingTurn,
        error: anyhow::Error,
    ) -> ChatError {
        warn!(
            session = %session.id(),
            provider = %pending.provider,
            fragments = pending.fragments,
            error = %error,
            "turn aborted mid-stream"
        );
        if !pending.response.is_empty() {
            session.push_display(Message::assistant(pending.response));
        }
        ChatError::Stream(format!("{:#}", error))
    }

    /// Run a whole turn, calling `render` with the running response after
    /// every fragment.
    pub async fn handle_turn<F>(
        &self,
        session: &mut SessionState,
        input: &str,
        mut render: F,
    ) -> Result<TurnOutcome, ChatError>
    where
        F: FnMut(&str),
    {
        let mut pending = self.begin_turn(session, input).await?;

        while let Some(fragment) = pending.next_fragment().await {
            match fragment {
                Ok(_) => render(pending.text()),
                Err(e) => return Err(self.abort_turn(session, pending, e)),
            }
        }

        self.finish_turn(session, pending).await
    }

    /// Transcribe recorded audio. `None` when nothing intelligible was said.
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<Option<String>, ChatError> {
        let transcript = self
            .transcriber
            .transcribe(audio, RECORDING_FILE)
            .await
            .map_err(|e| ChatError::Transcription(format!("{:#}", e)))?;

        let transcript = transcript.trim();
        if transcript.is_empty() {
            info!("empty transcription, no turn");
            return Ok(None);
        }
        Ok(Some(transcript.to_string()))
    }

    /// Voice input: transcribe, then run a normal turn on the text
    pub async fn handle_voice_turn<F>(
        &self,
        session: &mut SessionState,
        audio: Vec<u8>,
        render: F,
    ) -> Result<Option<TurnOutcome>, ChatError>
    where
        F: FnMut(&str),
    {
        match self.transcribe(audio).await? {
            Some(transcript) => self.handle_turn(session, &transcript, render).await.map(Some),
            None => Ok(None),
        }
    }

    /// Synthesize `text` with the session voice into the speech file
    pub async fn speak(&self, session: &mut SessionState, text: &str) -> Result<PathBuf, ChatError> {
        let audio = self
            .synthesizer
            .synthesize(text, session.voice)
            .await
            .map_err(|e| ChatError::Speech(format!("{:#}", e)))?;

        let path = self.settings.speech_dir.join(SPEECH_FILE);
        write_speech(&path, &audio)
            .await
            .map_err(|e| ChatError::Speech(format!("{:#}", e)))?;

        session.set_last_speech(path.clone());
        info!(session = %session.id(), bytes = audio.len(), path = %path.display(), "speech written");
        Ok(path)
    }
}

async fn write_speech(path: &std::path::Path, audio: &[u8]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    tokio::fs::write(path, audio)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Role, Voice};
    use crate::llm::CompletionProvider;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;

    /// Replies with fixed fragments and records every request it receives
    struct ScriptedProvider {
        fragments: Vec<&'static str>,
        fail_after: Option<usize>,
        refuse: bool,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn replying(fragments: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                fragments,
                fail_after: None,
                refuse: false,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing_after(fragments: Vec<&'static str>, fail_after: usize) -> Arc<Self> {
            Arc::new(Self {
                fragments,
                fail_after: Some(fail_after),
                refuse: false,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn refusing() -> Arc<Self> {
            Arc::new(Self {
                fragments: Vec::new(),
                fail_after: None,
                refuse: true,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<Vec<Message>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn stream_completion(&self, _model: &str, messages: &[Message]) -> Result<TextStream> {
            self.requests.lock().unwrap().push(messages.to_vec());
            if self.refuse {
                return Err(anyhow!("401 unauthorized"));
            }

            let mut items: Vec<Result<String>> =
                self.fragments.iter().map(|f| Ok(f.to_string())).collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(anyhow!("connection reset")));
            }
            Ok(Box::pin(stream::iter(items)))
        }
    }

    #[derive(Default)]
    struct FakeSpeech {
        transcript: String,
        voices: Mutex<Vec<Voice>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSpeech {
        async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>> {
            self.voices.lock().unwrap().push(voice);
            Ok(format!("mp3:{text}").into_bytes())
        }
    }

    #[async_trait]
    impl Transcriber for FakeSpeech {
        async fn transcribe(&self, _audio: Vec<u8>, _file_name: &str) -> Result<String> {
            Ok(self.transcript.clone())
        }
    }

    /// Speech backend that is always down
    struct BrokenSpeech;

    #[async_trait]
    impl SpeechSynthesizer for BrokenSpeech {
        async fn synthesize(&self, _text: &str, _voice: Voice) -> Result<Vec<u8>> {
            Err(anyhow!("tts down"))
        }
    }

    #[async_trait]
    impl Transcriber for BrokenSpeech {
        async fn transcribe(&self, _audio: Vec<u8>, _file_name: &str) -> Result<String> {
            Err(anyhow!("whisper down"))
        }
    }

    fn broken_speech_controller(openai: Arc<ScriptedProvider>, speech_dir: PathBuf) -> ConversationController {
        ConversationController::new(
            ProviderSet::new(openai, ScriptedProvider::replying(vec!["unused"])),
            Arc::new(BrokenSpeech),
            Arc::new(BrokenSpeech),
            ControllerSettings {
                history_window: 20,
                speech_dir,
            },
        )
    }

    fn controller_with(
        openai: Arc<ScriptedProvider>,
        anthropic: Arc<ScriptedProvider>,
        speech: Arc<FakeSpeech>,
        speech_dir: PathBuf,
    ) -> ConversationController {
        ConversationController::new(
            ProviderSet::new(openai, anthropic),
            speech.clone(),
            speech,
            ControllerSettings {
                history_window: 20,
                speech_dir,
            },
        )
    }

    fn controller(openai: Arc<ScriptedProvider>) -> ConversationController {
        controller_with(
            openai,
            ScriptedProvider::replying(vec!["unused"]),
            Arc::new(FakeSpeech::default()),
            PathBuf::from("/nonexistent"),
        )
    }

    fn session() -> SessionState {
        SessionState::new(Provider::OpenAi, "gpt-4o-mini")
    }

    #[tokio::test]
    async fn turn_renders_every_fragment_then_commits() {
        let provider = ScriptedProvider::replying(vec!["world", " peace", " now"]);
        let controller = controller(provider.clone());
        let mut session = session();

        let mut rendered = Vec::new();
        let outcome = controller
            .handle_turn(&mut session, "hello world", |text| rendered.push(text.to_string()))
            .await
            .unwrap();

        assert_eq!(rendered, vec!["world", "world peace", "world peace now"]);
        assert_eq!(outcome.response, "world peace now");
        assert_eq!(outcome.topic.as_deref(), Some("world"));
        assert_eq!(outcome.speech, None);

        assert_eq!(
            session.messages(),
            [Message::user("hello world"), Message::assistant("world peace now")]
        );
        assert_eq!(session.chat_session(), session.messages());
        assert_eq!(session.topics(), ["world"]);

        let requests = provider.requests();
        assert_eq!(requests, vec![vec![Message::user("hello world")]]);
    }

    #[tokio::test]
    async fn history_window_is_bounded_and_most_recent() {
        let provider = ScriptedProvider::replying(vec!["ok"]);
        let controller = controller(provider.clone());
        let mut session = session();

        for i in 0..25 {
            controller
                .handle_turn(&mut session, &format!("question {i}"), |_| {})
                .await
                .unwrap();

            assert_eq!(session.chat_session().len(), 2 * (i + 1));
            let committed = session.chat_session().len();
            assert_eq!(
                session.chat_session(),
                &session.messages()[session.messages().len() - committed..]
            );
        }

        let requests = provider.requests();
        assert_eq!(requests.len(), 25);
        for (i, request) in requests.iter().enumerate() {
            let history = &request[..request.len() - 1];
            assert!(history.len() <= 20);
            assert_eq!(history.len(), (2 * i).min(20));
            assert_eq!(request.last().unwrap(), &Message::user(format!("question {i}")));
        }

        let last = requests.last().unwrap();
        assert_eq!(last[0], Message::user("question 14"));
        assert_eq!(last[19], Message::assistant("ok"));
        assert_eq!(session.messages().len(), 50);
    }

    #[tokio::test]
    async fn oversized_configured_window_still_sends_at_most_twenty_entries() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let mut config = Config::with_home(home.clone());
        config.history_window = 50;
        config.save().unwrap();

        let config = Config::load_from(home).unwrap();
        let provider = ScriptedProvider::replying(vec!["ok"]);
        let controller = ConversationController::new(
            ProviderSet::new(provider.clone(), ScriptedProvider::replying(vec!["unused"])),
            Arc::new(FakeSpeech::default()),
            Arc::new(FakeSpeech::default()),
            ControllerSettings::from_config(&config),
        );
        let mut session = session();

        for i in 0..30 {
            controller
                .handle_turn(&mut session, &format!("question {i}"), |_| {})
                .await
                .unwrap();
        }

        let longest = provider
            .requests()
            .iter()
            .map(|request| request.len() - 1)
            .max()
            .unwrap();
        assert_eq!(longest, 20);
        assert_eq!(session.chat_session().len(), 60);
    }

    #[tokio::test]
    async fn odd_window_starts_on_a_user_message() {
        let provider = ScriptedProvider::replying(vec!["ok"]);
        let mut config = Config::with_home(PathBuf::from("/nonexistent"));
        config.history_window = 3;
        let controller = ConversationController::new(
            ProviderSet::new(provider.clone(), ScriptedProvider::replying(vec!["unused"])),
            Arc::new(FakeSpeech::default()),
            Arc::new(FakeSpeech::default()),
            ControllerSettings::from_config(&config),
        );
        let mut session = session();

        for i in 0..4 {
            controller
                .handle_turn(&mut session, &format!("question {i}"), |_| {})
                .await
                .unwrap();
        }

        let last = provider.requests().pop().unwrap();
        assert_eq!(last.len(), 3);
        assert_eq!(last[0], Message::user("question 2"));
    }

    #[tokio::test]
    async fn switching_provider_changes_only_the_next_dispatch() {
        let openai = ScriptedProvider::replying(vec!["from openai"]);
        let anthropic = ScriptedProvider::replying(vec!["from anthropic"]);
        let controller = controller_with(
            openai.clone(),
            anthropic.clone(),
            Arc::new(FakeSpeech::default()),
            PathBuf::from("/nonexistent"),
        );
        let mut session = session();

        controller.handle_turn(&mut session, "first", |_| {}).await.unwrap();
        let before = session.chat_session().to_vec();

        session.select(Provider::Anthropic, "claude-3-haiku-20240307");
        assert_eq!(session.chat_session(), before.as_slice());

        let outcome = controller.handle_turn(&mut session, "second", |_| {}).await.unwrap();
        assert_eq!(outcome.response, "from anthropic");
        assert_eq!(&session.chat_session()[..2], before.as_slice());

        assert_eq!(openai.requests().len(), 1);
        let anthropic_requests = anthropic.requests();
        assert_eq!(anthropic_requests.len(), 1);
        assert_eq!(anthropic_requests[0][..2], before[..]);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_rendered_text_out_of_history() {
        let provider = ScriptedProvider::failing_after(vec!["par", "tial", "never"], 2);
        let controller = controller(provider);
        let mut session = session();

        let mut rendered = Vec::new();
        let err = controller
            .handle_turn(&mut session, "tell me", |text| rendered.push(text.to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Stream(ref msg) if msg.contains("connection reset")));
        assert_eq!(rendered.last().map(String::as_str), Some("partial"));
        assert_eq!(
            session.messages(),
            [Message::user("tell me"), Message::assistant("partial")]
        );
        assert!(session.chat_session().is_empty());
        assert!(session.topics().is_empty());
    }

    #[tokio::test]
    async fn refused_request_records_only_the_user_message() {
        let controller = controller(ScriptedProvider::refusing());
        let mut session = session();

        let err = controller.handle_turn(&mut session, "hi", |_| {}).await.unwrap_err();

        assert!(matches!(err, ChatError::Provider(ref msg) if msg.contains("401")));
        assert_eq!(session.messages(), [Message::user("hi")]);
        assert!(session.chat_session().is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_side_effects() {
        let provider = ScriptedProvider::replying(vec!["x"]);
        let controller = controller(provider.clone());
        let mut session = session();

        let err = controller.handle_turn(&mut session, "   ", |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyInput));
        assert!(session.messages().is_empty());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn repeated_topic_is_recorded_once() {
        let provider = ScriptedProvider::replying(vec!["world peace"]);
        let controller = controller(provider);
        let mut session = session();

        controller.handle_turn(&mut session, "hello world", |_| {}).await.unwrap();
        controller.handle_turn(&mut session, "the world", |_| {}).await.unwrap();
        controller.handle_turn(&mut session, "abc", |_| {}).await.unwrap();

        assert_eq!(session.topics(), ["world"]);
        assert_eq!(session.completed_turns(), 3);
    }

    #[tokio::test]
    async fn speech_is_written_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let speech = Arc::new(FakeSpeech::default());
        let controller = controller_with(
            ScriptedProvider::replying(vec!["spoken reply"]),
            ScriptedProvider::replying(vec!["unused"]),
            speech.clone(),
            dir.path().join("audio"),
        );
        let mut session = session();

        let outcome = controller.handle_turn(&mut session, "quiet", |_| {}).await.unwrap();
        assert_eq!(outcome.speech, None);
        assert!(speech.voices.lock().unwrap().is_empty());

        session.tts_enabled = true;
        session.voice = Voice::Shimmer;
        let outcome = controller.handle_turn(&mut session, "loud", |_| {}).await.unwrap();

        let path = outcome.speech.unwrap();
        assert_eq!(path, dir.path().join("audio").join("tts.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"mp3:spoken reply");
        assert_eq!(session.last_speech(), Some(&path));
        assert_eq!(*speech.voices.lock().unwrap(), vec![Voice::Shimmer]);
    }

    #[tokio::test]
    async fn speech_failure_keeps_committed_turn() {
        let dir = tempfile::tempdir().unwrap();
        let controller = broken_speech_controller(
            ScriptedProvider::replying(vec!["world peace"]),
            dir.path().join("audio"),
        );
        let mut session = session();
        session.tts_enabled = true;

        let err = controller
            .handle_turn(&mut session, "hello world", |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Speech(ref msg) if msg.contains("tts down")));
        assert_eq!(
            session.chat_session(),
            [Message::user("hello world"), Message::assistant("world peace")]
        );
        assert_eq!(session.messages(), session.chat_session());
        assert_eq!(session.topics(), ["world"]);
        assert_eq!(session.last_speech(), None);
        assert!(!dir.path().join("audio").join("tts.mp3").exists());
    }

    #[tokio::test]
    async fn failed_transcription_creates_no_turn() {
        let provider = ScriptedProvider::replying(vec!["reply"]);
        let controller = broken_speech_controller(provider.clone(), PathBuf::from("/nonexistent"));
        let mut session = session();

        let err = controller
            .handle_voice_turn(&mut session, vec![0u8; 16], |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Transcription(ref msg) if msg.contains("whisper down")));
        assert!(session.messages().is_empty());
        assert!(session.chat_session().is_empty());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn empty_transcription_creates_no_turn() {
        let provider = ScriptedProvider::replying(vec!["reply"]);
        let speech = Arc::new(FakeSpeech {
            transcript: "  ".to_string(),
            ..Default::default()
        });
        let controller = controller_with(
            provider.clone(),
            ScriptedProvider::replying(vec!["unused"]),
            speech,
            PathBuf::from("/nonexistent"),
        );
        let mut session = session();

        let outcome = controller
            .handle_voice_turn(&mut session, vec![0u8; 16], |_| {})
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert!(session.messages().is_empty());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn transcribed_turn_is_treated_like_typed_text() {
        let speech = Arc::new(FakeSpeech {
            transcript: " what is rust \n".to_string(),
            ..Default::default()
        });
        let controller = controller_with(
            ScriptedProvider::replying(vec!["rust is a language"]),
            ScriptedProvider::replying(vec!["unused"]),
            speech,
            PathBuf::from("/nonexistent"),
        );
        let mut session = session();

        let outcome = controller
            .handle_voice_turn(&mut session, vec![1, 2, 3], |_| {})
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.response, "rust is a language");
        assert_eq!(session.chat_session()[0], Message::user("what is rust"));
        assert_eq!(session.chat_session()[0].role(), Role::User);
    }
}
