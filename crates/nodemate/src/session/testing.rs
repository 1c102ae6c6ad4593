//! In-memory collaborators for session tests.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{ChatResponse, ChatStream, LLMError, LLMProvider, Message, Provider};
use crate::npm::{PackageInfo, PackageSearch, SearchError, SearchResult};
use crate::ui::{InputEvent, LineInput, Presenter, ProgressOutcome};

/// Scripted reply for one provider call.
pub enum Reply {
    Text(&'static str),
    Fragments(Vec<&'static str>),
    /// Fragments followed by a mid-stream failure.
    Broken(Vec<&'static str>),
    Fail,
    /// The request exceeds its deadline.
    Slow,
}

/// Provider answering from a script and recording each request.
pub struct FakeProvider {
    pub model: String,
    pub replies: Mutex<VecDeque<Reply>>,
    pub requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl FakeProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            model: Provider::OpenAI.descriptor().default_model.to_string(),
            replies: Mutex::new(replies.into()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn next(&self, messages: &[Message]) -> Reply {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Fail)
    }
}

fn transport_error() -> LLMError {
    LLMError::Transport {
        provider: "OpenAI",
        message: "connection reset".to_string(),
    }
}

#[async_trait]
impl LLMProvider for FakeProvider {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: &str) -> Result<(), LLMError> {
        if Provider::OpenAI.descriptor().supports(model) {
            self.model = model.to_string();
            Ok(())
        } else {
            Err(LLMError::UnsupportedModel {
                provider: "OpenAI",
                model: model.to_string(),
            })
        }
    }

    async fn chat(
        &self,
        messages: &[Message],
        _system_prompt: Option<&str>,
        _temperature: f32,
    ) -> Result<ChatResponse, LLMError> {
        match self.next(messages) {
            Reply::Text(text) => Ok(ChatResponse {
                content: text.to_string(),
                usage: None,
            }),
            Reply::Fragments(parts) => Ok(ChatResponse {
                content: parts.concat(),
                usage: None,
            }),
            Reply::Broken(_) | Reply::Fail => Err(transport_error()),
            Reply::Slow => Err(LLMError::Timeout { provider: "OpenAI" }),
        }
    }

    async fn stream(
        &self,
        messages: &[Message],
        _system_prompt: Option<&str>,
        _temperature: f32,
    ) -> Result<ChatStream, LLMError> {
        let items: Vec<Result<String, LLMError>> = match self.next(messages) {
            Reply::Text(text) => vec![Ok(text.to_string())],
            Reply::Fragments(parts) => parts.into_iter().map(|p| Ok(p.to_string())).collect(),
            Reply::Broken(parts) => parts
                .into_iter()
                .map(|p| Ok(p.to_string()))
                .chain(std::iter::once(Err(LLMError::StreamInterrupted {
                    provider: "OpenAI",
                })))
                .collect(),
            Reply::Fail => return Err(transport_error()),
            Reply::Slow => return Err(LLMError::Timeout { provider: "OpenAI" }),
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn validate_key(&self) -> bool {
        true
    }
}

/// Search returning fixed packages and recording calls.
#[derive(Default)]
pub struct FakeSearch {
    pub packages: Vec<PackageInfo>,
    pub calls: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl PackageSearch for FakeSearch {
    async fn search_packages(&self, query: &str, limit: usize) -> Result<SearchResult, SearchError> {
        self.calls.lock().unwrap().push((query.to_string(), limit));
        Ok(SearchResult {
            packages: self.packages.clone(),
            query: query.to_string(),
            total: self.packages.len() as u64,
        })
    }
}

/// Presenter that records every call as a tagged line.
#[derive(Clone, Default)]
pub struct RecordingPresenter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl RecordingPresenter {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }
}

impl Presenter for RecordingPresenter {
    fn info(&mut self, message: &str) {
        self.record(format!("info: {message}"));
    }

    fn success(&mut self, message: &str) {
        self.record(format!("success: {message}"));
    }

    fn warning(&mut self, message: &str) {
        self.record(format!("warning: {message}"));
    }

    fn error(&mut self, message: &str) {
        self.record(format!("error: {message}"));
    }

    fn plain(&mut self, text: &str) {
        self.record(format!("plain: {text}"));
    }

    fn assistant(&mut self, text: &str) {
        self.record(format!("assistant: {text}"));
    }

    fn fragment(&mut self, text: &str) {
        self.record(format!("fragment: {text}"));
    }

    fn end_fragments(&mut self) {
        self.record("end_fragments".to_string());
    }

    fn packages(&mut self, packages: &[PackageInfo]) {
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        self.record(format!("packages: {}", names.join(",")));
    }

    fn commands(&mut self, commands: &[(&str, &str)]) {
        self.record(format!("commands: {}", commands.len()));
    }

    fn clear_screen(&mut self) {
        self.record("clear_screen".to_string());
    }

    fn start_progress(&mut self, message: &str) {
        self.record(format!("progress: {message}"));
    }

    fn finish_progress(&mut self, outcome: ProgressOutcome) {
        self.record(format!("finish: {outcome:?}"));
    }
}

/// Input replaying a fixed sequence, then EOF.
pub struct ScriptedInput(pub VecDeque<InputEvent>);

impl ScriptedInput {
    pub fn lines(lines: &[&str]) -> Self {
        Self(
            lines
                .iter()
                .map(|l| InputEvent::Line(l.to_string()))
                .collect(),
        )
    }
}

#[async_trait(?Send)]
impl LineInput for ScriptedInput {
    async fn read_line(&mut self) -> io::Result<InputEvent> {
        Ok(self.0.pop_front().unwrap_or(InputEvent::Eof))
    }
}

pub fn package(name: &str) -> PackageInfo {
    PackageInfo {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        description: "test package".to_string(),
        weekly_downloads: 1000,
        github_stars: Some(10),
        last_publish: None,
        maintainers: vec![],
        license: "MIT".to_string(),
        has_types: false,
        homepage: None,
        repository: None,
    }
}
