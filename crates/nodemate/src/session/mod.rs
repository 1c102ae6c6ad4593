//! Interactive chat session.
//!
//! The session owns the conversation history and the active provider. Each
//! line of input is either a slash command, handed to the
//! [`CommandDispatcher`], or a chat turn sent to the provider. Turn errors are
//! reported and the loop continues; only `/exit` or end of input stops it.

mod commands;
mod history;
#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use commands::{
    COMMANDS, Command, CommandContext, CommandDispatcher, CommandOutcome, SEARCH_LIMIT,
};
pub use history::{History, MAX_HISTORY};

use crate::config::{Config, ConfigSource};
use crate::context::{ContextDetection, ProjectContext, ToolProbe, build_main_prompt};
use crate::llm::{DEFAULT_TEMPERATURE, LLMError, LLMProvider, Message, ProviderFactory};
use crate::npm::PackageSearch;
use crate::ui::{InputEvent, LineInput, Presenter, ProgressOutcome};

pub const CHAT_WELCOME: &str = "
NodeMate Chat Mode

I'm here to help with your Node.js package management needs.
Ask me anything about packages, dependencies, or get recommendations!

Available commands:
• /help - Show all commands
• /config - View configuration
• /exit - Exit chat mode

What can I help you with today?
";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to create provider: {0}")]
    Provider(#[from] LLMError),

    #[error("No API key configured for {0}. Please run: nodemate config")]
    MissingApiKey(String),

    #[error("failed to read input: {0}")]
    Input(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    AwaitingInput,
    ProcessingCommand,
    ProcessingChatTurn,
    Terminated,
}

/// Collaborators for [`ChatSession::new`].
pub struct SessionParts {
    pub config: Config,
    pub provider: Box<dyn LLMProvider>,
    pub context: ProjectContext,
    pub search: Arc<dyn PackageSearch>,
    pub presenter: Box<dyn Presenter>,
}

pub struct ChatSession {
    config: Config,
    provider: Box<dyn LLMProvider>,
    context: ProjectContext,
    system_prompt: String,
    history: History,
    dispatcher: CommandDispatcher,
    presenter: Box<dyn Presenter>,
    state: SessionState,
}

impl ChatSession {
    /// Resolve the provider from configuration, detect the project at
    /// `project_path`, and build the system prompt.
    pub async fn initialize(
        config: Config,
        project_path: &Path,
        probe: &dyn ToolProbe,
        search: Arc<dyn PackageSearch>,
        mut presenter: Box<dyn Presenter>,
    ) -> Result<Self, SessionError> {
        debug!(state = ?SessionState::Initializing, "session starting");

        let provider_id = config.provider.id();
        let api_key = config
            .api_key(None)
            .ok_or_else(|| SessionError::MissingApiKey(provider_id.to_string()))?;
        let model = config.model(None);
        let provider = ProviderFactory::create_with(
            provider_id,
            &api_key,
            Some(&model),
            &config.client_options(),
        )?;

        presenter.start_progress("Analyzing project context...");
        let detection = ContextDetection::detect(project_path, probe).await;
        match &detection {
            ContextDetection::Detected(_) => presenter
                .finish_progress(ProgressOutcome::Success("Project context detected".to_string())),
            ContextDetection::Defaulted { reason, .. } => {
                presenter.finish_progress(ProgressOutcome::Warning(
                    "Could not detect project context - using defaults".to_string(),
                ));
                debug!(%reason, "context defaulted");
            }
        }

        let detected = detection.is_detected();
        let mut context = detection.into_context();
        if let Some(manager) = config.preferences.package_manager.fixed() {
            context.package_manager = manager;
        }
        if config.preferences.show_thinking {
            presenter.plain(&context.summary());
            // A defaulted context has nothing meaningful to report.
            if detected {
                for issue in context.issues() {
                    presenter.warning(&issue);
                }
            }
        }

        Ok(Self::new(SessionParts {
            config,
            provider,
            context,
            search,
            presenter,
        }))
    }

    pub fn new(parts: SessionParts) -> Self {
        let system_prompt = build_main_prompt(&parts.context);
        info!(
            provider = %parts.provider.provider(),
            model = parts.provider.model(),
            framework = ?parts.context.framework,
            "chat session ready"
        );

        Self {
            config: parts.config,
            provider: parts.provider,
            context: parts.context,
            system_prompt,
            history: History::new(),
            dispatcher: CommandDispatcher::new(parts.search),
            presenter: parts.presenter,
            state: SessionState::AwaitingInput,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn provider(&self) -> &dyn LLMProvider {
        self.provider.as_ref()
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Read and handle input until `/exit` or end of input.
    pub async fn run(&mut self, input: &mut dyn LineInput) -> Result<(), SessionError> {
        self.presenter.plain(CHAT_WELCOME);

        while self.state != SessionState::Terminated {
            match input.read_line().await? {
                InputEvent::Line(line) => self.handle_input(&line).await,
                InputEvent::Interrupted => self.presenter.info("Type /exit to quit"),
                InputEvent::Eof => self.transition(SessionState::Terminated),
            }
        }

        self.presenter.info("Thanks for using NodeMate!");
        Ok(())
    }

    /// Handle one line of user input.
    pub async fn handle_input(&mut self, line: &str) {
        let input = line.trim();
        if input.is_empty() {
            self.presenter.warning("Please enter a message");
            return;
        }

        if input.starts_with('/') {
            self.transition(SessionState::ProcessingCommand);
            self.run_command(input).await;
        } else {
            self.transition(SessionState::ProcessingChatTurn);
            self.chat_turn(input).await;
        }

        if self.state != SessionState::Terminated {
            self.transition(SessionState::AwaitingInput);
        }
    }

    async fn run_command(&mut self, input: &str) {
        let ctx = CommandContext {
            config: &self.config,
            history: &self.history,
            provider: self.provider.as_ref(),
            welcome: CHAT_WELCOME,
        };
        let outcome = self
            .dispatcher
            .dispatch(Command::parse(input), ctx, self.presenter.as_mut())
            .await;

        match outcome {
            CommandOutcome::Continue => {}
            CommandOutcome::ClearHistory => self.history.clear(),
            CommandOutcome::SwitchModel(model) => match self.provider.set_model(&model) {
                Ok(()) => self.presenter.success(&format!("Switched to {model}")),
                Err(e) => self.presenter.error(&e.to_string()),
            },
            CommandOutcome::Exit => self.transition(SessionState::Terminated),
        }
    }

    async fn chat_turn(&mut self, text: &str) {
        let checkpoint = self.history.len();
        self.history.push(Message::user(text));

        let reply = if self.config.preferences.stream_responses {
            self.streamed_reply().await
        } else {
            self.complete_reply().await
        };

        match reply {
            Ok(content) => {
                self.history.push(Message::assistant(content));
                self.history.trim();
            }
            Err(e) => {
                // History only holds completed exchanges.
                self.history.truncate(checkpoint);
                warn!(error = %e, "chat turn failed");
                self.presenter.error(&format!("AI Error: {e}"));
                if e.is_timeout() {
                    self.presenter
                        .info("The provider is responding slowly. Try again in a moment.");
                }
            }
        }
    }

    async fn complete_reply(&mut self) -> Result<String, LLMError> {
        let show_thinking = self.config.preferences.show_thinking;
        if show_thinking {
            self.presenter.start_progress("NodeMate is thinking...");
        }

        let result = self
            .provider
            .chat(
                self.history.messages(),
                Some(&self.system_prompt),
                DEFAULT_TEMPERATURE,
            )
            .await;

        match result {
            Ok(response) => {
                if show_thinking {
                    self.presenter.finish_progress(ProgressOutcome::Cleared);
                }
                if let Some(usage) = &response.usage {
                    debug!(
                        prompt = usage.prompt_tokens,
                        completion = usage.completion_tokens,
                        total = usage.total_tokens,
                        "token usage"
                    );
                }
                self.presenter.assistant(&response.content);
                Ok(response.content)
            }
            Err(e) => {
                if show_thinking {
                    self.presenter.finish_progress(ProgressOutcome::Failure(
                        "Error getting AI response".to_string(),
                    ));
                }
                Err(e)
            }
        }
    }

    async fn streamed_reply(&mut self) -> Result<String, LLMError> {
        let mut stream = self
            .provider
            .stream(
                self.history.messages(),
                Some(&self.system_prompt),
                DEFAULT_TEMPERATURE,
            )
            .await?;

        let mut content = String::new();
        let mut failure = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    self.presenter.fragment(&fragment);
                    content.push_str(&fragment);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if !content.is_empty() {
            self.presenter.end_fragments();
        }

        match failure {
            Some(e) => Err(e),
            None if content.is_empty() => Err(LLMError::unsupported_content(
                self.provider.provider().label(),
                "empty streamed reply",
            )),
            None => Ok(content),
        }
    }
}
