//! Slash-command parsing and dispatch.

use std::sync::Arc;

use tracing::{debug, warn};

use super::history::History;
use crate::config::Config;
use crate::llm::{LLMProvider, Role};
use crate::npm::PackageSearch;
use crate::ui::{Presenter, ProgressOutcome};

/// Results shown by `/search`.
pub const SEARCH_LIMIT: usize = 5;

/// Commands shown by `/help`.
pub const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show available commands"),
    ("/clear", "Clear the screen and chat history"),
    ("/exit", "Exit NodeMate"),
    ("/config", "Show current configuration"),
    ("/history", "Show chat history"),
    ("/model [name]", "List models or switch the active one"),
    ("/search <query>", "Search for packages"),
    ("/resolve", "Resolve dependency conflicts"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    Exit,
    Config,
    History,
    Model(Option<String>),
    /// Query may be empty; dispatch reports usage in that case.
    Search(String),
    Resolve,
    Unknown(String),
}

impl Command {
    /// Parse a line starting with `/`.
    pub fn parse(input: &str) -> Self {
        let mut parts = input.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        match name {
            "/help" => Command::Help,
            "/clear" => Command::Clear,
            "/exit" => Command::Exit,
            "/config" => Command::Config,
            "/history" => Command::History,
            "/model" => Command::Model(args.first().map(|m| m.to_string())),
            "/search" => Command::Search(args.join(" ")),
            "/resolve" => Command::Resolve,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// What the session should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    ClearHistory,
    SwitchModel(String),
    Exit,
}

/// Read-only session state a command may inspect.
pub struct CommandContext<'a> {
    pub config: &'a Config,
    pub history: &'a History,
    pub provider: &'a dyn LLMProvider,
    pub welcome: &'a str,
}

pub struct CommandDispatcher {
    search: Arc<dyn PackageSearch>,
}

impl CommandDispatcher {
    pub fn new(search: Arc<dyn PackageSearch>) -> Self {
        Self { search }
    }

    pub async fn dispatch(
        &self,
        command: Command,
        ctx: CommandContext<'_>,
        presenter: &mut dyn Presenter,
    ) -> CommandOutcome {
        debug!(?command, "dispatching command");
        match command {
            Command::Help => {
                presenter.plain("\nAvailable Commands:");
                presenter.commands(COMMANDS);
                CommandOutcome::Continue
            }
            Command::Clear => {
                presenter.clear_screen();
                presenter.plain(ctx.welcome);
                CommandOutcome::ClearHistory
            }
            Command::Exit => CommandOutcome::Exit,
            Command::Config => {
                show_config(&ctx, presenter);
                CommandOutcome::Continue
            }
            Command::History => {
                show_history(ctx.history, presenter);
                CommandOutcome::Continue
            }
            Command::Model(None) => {
                show_models(ctx.provider, presenter);
                CommandOutcome::Continue
            }
            Command::Model(Some(model)) => CommandOutcome::SwitchModel(model),
            Command::Search(query) => {
                self.search(&query, presenter).await;
                CommandOutcome::Continue
            }
            Command::Resolve => {
                presenter.info("Dependency conflict resolution coming soon...");
                CommandOutcome::Continue
            }
            Command::Unknown(name) => {
                presenter.warning(&format!("Unknown command: {name}"));
                presenter.info("Type /help for available commands");
                CommandOutcome::Continue
            }
        }
    }

    async fn search(&self, query: &str, presenter: &mut dyn Presenter) {
        if query.is_empty() {
            presenter.warning("Usage: /search <package-name>");
            return;
        }

        presenter.start_progress(&format!("Searching for \"{query}\"..."));
        match self.search.search_packages(query, SEARCH_LIMIT).await {
            Ok(result) => {
                presenter.finish_progress(ProgressOutcome::Success(format!(
                    "Found {} packages",
                    result.packages.len()
                )));
                if result.packages.is_empty() {
                    presenter.warning("No packages found");
                } else {
                    presenter.packages(&result.packages);
                }
            }
            Err(e) => {
                warn!(query, error = %e, "package search failed");
                presenter.finish_progress(ProgressOutcome::Failure("Search failed".to_string()));
                presenter.error(&format!("Search error: {e}"));
            }
        }
    }
}

fn show_config(ctx: &CommandContext<'_>, presenter: &mut dyn Presenter) {
    let prefs = &ctx.config.preferences;
    presenter.plain(&format!(
        "Current Configuration:\n\
         • Provider: {}\n\
         • Model: {}\n\
         • Package Manager: {}\n\
         • Show Thinking: {}\n\
         • Color Output: {}\n\
         • Stream Responses: {}",
        ctx.provider.provider(),
        ctx.provider.model(),
        prefs.package_manager.as_str(),
        prefs.show_thinking,
        prefs.color_output,
        prefs.stream_responses,
    ));
}

fn show_history(history: &History, presenter: &mut dyn Presenter) {
    if history.is_empty() {
        presenter.info("No messages yet");
        return;
    }
    for message in history.messages() {
        let speaker = match message.role {
            Role::User => "You",
            Role::Assistant => "NodeMate",
            Role::System => "System",
        };
        presenter.plain(&format!("{speaker}: {}", message.content));
    }
}

fn show_models(provider: &dyn LLMProvider, presenter: &mut dyn Presenter) {
    presenter.plain(&format!("Models for {}:", provider.provider().descriptor().name));
    for model in provider.supported_models() {
        let marker = if model == provider.model() { "*" } else { " " };
        presenter.plain(&format!("  {marker} {model}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use crate::session::testing::{FakeProvider, FakeSearch, RecordingPresenter, package};

    struct Harness {
        config: Config,
        history: History,
        provider: FakeProvider,
        presenter: RecordingPresenter,
        search: Arc<FakeSearch>,
    }

    impl Harness {
        fn new(search: FakeSearch) -> Self {
            Self {
                config: Config::default(),
                history: History::new(),
                provider: FakeProvider::new(vec![]),
                presenter: RecordingPresenter::default(),
                search: Arc::new(search),
            }
        }

        async fn run(&mut self, input: &str) -> CommandOutcome {
            let dispatcher = CommandDispatcher::new(self.search.clone());
            let ctx = CommandContext {
                config: &self.config,
                history: &self.history,
                provider: &self.provider,
                welcome: "welcome",
            };
            dispatcher
                .dispatch(Command::parse(input), ctx, &mut self.presenter)
                .await
        }
    }

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(Command::parse("/help"), Command::Help);
        assert_eq!(
            Command::parse("/search  express   router "),
            Command::Search("express router".to_string())
        );
        assert_eq!(Command::parse("/search"), Command::Search(String::new()));
        assert_eq!(Command::parse("/model"), Command::Model(None));
        assert_eq!(
            Command::parse("/model gpt-4o"),
            Command::Model(Some("gpt-4o".to_string()))
        );
        assert_eq!(
            Command::parse("/install pino"),
            Command::Unknown("/install".to_string())
        );
    }

    #[tokio::test]
    async fn search_uses_limit_and_reports_empty_result() {
        let mut harness = Harness::new(FakeSearch::default());
        let outcome = harness.run("/search express").await;

        assert_eq!(outcome, CommandOutcome::Continue);
        assert_eq!(
            *harness.search.calls.lock().unwrap(),
            vec![("express".to_string(), 5)]
        );
        assert!(harness.presenter.contains("warning: No packages found"));
    }

    #[tokio::test]
    async fn search_shows_packages() {
        let search = FakeSearch {
            packages: vec![package("express"), package("koa")],
            ..Default::default()
        };
        let mut harness = Harness::new(search);
        harness.run("/search web framework").await;

        assert!(harness.presenter.contains("success: Found 2 packages"));
        assert!(harness.presenter.contains("packages: express,koa"));
    }

    #[tokio::test]
    async fn search_without_query_reports_usage() {
        let mut harness = Harness::new(FakeSearch::default());
        harness.run("/search").await;

        assert!(harness.search.calls.lock().unwrap().is_empty());
        assert!(harness.presenter.contains("warning: Usage: /search <package-name>"));
    }

    #[tokio::test]
    async fn unknown_command_warns_with_hint() {
        let mut harness = Harness::new(FakeSearch::default());
        let outcome = harness.run("/frobnicate").await;

        assert_eq!(outcome, CommandOutcome::Continue);
        assert_eq!(
            harness.presenter.events(),
            vec![
                "warning: Unknown command: /frobnicate".to_string(),
                "info: Type /help for available commands".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn outcomes_for_state_changing_commands() {
        let mut harness = Harness::new(FakeSearch::default());
        assert_eq!(harness.run("/exit").await, CommandOutcome::Exit);
        assert_eq!(harness.run("/clear").await, CommandOutcome::ClearHistory);
        assert!(harness.presenter.contains("clear_screen"));
        assert_eq!(
            harness.run("/model gpt-4o").await,
            CommandOutcome::SwitchModel("gpt-4o".to_string())
        );
    }

    #[tokio::test]
    async fn informational_commands() {
        let mut harness = Harness::new(FakeSearch::default());
        harness.history.push(Message::user("install a logger"));
        harness.history.push(Message::assistant("Try pino."));

        harness.run("/resolve").await;
        harness.run("/history").await;
        harness.run("/model").await;
        harness.run("/help").await;

        assert!(harness
            .presenter
            .contains("info: Dependency conflict resolution coming soon..."));
        assert!(harness.presenter.contains("plain: You: install a logger"));
        assert!(harness.presenter.contains("plain: NodeMate: Try pino."));
        assert!(harness.presenter.contains("plain:   * gpt-4-turbo-preview"));
        assert!(harness.presenter.contains("plain:     gpt-4o"));
        assert!(harness.presenter.contains(&format!("commands: {}", COMMANDS.len())));
    }

    #[tokio::test]
    async fn config_lists_current_settings() {
        let mut harness = Harness::new(FakeSearch::default());
        harness.run("/config").await;

        let events = harness.presenter.events();
        let shown = events.last().unwrap();
        assert!(shown.contains("• Provider: openai"));
        assert!(shown.contains("• Model: gpt-4-turbo-preview"));
        assert!(shown.contains("• Package Manager: auto"));
    }
}
