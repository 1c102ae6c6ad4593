//! Command-line entry point.

mod setup;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

pub use setup::{FIRST_TIME_SETUP, Prompter, SetupOutcome, run_setup, show_config};

use crate::config::{self, Config, ConfigSource};
use crate::context::SystemProbe;
use crate::npm::NpmClient;
use crate::session::ChatSession;
use crate::ui::{Presenter, ReedlineInput, TerminalPresenter};

pub const WELCOME_MESSAGE: &str = "
Welcome to NodeMate!
Your AI-powered Node.js package management assistant.

NodeMate helps you:
• Find and install the best packages for your project
• Resolve dependency conflicts
• Get AI-powered recommendations
• Compare similar packages
• Generate usage examples

Type 'nodemate chat' to start an interactive session or use --help for more options.
";

#[derive(Subcommand, Debug)]
enum Command {
    /// Configure NodeMate with your AI provider
    Config {
        /// Print the current configuration instead of running setup
        #[arg(long)]
        show: bool,
    },
    /// Start interactive chat mode
    Chat {},
}

#[derive(Parser, Debug)]
#[command(name = "nodemate", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let path = config::resolve_path(cli.config.as_deref())?;
    let mut config = Config::load(&path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;
    debug!(path = %path.display(), configured = config.has_config(), "configuration loaded");

    let mut presenter = TerminalPresenter::new(config.preferences.color_output);

    match cli.command {
        Some(Command::Config { show: true }) => {
            show_config(&config, &path, &mut presenter);
        }
        Some(Command::Config { show: false }) => {
            configure(&mut config, &path, &mut presenter).await?;
        }
        Some(Command::Chat {}) => {
            if !config.has_config() {
                presenter.error("No configuration found. Please run: nodemate config");
                return Ok(ExitCode::FAILURE);
            }
            chat(config).await?;
        }
        None => {
            if config.has_config() {
                presenter.plain(WELCOME_MESSAGE);
                presenter.info(
                    "Configuration found. Use \"nodemate chat\" to start or \"nodemate --help\" for more options.",
                );
            } else {
                presenter.plain(FIRST_TIME_SETUP);
                configure(&mut config, &path, &mut presenter).await?;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn configure(
    config: &mut Config,
    path: &Path,
    presenter: &mut dyn Presenter,
) -> Result<()> {
    let options = config.client_options();
    let mut input = ReedlineInput::new("nodemate");
    let mut prompter = Prompter::new(&mut input, presenter);
    let outcome = run_setup(config, path, &options, &mut prompter).await;
    match outcome {
        Ok(SetupOutcome::Cancelled) => {
            prompter.presenter().warning("Setup cancelled");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) => {
            prompter
                .presenter()
                .error(&format!("Configuration failed: {e}"));
            Err(e)
        }
    }
}

async fn chat(config: Config) -> Result<()> {
    let project_path = std::env::current_dir().context("failed to read current directory")?;
    let presenter = Box::new(TerminalPresenter::new(config.preferences.color_output));
    let search = Arc::new(NpmClient::new());

    let mut session =
        ChatSession::initialize(config, &project_path, &SystemProbe, search, presenter).await?;
    let mut input = ReedlineInput::new("You");
    session.run(&mut input).await?;
    Ok(())
}
