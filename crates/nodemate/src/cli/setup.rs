//! Interactive configuration flow.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::config::{Config, ConfigSource, PackageManagerPreference};
use crate::llm::{ClientOptions, Provider, ProviderFactory};
use crate::ui::{InputEvent, LineInput, Presenter, ProgressOutcome};

pub const FIRST_TIME_SETUP: &str = "
Welcome to NodeMate!

It looks like this is your first time using NodeMate.
Let's set up your AI provider to get started.
";

const CONFIG_SUCCESS: &str = "Configuration saved successfully!
You can now use NodeMate with your selected AI provider.

Try: nodemate chat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    Saved(PathBuf),
    /// An existing configuration was left untouched.
    Kept,
    Cancelled,
    ValidationFailed,
}

/// Question-and-answer helper over a line input.
///
/// Every question returns `None` when the user interrupts or closes input.
pub struct Prompter<'a> {
    input: &'a mut dyn LineInput,
    presenter: &'a mut dyn Presenter,
}

impl<'a> Prompter<'a> {
    pub fn new(input: &'a mut dyn LineInput, presenter: &'a mut dyn Presenter) -> Self {
        Self { input, presenter }
    }

    pub fn presenter(&mut self) -> &mut dyn Presenter {
        &mut *self.presenter
    }

    async fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        self.presenter.plain(question);
        Ok(match self.input.read_line().await? {
            InputEvent::Line(line) => Some(line.trim().to_string()),
            InputEvent::Interrupted | InputEvent::Eof => None,
        })
    }

    /// Numbered choice. Empty input picks `default`.
    pub async fn choose<T: Copy>(
        &mut self,
        question: &str,
        options: &[(String, T)],
        default: usize,
    ) -> io::Result<Option<T>> {
        self.presenter.plain(question);
        for (i, (label, _)) in options.iter().enumerate() {
            self.presenter.plain(&format!("  {}) {label}", i + 1));
        }

        loop {
            let Some(answer) = self.ask(&format!("Choice [{}]:", default + 1)).await? else {
                return Ok(None);
            };
            if answer.is_empty() {
                return Ok(options.get(default).map(|(_, value)| *value));
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(Some(options[n - 1].1)),
                _ => self.presenter.warning(&format!(
                    "Please enter a number between 1 and {}",
                    options.len()
                )),
            }
        }
    }

    pub async fn confirm(&mut self, question: &str, default: bool) -> io::Result<Option<bool>> {
        let hint = if default { "Y/n" } else { "y/N" };
        loop {
            let Some(answer) = self.ask(&format!("{question} ({hint})")).await? else {
                return Ok(None);
            };
            match answer.to_lowercase().as_str() {
                "" => return Ok(Some(default)),
                "y" | "yes" => return Ok(Some(true)),
                "n" | "no" => return Ok(Some(false)),
                _ => self.presenter.warning("Please answer y or n"),
            }
        }
    }

    /// Ask until the key is non-empty and has the provider's prefix.
    pub async fn api_key(&mut self, provider: Provider) -> io::Result<Option<String>> {
        let descriptor = provider.descriptor();
        loop {
            let Some(key) = self
                .ask(&format!("Enter your {} API key:", descriptor.name))
                .await?
            else {
                return Ok(None);
            };
            if key.is_empty() {
                self.presenter.error("API key is required");
            } else if !ProviderFactory::validate_api_key_format(provider.id(), &key) {
                self.presenter.error(&format!(
                    "Invalid API key format. Expected format: {}...",
                    descriptor.key_prefix
                ));
            } else {
                return Ok(Some(key));
            }
        }
    }
}

/// Walk through provider, key, model and preferences, validate the key
/// against the backend, then save to `path`.
pub async fn run_setup(
    config: &mut Config,
    path: &Path,
    options: &ClientOptions,
    prompter: &mut Prompter<'_>,
) -> Result<SetupOutcome> {
    prompter
        .presenter()
        .info("Setting up NodeMate configuration...");

    if config.has_config() {
        let current = format!("Current provider: {}", config.provider);
        prompter.presenter().info(&current);
        match prompter
            .confirm("Configuration already exists. Do you want to reconfigure?", false)
            .await?
        {
            Some(true) => {}
            Some(false) => return Ok(SetupOutcome::Kept),
            None => return Ok(SetupOutcome::Cancelled),
        }
    }

    let providers: Vec<(String, Provider)> = Provider::ALL
        .iter()
        .map(|p| (format!("{} ({})", p.descriptor().name, p.id()), *p))
        .collect();
    let Some(provider) = prompter
        .choose("Select your AI provider:", &providers, 0)
        .await?
    else {
        return Ok(SetupOutcome::Cancelled);
    };
    let descriptor = provider.descriptor();

    let Some(api_key) = prompter.api_key(provider).await? else {
        return Ok(SetupOutcome::Cancelled);
    };

    let models: Vec<(String, &'static str)> = descriptor
        .models
        .iter()
        .map(|m| {
            let label = if *m == descriptor.default_model {
                format!("{m} (recommended)")
            } else {
                m.to_string()
            };
            (label, *m)
        })
        .collect();
    let default_model = descriptor
        .models
        .iter()
        .position(|m| *m == descriptor.default_model)
        .unwrap_or(0);
    let Some(model) = prompter
        .choose(
            &format!("Select {} model:", descriptor.name),
            &models,
            default_model,
        )
        .await?
    else {
        return Ok(SetupOutcome::Cancelled);
    };

    let presenter = prompter.presenter();
    presenter.start_progress(&format!("Validating {} API key...", descriptor.name));
    let valid =
        ProviderFactory::validate_provider_with(provider.id(), &api_key, Some(model), options)
            .await;
    if !valid {
        presenter.finish_progress(ProgressOutcome::Failure(
            "API key validation failed".to_string(),
        ));
        presenter.error("Invalid API key or insufficient permissions");
        return Ok(SetupOutcome::ValidationFailed);
    }
    presenter.finish_progress(ProgressOutcome::Success(
        "API key validated successfully".to_string(),
    ));

    let managers: Vec<(String, PackageManagerPreference)> = PackageManagerPreference::ALL
        .iter()
        .map(|p| match p {
            PackageManagerPreference::Auto => ("Auto-detect (recommended)".to_string(), *p),
            other => (other.as_str().to_string(), *other),
        })
        .collect();
    let Some(package_manager) = prompter
        .choose("Preferred package manager:", &managers, 0)
        .await?
    else {
        return Ok(SetupOutcome::Cancelled);
    };
    let Some(show_thinking) = prompter.confirm("Show AI thinking process?", true).await? else {
        return Ok(SetupOutcome::Cancelled);
    };
    let Some(color_output) = prompter.confirm("Enable colored output?", true).await? else {
        return Ok(SetupOutcome::Cancelled);
    };
    let Some(stream_responses) = prompter
        .confirm("Stream responses as they arrive?", false)
        .await?
    else {
        return Ok(SetupOutcome::Cancelled);
    };

    config.set_provider(provider);
    config.set_api_key(provider, &api_key);
    config.set_model(provider, model);
    config.preferences.package_manager = package_manager;
    config.preferences.show_thinking = show_thinking;
    config.preferences.color_output = color_output;
    config.preferences.stream_responses = stream_responses;
    config.save(path).await?;
    info!(provider = %provider, model, path = %path.display(), "configuration saved");

    let presenter = prompter.presenter();
    presenter.success(CONFIG_SUCCESS);
    presenter.info(&format!("Configuration saved to: {}", path.display()));
    Ok(SetupOutcome::Saved(path.to_path_buf()))
}

/// Print the stored configuration with the key masked.
pub fn show_config(config: &Config, path: &Path, presenter: &mut dyn Presenter) {
    if !config.has_config() {
        presenter.warning("No configuration found. Run: nodemate config");
        return;
    }

    let yes_no = |flag: bool| if flag { "Yes" } else { "No" };
    let prefs = &config.preferences;
    presenter.plain(&format!(
        "NodeMate Configuration:\n\n\
         Provider: {} ({})\n\
         Model: {}\n\
         API Key: {}\n\n\
         Preferences:\n\
         • Package Manager: {}\n\
         • Show Thinking: {}\n\
         • Color Output: {}\n\
         • Stream Responses: {}\n\n\
         Config Path: {}",
        config.provider.descriptor().name,
        config.provider,
        config.model(None),
        config.masked_api_key(),
        prefs.package_manager.as_str(),
        yes_no(prefs.show_thinking),
        yes_no(prefs.color_output),
        yes_no(prefs.stream_responses),
        path.display(),
    ));
}
