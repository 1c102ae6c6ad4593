use std::io::{self, Write};
use std::time::Duration;

use chrono::Utc;
use crossterm::ExecutableCommand;
use crossterm::cursor::MoveTo;
use crossterm::style::Color;
use crossterm::terminal::{Clear, ClearType};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use super::format::{Palette, command_table, package_table, render_markdown};
use super::{Presenter, ProgressOutcome};
use crate::npm::PackageInfo;

/// Writes to stdout with optional colors and a spinner.
pub struct TerminalPresenter {
    palette: Palette,
    spinner: Option<ProgressBar>,
}

impl TerminalPresenter {
    pub fn new(color: bool) -> Self {
        Self {
            palette: Palette::new(color),
            spinner: None,
        }
    }

    fn line(&mut self, text: &str) {
        // Spinner output and regular output must not interleave.
        match &self.spinner {
            Some(spinner) => spinner.suspend(|| println!("{text}")),
            None => println!("{text}"),
        }
    }

    fn tagged(&mut self, symbol: &str, color: Color, message: &str) {
        let text = format!("{} {message}", self.palette.paint(symbol, color));
        self.line(&text);
    }
}

impl Presenter for TerminalPresenter {
    fn info(&mut self, message: &str) {
        self.tagged("ℹ", Color::Blue, message);
    }

    fn success(&mut self, message: &str) {
        self.tagged("✔", Color::Green, message);
    }

    fn warning(&mut self, message: &str) {
        self.tagged("⚠", Color::Yellow, message);
    }

    fn error(&mut self, message: &str) {
        self.tagged("✖", Color::Red, message);
    }

    fn plain(&mut self, text: &str) {
        self.line(text);
    }

    fn assistant(&mut self, text: &str) {
        let label = self.palette.strong("NodeMate:", Color::Magenta);
        let body = render_markdown(text, self.palette);
        self.line(&format!("\n{label}\n{body}\n"));
    }

    fn fragment(&mut self, text: &str) {
        let mut stdout = io::stdout();
        let _ = write!(stdout, "{text}");
        let _ = stdout.flush();
    }

    fn end_fragments(&mut self) {
        println!("\n");
    }

    fn packages(&mut self, packages: &[PackageInfo]) {
        let table = package_table(packages, Utc::now(), self.palette);
        self.line(&table);
    }

    fn commands(&mut self, commands: &[(&str, &str)]) {
        let table = command_table(commands, self.palette);
        self.line(&table);
    }

    fn clear_screen(&mut self) {
        let mut stdout = io::stdout();
        let cleared = stdout
            .execute(Clear(ClearType::All))
            .and_then(|out| out.execute(MoveTo(0, 0)))
            .map(|_| ());
        if let Err(e) = cleared {
            debug!(error = %e, "failed to clear terminal");
        }
    }

    fn start_progress(&mut self, message: &str) {
        if let Some(previous) = self.spinner.take() {
            previous.finish_and_clear();
        }
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let spinner = ProgressBar::new_spinner()
            .with_style(style)
            .with_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        self.spinner = Some(spinner);
    }

    fn finish_progress(&mut self, outcome: ProgressOutcome) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        match outcome {
            ProgressOutcome::Success(message) => self.success(&message),
            ProgressOutcome::Warning(message) => self.warning(&message),
            ProgressOutcome::Failure(message) => self.error(&message),
            ProgressOutcome::Cleared => {}
        }
    }
}
