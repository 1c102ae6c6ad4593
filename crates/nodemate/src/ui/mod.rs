//! Terminal presentation and line input.

mod format;
mod input;
mod terminal;

pub use format::{Palette, command_table, format_number, format_relative, package_table, render_markdown};
pub use input::{InputEvent, LineInput, ReedlineInput};
pub use terminal::TerminalPresenter;

use crate::npm::PackageInfo;

/// How a progress indicator ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressOutcome {
    Success(String),
    Warning(String),
    Failure(String),
    /// Remove the indicator without a message.
    Cleared,
}

/// Everything the session shows the user goes through here.
pub trait Presenter: Send {
    fn info(&mut self, message: &str);
    fn success(&mut self, message: &str);
    fn warning(&mut self, message: &str);
    fn error(&mut self, message: &str);

    /// Unstyled text, printed as is.
    fn plain(&mut self, text: &str);

    /// A complete assistant reply.
    fn assistant(&mut self, text: &str);

    /// One streamed piece of an assistant reply.
    fn fragment(&mut self, text: &str);

    /// Close a run of fragments.
    fn end_fragments(&mut self);

    fn packages(&mut self, packages: &[PackageInfo]);

    fn commands(&mut self, commands: &[(&str, &str)]);

    fn clear_screen(&mut self);

    fn start_progress(&mut self, message: &str);

    fn finish_progress(&mut self, outcome: ProgressOutcome);
}
