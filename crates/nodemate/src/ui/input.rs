use std::io;

use async_trait::async_trait;
use reedline::{DefaultPrompt, DefaultPromptSegment, Reedline, Signal};

/// One read from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    /// Ctrl-C at the prompt.
    Interrupted,
    /// Ctrl-D or closed input.
    Eof,
}

/// Source of user input lines. Line editors own the terminal and are not
/// required to be `Send`.
#[async_trait(?Send)]
pub trait LineInput {
    async fn read_line(&mut self) -> io::Result<InputEvent>;
}

/// Line editor with history and emacs keybindings.
pub struct ReedlineInput {
    editor: Reedline,
    prompt: DefaultPrompt,
}

impl ReedlineInput {
    pub fn new(prompt: &str) -> Self {
        Self {
            editor: Reedline::create(),
            prompt: DefaultPrompt::new(
                DefaultPromptSegment::Basic(prompt.to_string()),
                DefaultPromptSegment::Empty,
            ),
        }
    }
}

#[async_trait(?Send)]
impl LineInput for ReedlineInput {
    async fn read_line(&mut self) -> io::Result<InputEvent> {
        // The editor owns the terminal while reading; keep other tasks
        // scheduled on the remaining workers.
        let signal = tokio::task::block_in_place(|| self.editor.read_line(&self.prompt))?;
        Ok(match signal {
            Signal::Success(line) => InputEvent::Line(line),
            Signal::CtrlC => InputEvent::Interrupted,
            Signal::CtrlD => InputEvent::Eof,
            #[allow(unreachable_patterns)]
            _ => InputEvent::Interrupted,
        })
    }
}
