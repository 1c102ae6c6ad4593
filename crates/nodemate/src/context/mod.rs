//! Project context detection and the system prompt built from it.

mod project;
mod prompt;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

pub use project::{
    Framework, PackageManager, ProjectContext, SystemProbe, ToolProbe, detect_context,
};
pub use prompt::build_main_prompt;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("No package.json found in {}. Are you in a Node.js project?", .0.display())]
    NoPackageJson(PathBuf),

    #[error("failed to read package.json: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse package.json: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result of best-effort context detection.
///
/// Detection failure never aborts a session. It degrades to an unknown
/// context while keeping the reason visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextDetection {
    Detected(ProjectContext),
    Defaulted {
        context: ProjectContext,
        reason: String,
    },
}

impl ContextDetection {
    pub async fn detect(path: &Path, probe: &dyn ToolProbe) -> Self {
        match detect_context(path, probe).await {
            Ok(context) => ContextDetection::Detected(context),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "context detection failed, using defaults");
                ContextDetection::Defaulted {
                    context: ProjectContext::unknown(path),
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn into_context(self) -> ProjectContext {
        match self {
            ContextDetection::Detected(context) => context,
            ContextDetection::Defaulted { context, .. } => context,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, ContextDetection::Detected(_))
    }
}
