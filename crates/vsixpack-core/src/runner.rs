use std::path::Path;

use serde::Serialize;

use crate::error::StepError;
use crate::toolchain::ExecutionAction;

/// Result of a streamed process run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessOutput {
    pub code: Option<i32>,
}

/// Executes external actions on behalf of the pipeline.
///
/// Implementations must report a missing program as
/// [`StepError::ToolNotFound`] and a non-zero exit as
/// [`StepError::NonZeroExit`].
pub trait ProcessRunner {
    /// Runs `action` in `cwd` with output streamed to the console.
    fn run(&self, action: &ExecutionAction, cwd: &Path) -> Result<ProcessOutput, StepError>;

    /// Runs `action` in `cwd` and returns its trimmed stdout.
    fn capture(&self, action: &ExecutionAction, cwd: &Path) -> Result<String, StepError>;
}
