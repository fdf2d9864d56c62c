use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tracing::{debug, instrument};

use vsixpack_core::{ExecutionAction, ProcessOutput, ProcessRunner, StepError};

/// Exit status a shell reports when it cannot find the command to run.
const COMMAND_NOT_FOUND: i32 = 127;

/// Runs actions as real child processes, one at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner {
    stdout_to_stderr: bool,
}

impl SystemRunner {
    /// Sends child stdout to our stderr so our own stdout stays machine-readable.
    pub fn with_stdout_to_stderr(mut self, enabled: bool) -> Self {
        self.stdout_to_stderr = enabled;
        self
    }

    fn child_stdout(&self) -> Stdio {
        if self.stdout_to_stderr {
            Stdio::from(std::io::stderr())
        } else {
            Stdio::inherit()
        }
    }
}

impl ProcessRunner for SystemRunner {
    #[instrument(skip_all, fields(program = %action.tool()))]
    fn run(&self, action: &ExecutionAction, cwd: &Path) -> Result<ProcessOutput, StepError> {
        let status = command(action, cwd)
            .stdin(Stdio::inherit())
            .stdout(self.child_stdout())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_error(action, e))?;

        debug!(exit_code = ?status.code(), "command finished");
        if !status.success() {
            // Output went straight to the console; the command line is all we have.
            return Err(exit_error(action, status.code(), action.command_line()));
        }

        Ok(ProcessOutput {
            code: status.code(),
        })
    }

    #[instrument(skip_all, fields(program = %action.tool()))]
    fn capture(&self, action: &ExecutionAction, cwd: &Path) -> Result<String, StepError> {
        let output = command(action, cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| spawn_error(action, e))?;

        if !output.status.success() {
            return Err(exit_error(action, output.status.code(), error_text(&output)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn command(action: &ExecutionAction, cwd: &Path) -> Command {
    let mut cmd = Command::new(&action.program);
    cmd.args(&action.args).envs(&action.env).current_dir(cwd);
    cmd
}

fn spawn_error(action: &ExecutionAction, err: std::io::Error) -> StepError {
    if err.kind() == ErrorKind::NotFound {
        StepError::ToolNotFound {
            program: action.program.clone(),
        }
    } else {
        StepError::io(format!("failed to start '{}'", action.command_line()), err)
    }
}

/// A wrapper exiting with 127 could not find the tool it wraps.
fn exit_error(action: &ExecutionAction, code: Option<i32>, diagnostic: String) -> StepError {
    match &action.wrapped_program {
        Some(tool) if code == Some(COMMAND_NOT_FOUND) => StepError::ToolNotFound {
            program: tool.clone(),
        },
        _ => StepError::NonZeroExit {
            program: action.program.clone(),
            code,
            diagnostic,
        },
    }
}

/// Prefers stderr, falls back to stdout if stderr is empty.
fn error_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        stderr.trim().to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}
