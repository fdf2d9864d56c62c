use serde::Serialize;
use thiserror::Error;

/// Why a pipeline step did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
    #[error("tool '{program}' was not found")]
    ToolNotFound { program: String },

    #[error("'{program}' exited with {}: {diagnostic}", display_code(.code))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        diagnostic: String,
    },

    #[error("no artifact matches '{pattern}'")]
    ArtifactNotProduced { pattern: String },

    #[error(
        "runtime '{requested}' not active after {waited_ms}ms (last observed: {})",
        display_observed(.observed)
    )]
    RuntimeTimeout {
        requested: String,
        observed: Option<String>,
        waited_ms: u64,
    },

    #[error("cannot prepare '{step}': {message}")]
    Prepare { step: String, message: String },

    #[error("{context}: {message}")]
    Io { context: String, message: String },
}

impl StepError {
    pub fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

fn display_observed(observed: &Option<String>) -> &str {
    observed.as_deref().unwrap_or("nothing")
}
