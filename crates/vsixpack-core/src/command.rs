use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use crate::step::StepKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimaryCommand {
    Init,
    Run,
    Step,
    Plan,
}

impl PrimaryCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Run => "run",
            Self::Step => "step",
            Self::Plan => "plan",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandRef {
    pub primary: PrimaryCommand,
    pub selector: Option<StepKind>,
}

impl CommandRef {
    /// The command used when the binary is invoked without arguments.
    pub fn full_run() -> Self {
        Self {
            primary: PrimaryCommand::Run,
            selector: None,
        }
    }

    pub fn canonical(&self) -> String {
        match &self.selector {
            Some(step) => format!("{}:{}", self.primary.as_str(), step.as_str()),
            None => self.primary.as_str().to_string(),
        }
    }
}

impl Display for CommandRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("unknown primary command '{0}'")]
    UnknownPrimary(String),
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("'{0}' requires a step selector, for example '{0}:compile'")]
    MissingStep(String),
    #[error("'{0}' does not take a selector")]
    UnexpectedSelector(String),
}

impl FromStr for CommandRef {
    type Err = CommandParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.splitn(2, ':');
        let primary_text = parts.next().unwrap_or_default();
        let selector_text = parts.next();

        let primary = match primary_text {
            "init" => PrimaryCommand::Init,
            "run" => PrimaryCommand::Run,
            "step" => PrimaryCommand::Step,
            "plan" => PrimaryCommand::Plan,
            _ => return Err(CommandParseError::UnknownPrimary(primary_text.to_string())),
        };

        let selector = match selector_text {
            Some(text) => Some(
                StepKind::from_str(text)
                    .map_err(|_| CommandParseError::UnknownStep(text.to_string()))?,
            ),
            None => None,
        };

        match (primary, selector) {
            (PrimaryCommand::Init, Some(_)) => {
                Err(CommandParseError::UnexpectedSelector(primary_text.to_string()))
            }
            (PrimaryCommand::Step, None) => {
                Err(CommandParseError::MissingStep(primary_text.to_string()))
            }
            _ => Ok(Self { primary, selector }),
        }
    }
}
