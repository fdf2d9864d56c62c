//! Pipeline steps and what happens when one of them fails.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One stage of the package-and-reinstall pipeline.
///
/// Variants are declared in execution order; [`StepKind::ALL`] preserves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Uninstall,
    Clean,
    Compile,
    UseRuntime,
    AwaitRuntime,
    ToolVersion,
    InstallTools,
    ListTools,
    InstallDeps,
    ListDeps,
    Package,
    Install,
}

impl StepKind {
    pub const ALL: [StepKind; 12] = [
        Self::Uninstall,
        Self::Clean,
        Self::Compile,
        Self::UseRuntime,
        Self::AwaitRuntime,
        Self::ToolVersion,
        Self::InstallTools,
        Self::ListTools,
        Self::InstallDeps,
        Self::ListDeps,
        Self::Package,
        Self::Install,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninstall => "uninstall",
            Self::Clean => "clean",
            Self::Compile => "compile",
            Self::UseRuntime => "use-runtime",
            Self::AwaitRuntime => "await-runtime",
            Self::ToolVersion => "tool-version",
            Self::InstallTools => "install-tools",
            Self::ListTools => "list-tools",
            Self::InstallDeps => "install-deps",
            Self::ListDeps => "list-deps",
            Self::Package => "package",
            Self::Install => "install",
        }
    }

    /// Steps that only print information for the operator.
    pub fn is_diagnostic(self) -> bool {
        matches!(self, Self::ToolVersion | Self::ListTools | Self::ListDeps)
    }

    pub fn default_on_failure(self) -> OnFailure {
        if self == Self::Uninstall || self.is_diagnostic() {
            OnFailure::Ignore
        } else {
            OnFailure::Halt
        }
    }
}

impl Display for StepKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStep(pub String);

impl Display for UnknownStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown step '{}'", self.0)
    }
}

impl std::error::Error for UnknownStep {}

impl FromStr for StepKind {
    type Err = UnknownStep;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == value)
            .ok_or_else(|| UnknownStep(value.to_string()))
    }
}

/// What the pipeline does after a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Stop the pipeline; the run fails.
    Halt,
    /// Keep going; the run fails once every step has been attempted.
    Continue,
    /// Keep going and log a warning; the run does not fail.
    Ignore,
}

impl OnFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Continue => "continue",
            Self::Ignore => "ignore",
        }
    }
}

/// A step selected for execution together with its failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStep {
    pub kind: StepKind,
    pub on_failure: OnFailure,
}
