use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::runtime::RuntimeSpec;
use crate::step::StepKind;

/// A single external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionAction {
    /// The executable program (e.g., "npm", "code").
    pub program: String,
    /// The arguments to pass to the program.
    pub args: Vec<String>,
    /// Optional environment variables to set for the execution.
    pub env: HashMap<String, String>,
    /// The tool `program` launches on our behalf, when `program` is a wrapper
    /// such as a version-manager shell. Exit status 127 then means this tool
    /// is missing.
    pub wrapped_program: Option<String>,
}

impl ExecutionAction {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
            wrapped_program: None,
        }
    }

    pub fn wrapping(mut self, program: impl Into<String>) -> Self {
        self.wrapped_program = Some(program.into());
        self
    }

    /// The tool a user would recognise: the wrapped program if any.
    pub fn tool(&self) -> &str {
        self.wrapped_program.as_deref().unwrap_or(&self.program)
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The argv as a single line, for logs and plans.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Display for ExecutionAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Everything a toolchain needs to know to build the actions of one step.
#[derive(Debug, Clone)]
pub struct StepContext<'a> {
    /// Canonical project directory; every action runs here.
    pub base_path: &'a Path,
    pub runtime: &'a RuntimeSpec,
    /// Artifacts the step targets: stale ones for `uninstall`, the freshly
    /// produced one for `install`, empty otherwise.
    pub artifacts: Vec<PathBuf>,
}

/// A contract for the tool stack that compiles, packages and installs the extension.
pub trait Toolchain: std::fmt::Debug {
    /// Unique name of the toolchain.
    fn name(&self) -> &str;

    /// Maps a pipeline step to the external actions it runs, in order.
    ///
    /// An empty list means the step has nothing to do with this toolchain.
    fn build_actions(&self, step: StepKind, ctx: &StepContext<'_>) -> Result<Vec<ExecutionAction>>;

    /// The action whose stdout reports the active runtime version.
    fn runtime_query(&self, runtime: &RuntimeSpec) -> ExecutionAction;
}
