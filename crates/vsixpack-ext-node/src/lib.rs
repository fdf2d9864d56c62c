//! The Node.js / VS Code toolchain: npm, a runtime version manager, vsce and the editor CLI.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use vsixpack_core::config::ToolsConfig;
use vsixpack_core::{
    ExecutionAction, RuntimeManager, RuntimeSpec, StepContext, StepError, StepKind, Toolchain,
};

pub mod manifest;

pub use manifest::ExtensionManifest;

/// Runs `<program> <args...>` under the nvm-selected version passed as `$0`.
const NVM_EXEC_SCRIPT: &str = r#". "${NVM_DIR:-$HOME/.nvm}/nvm.sh" && nvm exec --silent "$0" "$@""#;

/// Activates the version passed as `$0`; fails when it is not installed.
const NVM_USE_SCRIPT: &str = r#". "${NVM_DIR:-$HOME/.nvm}/nvm.sh" && nvm use "$0""#;

const NVM_SCRIPT: &str = "nvm.sh";

#[derive(Debug, Clone)]
pub struct NodeToolchain {
    tools: ToolsConfig,
    nvm_dir: Option<PathBuf>,
}

impl NodeToolchain {
    pub fn new(tools: ToolsConfig, nvm_dir: Option<PathBuf>) -> Self {
        Self { tools, nvm_dir }
    }

    /// Wraps a runtime-dependent invocation so it runs under the pinned version.
    fn under_runtime(&self, runtime: &RuntimeSpec, program: &str, args: &[&str]) -> ExecutionAction {
        match runtime.manager {
            RuntimeManager::None => ExecutionAction::new(program, args.iter().copied()),
            RuntimeManager::Nvm => {
                let mut wrapped = vec!["-c", NVM_EXEC_SCRIPT, runtime.version.as_str(), program];
                wrapped.extend_from_slice(args);
                self.with_nvm_dir(ExecutionAction::new("bash", wrapped).wrapping(program))
            }
        }
    }

    /// Where `nvm.sh` is sourced from: the configured directory, then
    /// `$NVM_DIR`, then `~/.nvm`.
    fn nvm_home(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.nvm_dir {
            return Some(dir.clone());
        }
        if let Some(dir) = std::env::var_os("NVM_DIR").filter(|d| !d.is_empty()) {
            return Some(PathBuf::from(dir));
        }
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".nvm"))
    }

    fn require_nvm(&self) -> Result<(), StepError> {
        match self.nvm_home() {
            Some(home) if home.join(NVM_SCRIPT).is_file() => Ok(()),
            home => {
                debug!("nvm.sh not found under {:?}", home);
                Err(StepError::ToolNotFound {
                    program: "nvm".to_string(),
                })
            }
        }
    }

    fn with_nvm_dir(&self, action: ExecutionAction) -> ExecutionAction {
        match &self.nvm_dir {
            Some(dir) => action.with_env("NVM_DIR", dir.to_string_lossy()),
            None => action,
        }
    }

    fn package_manager(&self, runtime: &RuntimeSpec, args: &[&str]) -> ExecutionAction {
        self.under_runtime(runtime, &self.tools.package_manager, args)
    }

    fn editor(&self, flag: &str, target: &str) -> ExecutionAction {
        ExecutionAction::new(self.tools.editor.as_str(), [flag, target])
    }

    fn uninstall_actions(&self, ctx: &StepContext<'_>) -> Result<Vec<ExecutionAction>> {
        if let Some(id) = ExtensionManifest::load(ctx.base_path)?.and_then(|m| m.identifier()) {
            return Ok(vec![self.editor("--uninstall-extension", &id)]);
        }

        debug!("no extension identifier in manifest, uninstalling by artifact path");
        Ok(ctx
            .artifacts
            .iter()
            .map(|path| self.editor("--uninstall-extension", &display_relative(ctx.base_path, path)))
            .collect())
    }
}

impl Toolchain for NodeToolchain {
    fn name(&self) -> &str {
        "node"
    }

    fn build_actions(&self, step: StepKind, ctx: &StepContext<'_>) -> Result<Vec<ExecutionAction>> {
        let runtime = ctx.runtime;
        if runtime.manager == RuntimeManager::Nvm && needs_runtime(step) {
            self.require_nvm()?;
        }

        let actions = match step {
            StepKind::Uninstall => return self.uninstall_actions(ctx),
            StepKind::Clean | StepKind::AwaitRuntime => Vec::new(),
            StepKind::Compile => {
                vec![self.package_manager(runtime, &["run", self.tools.compile_script.as_str()])]
            }
            StepKind::UseRuntime => match runtime.manager {
                RuntimeManager::None => Vec::new(),
                RuntimeManager::Nvm => vec![self.with_nvm_dir(ExecutionAction::new(
                    "bash",
                    ["-c", NVM_USE_SCRIPT, runtime.version.as_str()],
                ))],
            },
            StepKind::ToolVersion => vec![self.package_manager(runtime, &["-v"])],
            StepKind::InstallTools => self
                .tools
                .global
                .iter()
                .map(|tool| self.package_manager(runtime, &["install", "-g", tool.as_str()]))
                .collect(),
            StepKind::ListTools => vec![self.package_manager(runtime, &["list", "-g"])],
            StepKind::InstallDeps => vec![self.package_manager(runtime, &["install"])],
            StepKind::ListDeps => vec![self.package_manager(runtime, &["list"])],
            StepKind::Package => {
                vec![self.under_runtime(runtime, &self.tools.packager, &["package"])]
            }
            StepKind::Install => ctx
                .artifacts
                .iter()
                .map(|path| self.editor("--install-extension", &display_relative(ctx.base_path, path)))
                .collect(),
        };
        Ok(actions)
    }

    fn runtime_query(&self, runtime: &RuntimeSpec) -> ExecutionAction {
        self.under_runtime(runtime, &self.tools.runtime, &["--version"])
    }
}

/// Steps whose actions run under the pinned runtime.
fn needs_runtime(step: StepKind) -> bool {
    !matches!(
        step,
        StepKind::Uninstall | StepKind::Clean | StepKind::AwaitRuntime | StepKind::Install
    )
}

/// Artifact paths are shown relative to the project directory when possible.
fn display_relative(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}
