use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::artifact;
use crate::constants::*;
use crate::runtime::{PollConfig, RuntimeManager, RuntimeSpec};
use crate::step::{OnFailure, StepKind};

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct VsixpackConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub steps: BTreeMap<StepKind, StepConfig>,
}

impl VsixpackConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config: {}", path.display()))
    }

    /// Loads `path` when it exists and falls back to defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.is_file() {
            Self::load_from_file(path)
        } else {
            debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let cfg = toml::from_str::<Self>(text).context("failed to parse TOML config")?;
        artifact::validate_pattern(&cfg.project.artifact)
            .with_context(|| format!("invalid artifact pattern '{}'", cfg.project.artifact))?;
        Ok(cfg)
    }

    pub fn runtime_spec(&self) -> RuntimeSpec {
        RuntimeSpec {
            manager: self.runtime.manager,
            version: self.runtime.version.clone(),
        }
    }

    pub fn step(&self, kind: StepKind) -> StepConfig {
        self.steps.get(&kind).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Glob for packaged artifacts, relative to the project directory.
    #[serde(default = "default_artifact")]
    pub artifact: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            artifact: default_artifact(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub manager: RuntimeManager,
    #[serde(default = "default_runtime_version")]
    pub version: String,
    /// Overrides `$NVM_DIR` for the nvm wrapper.
    pub nvm_dir: Option<PathBuf>,
    #[serde(default)]
    pub poll: PollSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            manager: RuntimeManager::default(),
            version: default_runtime_version(),
            nvm_dir: None,
            poll: PollSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSettings {
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            settle_ms: DEFAULT_SETTLE_MS,
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
        }
    }
}

impl PollSettings {
    pub fn to_poll_config(self) -> PollConfig {
        PollConfig {
            settle: Duration::from_millis(self.settle_ms),
            interval: Duration::from_millis(self.interval_ms.max(1)),
            timeout: Duration::from_millis(self.timeout_ms.max(self.settle_ms)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    #[serde(default = "default_editor")]
    pub editor: String,
    #[serde(default = "default_package_manager")]
    pub package_manager: String,
    #[serde(default = "default_packager")]
    pub packager: String,
    /// Program whose `--version` reports the active runtime.
    #[serde(default = "default_runtime_program")]
    pub runtime: String,
    #[serde(default = "default_compile_script")]
    pub compile_script: String,
    /// Global CLI tools installed before packaging, one install per entry.
    #[serde(default = "default_global_tools")]
    pub global: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            editor: default_editor(),
            package_manager: default_package_manager(),
            packager: default_packager(),
            runtime: default_runtime_program(),
            compile_script: default_compile_script(),
            global: default_global_tools(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Replaces the step's built-in failure policy.
    pub on_failure: Option<OnFailure>,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_failure: None,
        }
    }
}

fn default_artifact() -> String {
    DEFAULT_ARTIFACT_GLOB.to_string()
}

fn default_runtime_version() -> String {
    DEFAULT_RUNTIME_VERSION.to_string()
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

fn default_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

fn default_editor() -> String {
    DEFAULT_EDITOR.to_string()
}

fn default_package_manager() -> String {
    DEFAULT_PACKAGE_MANAGER.to_string()
}

fn default_packager() -> String {
    DEFAULT_PACKAGER.to_string()
}

fn default_runtime_program() -> String {
    DEFAULT_RUNTIME_PROGRAM.to_string()
}

fn default_compile_script() -> String {
    DEFAULT_COMPILE_SCRIPT.to_string()
}

fn default_global_tools() -> Vec<String> {
    DEFAULT_GLOBAL_TOOLS.iter().map(|s| (*s).to_string()).collect()
}

fn default_enabled() -> bool {
    true
}
