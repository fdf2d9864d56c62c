//! Constants used across the vsixpack workspace.

/// The filename for vsixpack's optional configuration.
pub const CONFIG_FILE: &str = "vsixpack.toml";

/// The manifest file for Node and VS Code extension projects.
pub const MANIFEST_NODE: &str = "package.json";

/// Glob matching packaged extension artifacts, relative to the project directory.
pub const DEFAULT_ARTIFACT_GLOB: &str = "*.vsix";

/// Default external tools.
pub const DEFAULT_EDITOR: &str = "code";
pub const DEFAULT_PACKAGE_MANAGER: &str = "npm";
pub const DEFAULT_PACKAGER: &str = "vsce";
pub const DEFAULT_RUNTIME_PROGRAM: &str = "node";
pub const DEFAULT_COMPILE_SCRIPT: &str = "compile";
pub const DEFAULT_GLOBAL_TOOLS: &[&str] = &["typescript", "@vscode/vsce"];

/// Runtime version requested when none is configured; nvm resolves it to the latest installed.
pub const DEFAULT_RUNTIME_VERSION: &str = "node";

pub const DEFAULT_SETTLE_MS: u64 = 1_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10_000;
