use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use tracing::{info, instrument, warn};

use vsixpack_core::project;
use vsixpack_core::VsixpackConfig;
use vsixpack_ext_node::ExtensionManifest;

const CONFIG_TEMPLATE: &str = r#"# vsixpack configuration. Every key is optional; the values below are the defaults.

[project]
# Packaged artifacts, relative to this directory.
artifact = "*.vsix"

[runtime]
# "nvm" applies the pinned version to every npm/vsce/node invocation; "none" uses PATH.
manager = "nvm"
version = "node"

[runtime.poll]
settle_ms = 1000
interval_ms = 250
timeout_ms = 10000

[tools]
editor = "code"
package_manager = "npm"
packager = "vsce"
runtime = "node"
compile_script = "compile"
global = ["typescript", "@vscode/vsce"]

# Per-step overrides. Steps: uninstall, clean, compile, use-runtime,
# await-runtime, tool-version, install-tools, list-tools, install-deps,
# list-deps, package, install.
#
# [steps.list-deps]
# enabled = false
#
# [steps.uninstall]
# on_failure = "ignore"   # halt | continue | ignore
"#;

/// Runs the `init` command to write a default `vsixpack.toml`.
#[instrument]
pub fn run(config_path: &Path, base_path: &Path, force: bool) -> Result<()> {
    if !project::has_node_manifest(base_path) {
        warn!(
            "no package.json in {}; vsixpack expects a Node-based extension project",
            base_path.display()
        );
    } else if let Some(manifest) = ExtensionManifest::load(base_path)? {
        match manifest.identifier() {
            Some(id) => info!("detected extension {}", id),
            None => warn!("package.json has no publisher; uninstall will target stale artifacts"),
        }
    }

    write_if_absent(config_path, CONFIG_TEMPLATE, force)
        .with_context(|| format!("failed to write '{}'", config_path.display()))?;

    // The template must stay loadable.
    VsixpackConfig::load_from_file(config_path)?;

    info!("init complete: config={}", config_path.display());
    println!("next: run 'vsixpack plan'");

    Ok(())
}

fn write_if_absent(path: &Path, content: &str, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "'{}' already exists. Re-run with --force to overwrite",
            path.display()
        ));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }

    fs::write(path, content).with_context(|| format!("failed to write file '{}'", path.display()))
}
