use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::constants::*;

/// Resolves the project directory every step runs in.
///
/// Precedence: an explicit project directory, then the directory holding an
/// explicitly given config file, then the nearest ancestor of `cwd` (itself
/// included) holding `vsixpack.toml` or `package.json`, then `cwd`. The
/// result is canonical.
pub fn resolve_base_path(
    explicit: Option<&Path>,
    config_path: Option<&Path>,
    cwd: &Path,
) -> Result<PathBuf> {
    let candidate = match (explicit, config_path) {
        (Some(dir), _) => cwd.join(dir),
        (None, Some(config)) => {
            let config = cwd.join(config);
            match config.parent() {
                Some(parent) => parent.to_path_buf(),
                None => cwd.to_path_buf(),
            }
        }
        (None, None) => find_project_root(cwd).unwrap_or_else(|| cwd.to_path_buf()),
    };

    let resolved = candidate
        .canonicalize()
        .with_context(|| format!("project directory '{}' is not accessible", candidate.display()))?;
    if !resolved.is_dir() {
        bail!("project path '{}' is not a directory", resolved.display());
    }
    Ok(resolved)
}

/// The closest directory, starting at `start`, that holds a project marker.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE).is_file() || dir.join(MANIFEST_NODE).is_file())
        .map(Path::to_path_buf)
}

/// Where the config file lives when none is given explicitly.
pub fn default_config_path(base_path: &Path) -> PathBuf {
    base_path.join(CONFIG_FILE)
}

/// Whether `base_path` looks like a Node-based extension project.
pub fn has_node_manifest(base_path: &Path) -> bool {
    base_path.join(MANIFEST_NODE).exists()
}
