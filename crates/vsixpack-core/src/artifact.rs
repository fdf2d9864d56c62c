//! Packaged artifact lookup and cleanup with glob pattern support.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::StepError;

/// Expands `pattern` relative to `base` and returns matching files, sorted.
///
/// Directories are never matched. No match yields an empty list.
pub fn find_artifacts(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, StepError> {
    let full_pattern = anchored_pattern(base, pattern)?;

    let mut entries: Vec<PathBuf> = glob::glob(&full_pattern)
        .map_err(|e| StepError::Io {
            context: format!("invalid artifact pattern '{pattern}'"),
            message: e.to_string(),
        })?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    debug!("pattern '{}' matched {} artifact(s)", pattern, entries.len());
    Ok(entries)
}

/// Deletes every artifact matching `pattern`; a no-op when nothing matches.
pub fn remove_artifacts(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, StepError> {
    let stale = find_artifacts(base, pattern)?;
    for path in &stale {
        fs::remove_file(path)
            .map_err(|e| StepError::io(format!("failed to remove '{}'", path.display()), e))?;
        info!(target: "vsixpack", "removed {}", path.display());
    }
    Ok(stale)
}

/// Returns the most recently modified artifact matching `pattern`.
pub fn newest_artifact(base: &Path, pattern: &str) -> Result<PathBuf, StepError> {
    find_artifacts(base, pattern)?
        .into_iter()
        .max_by_key(|p| p.metadata().and_then(|m| m.modified()).ok())
        .ok_or_else(|| StepError::ArtifactNotProduced {
            pattern: pattern.to_string(),
        })
}

/// Checks that `pattern` is a valid glob.
pub fn validate_pattern(pattern: &str) -> Result<(), glob::PatternError> {
    glob::Pattern::new(pattern).map(|_| ())
}

fn anchored_pattern(base: &Path, pattern: &str) -> Result<String, StepError> {
    let base_text = base.to_str().ok_or_else(|| StepError::Io {
        context: "artifact lookup".to_string(),
        message: format!("project path '{}' is not valid UTF-8", base.display()),
    })?;
    let escaped = glob::Pattern::escape(base_text);
    Ok(format!(
        "{}/{}",
        escaped.trim_end_matches('/'),
        pattern.trim_start_matches("./")
    ))
}
