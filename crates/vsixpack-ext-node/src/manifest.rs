use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use vsixpack_core::constants::MANIFEST_NODE;

/// The fields of `package.json` that identify a VS Code extension.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtensionManifest {
    pub name: String,
    pub publisher: Option<String>,
}

impl ExtensionManifest {
    /// Reads `package.json` from `base_path`; `None` when the file is absent.
    pub fn load(base_path: &Path) -> Result<Option<Self>> {
        let path = base_path.join(MANIFEST_NODE);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let manifest = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// `publisher.name`, the identifier the editor knows the extension by.
    pub fn identifier(&self) -> Option<String> {
        self.publisher
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|publisher| format!("{}.{}", publisher, self.name))
    }
}
