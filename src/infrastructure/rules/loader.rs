use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::models::RuleDocument;
use crate::services::{RuleRegistry, RuleSet};

/// Loader for per-agent rule documents
pub struct RuleLoader {
    default_timeout_ms: u64,
}

impl RuleLoader {
    /// Create a loader; `default_timeout_ms` applies to webhook rules that declare none.
    pub fn new(default_timeout_ms: u64) -> Self {
        Self { default_timeout_ms }
    }

    /// Load and compile a single rule document
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<RuleSet> {
        let path = path.as_ref();
        debug!("Loading rule document from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rule document: {}", path.display()))?;

        self.load_from_yaml(&content)
            .with_context(|| format!("Invalid rule document: {}", path.display()))
    }

    /// Compile a rule document from a YAML string
    pub fn load_from_yaml(&self, yaml: &str) -> Result<RuleSet> {
        let document = RuleDocument::from_yaml_str(yaml).context("Failed to parse YAML rule document")?;
        let set = RuleSet::compile(&document, self.default_timeout_ms)?;
        info!(agent = %set.agent_id(), rules = set.len(), "Compiled rule document");
        Ok(set)
    }

    /// Load every `*.yaml` / `*.yml` document in `dir` into a fresh registry.
    ///
    /// A missing directory yields an empty registry. Two documents for the same
    /// agent are rejected.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<RuleRegistry> {
        let registry = RuleRegistry::new();
        let dir = dir.as_ref();
        if !dir.exists() {
            debug!("Rule directory {} does not exist", dir.display());
            return Ok(registry);
        }

        for path in Self::documents_in(dir)? {
            let set = self.load_file(&path)?;
            if registry.contains(set.agent_id()) {
                bail!(
                    "Duplicate rule document for agent '{}' in {}",
                    set.agent_id(),
                    path.display()
                );
            }
            registry.insert(set);
        }

        info!(agents = registry.len(), dir = %dir.display(), "Loaded rule documents");
        Ok(registry)
    }

    fn documents_in(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read rule directory: {}", dir.display()))?
        {
            let path = entry.context("Failed to read directory entry")?.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if path.is_file() && is_yaml {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TRADER: &str = r#"
agent_id: trader-7
rules:
  - name: margin_floor
    type: financial
    rule: "margin >= 0.2"
    severity: critical
  - name: kyc_check
    type: webhook
    url: http://localhost:9/kyc
"#;

    #[test]
    fn test_load_dir_collects_yaml_documents() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("trader.yaml"), TRADER).unwrap();
        fs::write(
            dir.path().join("reactor.yml"),
            "agent_id: reactor-1\nrules:\n  - name: cap\n    type: physical\n    rule: \"energy_out <= 100\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a rule document").unwrap();

        let registry = RuleLoader::new(100).load_dir(dir.path()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("trader-7").len(), 2);
        assert_eq!(registry.get("reactor-1").len(), 1);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = RuleLoader::new(100).load_dir(dir.path().join("absent")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_document_names_file_and_rule() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(
            &path,
            "agent_id: a\nrules:\n  - name: bad_expr\n    type: physical\n    rule: \"energy_out <=\"\n",
        )
        .unwrap();

        let err = RuleLoader::new(100).load_dir(dir.path()).unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("broken.yaml"));
        assert!(chain.contains("bad_expr"));
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), TRADER).unwrap();
        fs::write(dir.path().join("b.yaml"), TRADER).unwrap();
        let err = RuleLoader::new(100).load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("trader-7"));
    }
}
