//! Persisted per-resource state.
//!
//! Each managed deployment keeps one JSON file in the state directory,
//! named after the resource definition.

use crate::paths;
use anyhow::{Context, Result, bail};
use catalogkit::RequestRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// What is known about one deployment between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub name: String,

    /// Definition file the state was last written from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<PathBuf>,

    #[serde(flatten)]
    pub record: RequestRecord,

    /// Last time the state was saved
    pub last_updated: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            definition: None,
            record: RequestRecord::default(),
            last_updated: Utc::now(),
        }
    }

    /// Path of the state file for `name`
    pub fn path_for(name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(paths::state_dir()?.join(format!("{name}.json")))
    }

    /// Load state saved at `path`, or a fresh state if none was saved
    pub fn load_from(path: &Path, name: &str) -> Result<Self> {
        if !path.exists() {
            log::debug!("No state for '{name}' at {}, starting fresh", path.display());
            return Ok(Self::new(name));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Stamp `last_updated` and write the state file
    pub fn save_to(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Utc::now();
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize state to JSON")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Delete the state file; missing files are fine
    pub fn remove_at(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove state file: {}", path.display()))?;
            log::debug!("Removed state file {}", path.display());
        }
        Ok(())
    }

    /// Whether a deployment is currently tracked
    pub fn is_tracked(&self) -> bool {
        self.record.request_id.is_some()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        bail!("Invalid resource name '{name}'");
    }
    if name.contains(['/', '\\']) {
        bail!("Resource name '{name}' must not contain path separators");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalogkit::{Phase, Scalar};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_is_fresh() {
        let dir = TempDir::new().unwrap();
        let state = ResourceState::load_from(&dir.path().join("web.json"), "web").unwrap();
        assert_eq!(state.name, "web");
        assert!(!state.is_tracked());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("web.json");

        let mut state = ResourceState::new("web");
        state.definition = Some(PathBuf::from("defs/web.toml"));
        state.record.request_id = Some("req-1".to_string());
        state.record.request_status = Some(Phase::Successful);
        state.record.resource_configuration.insert(
            "web".to_string(),
            BTreeMap::from([("cpu".to_string(), Scalar::from(2_i64))]),
        );
        let before = state.last_updated;
        state.save_to(&path).unwrap();
        assert!(state.last_updated >= before);

        let loaded = ResourceState::load_from(&path, "web").unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.is_tracked());
    }

    #[test]
    fn test_record_fields_are_top_level() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");

        let mut state = ResourceState::new("db");
        state.record.request_id = Some("req-9".to_string());
        state.save_to(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["request_id"], "req-9");
        assert!(raw.get("last_updated").is_some());
    }

    #[test]
    fn test_remove_at() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web.json");
        ResourceState::new("web").save_to(&path).unwrap();

        ResourceState::remove_at(&path).unwrap();
        assert!(!path.exists());
        ResourceState::remove_at(&path).unwrap();
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web.json");
        fs::write(&path, "{not json").unwrap();

        let err = ResourceState::load_from(&path, "web").unwrap_err();
        assert!(err.to_string().contains("Failed to parse state file"));
    }

    #[test]
    fn test_names_with_separators_rejected() {
        assert!(validate_name("web").is_ok());
        assert!(validate_name("../web").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("").is_err());
    }
}
