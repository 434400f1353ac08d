//! Aggregated, TOML-loadable configuration for every tunable named across
//! the component design — acceptance threshold, truncation limits, iteration
//! cap, branching toggle, workspace layout, and extension compile timeouts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Minimum validator score for acceptance without further reflection/repair.
    pub acceptance_threshold: f64,
    /// Hard cap on generate/validate/reflect/repair iterations per task.
    pub max_iterations: u32,
    /// Whether a failed iteration opens a `fix-iterN` branch before retrying.
    pub branching_enabled: bool,
    /// Default truncation line budget.
    pub truncate_max_lines: usize,
    /// Default truncation byte budget.
    pub truncate_max_bytes: usize,
    /// Seconds allotted to a single extension compile invocation.
    pub extension_compile_timeout_secs: u64,
    /// Workspace root; session/extension state lives under `<root>/.koda`.
    pub workspace: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 80.0,
            max_iterations: 3,
            branching_enabled: true,
            truncate_max_lines: 2_000,
            truncate_max_bytes: 50 * 1024,
            extension_compile_timeout_secs: 60,
            workspace: PathBuf::from("."),
        }
    }
}

impl CoreConfig {
    /// Load `<workspace>/.koda/config.toml` if present, overlaying compiled-in
    /// defaults for any field it does not mention. Absence of the file is not
    /// an error.
    pub fn load(workspace: &Path) -> CoreResult<Self> {
        let path = workspace.join(".koda").join("config.toml");
        if !path.exists() {
            return Ok(Self {
                workspace: workspace.to_path_buf(),
                ..Self::default()
            });
        }
        let text = std::fs::read_to_string(&path)?;
        let mut config: Self = toml::from_str(&text)
            .map_err(|e| crate::error::CoreError::invalid_source(path.display().to_string(), e.to_string()))?;
        config.workspace = workspace.to_path_buf();
        Ok(config)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.workspace.join(".koda").join("sessions")
    }

    pub fn extensions_dir(&self) -> PathBuf {
        self.workspace.join(".koda").join("extensions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.acceptance_threshold, 80.0);
        assert_eq!(cfg.max_iterations, 3);
        assert_eq!(cfg.truncate_max_lines, 2_000);
        assert_eq!(cfg.truncate_max_bytes, 50 * 1024);
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let cfg = CoreConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.acceptance_threshold, 80.0);
        assert_eq!(cfg.workspace, dir.path());
    }

    #[test]
    fn load_overlays_file_values() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".koda")).unwrap();
        std::fs::write(
            dir.path().join(".koda/config.toml"),
            "acceptance_threshold = 90.0\nmax_iterations = 5\n",
        )
        .unwrap();
        let cfg = CoreConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.acceptance_threshold, 90.0);
        assert_eq!(cfg.max_iterations, 5);
        assert_eq!(cfg.truncate_max_lines, 2_000);
    }
}
