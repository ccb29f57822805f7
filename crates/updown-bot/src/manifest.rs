//! Launch manifest.
//!
//! A JSON file naming the strategies to run and the process risk
//! budget. Loaded once at start and treated as immutable. Writes are
//! atomic (write-temp, rename); reads reject paths that escape the
//! project root.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The launch manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchManifest {
    pub strategies: Vec<String>,
    pub position_size_dollars: Decimal,
    pub max_exposure_dollars: Decimal,
    pub symbols: Vec<String>,
    pub kill_switch_enabled: bool,
}

impl LaunchManifest {
    /// Schema checks beyond shape: positive sizing, cap above size,
    /// non-empty lists.
    pub fn validate(&self, known_strategies: &[String]) -> AppResult<()> {
        if self.strategies.is_empty() {
            return Err(AppError::ManifestInvalidSchema(
                "strategies must be non-empty".into(),
            ));
        }
        if self.position_size_dollars <= Decimal::ZERO {
            return Err(AppError::ManifestInvalidSchema(
                "position_size_dollars must be > 0".into(),
            ));
        }
        if self.max_exposure_dollars <= self.position_size_dollars {
            return Err(AppError::ManifestInvalidSchema(
                "max_exposure_dollars must exceed position_size_dollars".into(),
            ));
        }
        if self.symbols.is_empty() {
            return Err(AppError::ManifestInvalidSchema(
                "symbols must be non-empty".into(),
            ));
        }
        for name in &self.strategies {
            if !known_strategies.contains(name) {
                return Err(AppError::ManifestUnknownStrategy(name.clone()));
            }
        }
        Ok(())
    }

    /// Load from `path`, which must resolve inside `project_root`.
    pub fn load(path: &Path, project_root: &Path) -> AppResult<Self> {
        let resolved = resolve_inside(path, project_root)?;
        let text = std::fs::read_to_string(&resolved)
            .map_err(|e| AppError::ManifestNotFound(format!("{}: {e}", resolved.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| AppError::ManifestInvalidSchema(e.to_string()))
    }

    /// Atomic save: write-temp, rename.
    pub fn save(&self, path: &Path, project_root: &Path) -> AppResult<()> {
        let resolved = resolve_inside(path, project_root)?;
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| AppError::ManifestWriteFailed(e.to_string()))?;
        let tmp = resolved.with_extension("json.tmp");
        std::fs::write(&tmp, &json)
            .map_err(|e| AppError::ManifestWriteFailed(e.to_string()))?;
        std::fs::rename(&tmp, &resolved)
            .map_err(|e| AppError::ManifestWriteFailed(e.to_string()))?;
        Ok(())
    }
}

/// Resolve a manifest path and refuse anything escaping the root.
fn resolve_inside(path: &Path, project_root: &Path) -> AppResult<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    };
    // Normalize without touching the filesystem so missing files can
    // still be rejected or created.
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::ManifestNotFound(
                        "manifest path escapes the project root".into(),
                    ));
                }
            }
            std::path::Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    if !normalized.starts_with(project_root) {
        return Err(AppError::ManifestNotFound(
            "manifest path escapes the project root".into(),
        ));
    }
    Ok(normalized)
}
