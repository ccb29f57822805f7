//! Migrations preflight.
//!
//! Migration files are named `NNN-*.sql` with at least three digits.
//! Applied versions live in the `schema_migrations` table; preflight
//! reports files not yet applied and applied versions with no file.

use crate::error::{StoreError, StoreResult};
use std::collections::BTreeSet;
use std::path::Path;

/// Preflight result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// On disk but not applied.
    pub missing: Vec<String>,
    /// Applied but not on disk.
    pub extra: Vec<String>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

/// True for valid migration file names: `NNN-*.sql`, N >= 3 digits.
fn is_migration_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".sql") else {
        return false;
    };
    let Some((digits, rest)) = stem.split_once('-') else {
        return false;
    };
    digits.len() >= 3 && digits.chars().all(|c| c.is_ascii_digit()) && !rest.is_empty()
}

/// Scan a migrations directory, sorted by name.
pub fn scan_migrations_dir(dir: &Path) -> StoreResult<Vec<String>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| StoreError::Migration(format!("cannot read {}: {e}", dir.display())))?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_migration_name(name))
        .collect();
    names.sort();
    Ok(names)
}

/// Compare on-disk migrations against applied versions.
pub fn preflight_report(on_disk: &[String], applied: &[String]) -> MigrationReport {
    let disk: BTreeSet<&String> = on_disk.iter().collect();
    let applied_set: BTreeSet<&String> = applied.iter().collect();

    MigrationReport {
        missing: disk
            .difference(&applied_set)
            .map(|s| s.to_string())
            .collect(),
        extra: applied_set
            .difference(&disk)
            .map(|s| s.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_name_format() {
        assert!(is_migration_name("001-strategies.sql"));
        assert!(is_migration_name("0001-longer.sql"));
        assert!(!is_migration_name("01-too-short.sql"));
        assert!(!is_migration_name("001-strategies.txt"));
        assert!(!is_migration_name("001-.sql"));
        assert!(!is_migration_name("abc-strategies.sql"));
        assert!(!is_migration_name("001_underscore.sql"));
    }

    #[test]
    fn test_scan_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["002-b.sql", "001-a.sql", "README.md", "01-bad.sql"] {
            std::fs::write(dir.path().join(name), "-- sql").unwrap();
        }
        let names = scan_migrations_dir(dir.path()).unwrap();
        assert_eq!(names, vec!["001-a.sql", "002-b.sql"]);
    }

    #[test]
    fn test_preflight_clean() {
        let disk = vec!["001-a.sql".to_string(), "002-b.sql".to_string()];
        let report = preflight_report(&disk, &disk.clone());
        assert!(report.is_clean());
    }

    #[test]
    fn test_preflight_missing_and_extra() {
        let disk = vec!["001-a.sql".to_string(), "002-b.sql".to_string()];
        let applied = vec!["001-a.sql".to_string(), "009-gone.sql".to_string()];
        let report = preflight_report(&disk, &applied);
        assert_eq!(report.missing, vec!["002-b.sql"]);
        assert_eq!(report.extra, vec!["009-gone.sql"]);
        assert!(!report.is_clean());
    }
}
