//! Tracks the user's ignore file without ever modifying it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::pattern_catalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Unchanged,
    FirstScan,
    HashMismatch,
    Deleted,
    NoIgnore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityImpact {
    ResolvesViolations,
    CreatesExposures,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternChange {
    pub pattern: String,
    pub impact: SecurityImpact,
    pub global_exception_match: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IgnoreDelta {
    pub added_patterns: Vec<String>,
    pub removed_patterns: Vec<String>,
    pub security_changes: Vec<PatternChange>,
    pub violations_resolved: usize,
    pub new_exposures: usize,
    pub global_exceptions_matched: Vec<String>,
}

impl IgnoreDelta {
    pub fn has_changes(&self) -> bool {
        !self.added_patterns.is_empty() || !self.removed_patterns.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GlobalExceptionsFile {
    patterns: Vec<String>,
    last_updated: String,
}

pub struct IgnoreMonitor {
    ignore_path: PathBuf,
    shadow_ignore_path: PathBuf,
    baseline_path: PathBuf,
    hash_path: PathBuf,
    delta_log_path: PathBuf,
    global_exceptions_path: PathBuf,
}

impl IgnoreMonitor {
    pub fn new(project_root: &Path, store_dir: &Path) -> Self {
        Self {
            ignore_path: project_root.join(".gitignore"),
            shadow_ignore_path: store_dir.join("shadow_ignore"),
            baseline_path: store_dir.join("gi_baseline.dat"),
            hash_path: store_dir.join("gi_baseline.hash"),
            delta_log_path: store_dir.join("gi_changes.log"),
            global_exceptions_path: store_dir.join("global_exceptions.json"),
        }
    }

    /// Matches `rel_path` against the patterns currently in either the user's
    /// `.gitignore` or the shadow ignore file. Reads both files fresh on every
    /// call, independent of the change-tracking baseline, so a manual edit to
    /// either file is reflected immediately.
    pub fn is_path_ignored(&self, rel_path: &str) -> bool {
        let user = parse_patterns(&self.ignore_path);
        let shadow = parse_patterns(&self.shadow_ignore_path);
        user.iter().chain(shadow.iter()).any(|pattern| glob_matches(pattern, rel_path))
    }

    pub fn detect_changes(&self) -> Result<(bool, ChangeReason)> {
        let current_exists = self.ignore_path.exists();
        let baseline_exists = self.hash_path.exists();

        if !current_exists && !baseline_exists {
            return Ok((false, ChangeReason::NoIgnore));
        }
        if !current_exists && baseline_exists {
            return Ok((true, ChangeReason::Deleted));
        }
        if current_exists && !baseline_exists {
            return Ok((true, ChangeReason::FirstScan));
        }

        let current_hash = hash_file(&self.ignore_path)?;
        let stored_hash = std::fs::read_to_string(&self.hash_path)
            .with_context(|| format!("reading {}", self.hash_path.display()))?;
        if current_hash.trim() == stored_hash.trim() {
            Ok((false, ChangeReason::Unchanged))
        } else {
            Ok((true, ChangeReason::HashMismatch))
        }
    }

    pub fn analyze_delta(&self) -> Result<IgnoreDelta> {
        let current = parse_patterns(&self.ignore_path);
        let baseline = parse_patterns(&self.baseline_path);

        let added: Vec<String> = current.difference(&baseline).cloned().collect();
        let removed: Vec<String> = baseline.difference(&current).cloned().collect();

        let global_exceptions = self.global_exceptions().unwrap_or_default();
        let category_globs = pattern_catalog::catalog();

        let mut security_changes = Vec::new();
        let mut violations_resolved = 0usize;
        let mut new_exposures = 0usize;
        let mut global_exceptions_matched = Vec::new();

        for pattern in &added {
            let is_security = matches_any_category(pattern, &category_globs);
            let impact = if is_security {
                violations_resolved += 1;
                SecurityImpact::ResolvesViolations
            } else {
                SecurityImpact::Neutral
            };
            let exc_match = global_exceptions
                .iter()
                .find(|exc| glob_matches(exc, pattern))
                .cloned();
            if let Some(ref m) = exc_match {
                global_exceptions_matched.push(m.clone());
            }
            security_changes.push(PatternChange {
                pattern: pattern.clone(),
                impact,
                global_exception_match: exc_match,
            });
        }
        for pattern in &removed {
            let is_security = matches_any_category(pattern, &category_globs);
            let impact = if is_security {
                new_exposures += 1;
                SecurityImpact::CreatesExposures
            } else {
                SecurityImpact::Neutral
            };
            let exc_match = global_exceptions
                .iter()
                .find(|exc| glob_matches(exc, pattern))
                .cloned();
            if let Some(ref m) = exc_match {
                global_exceptions_matched.push(m.clone());
            }
            security_changes.push(PatternChange {
                pattern: pattern.clone(),
                impact,
                global_exception_match: exc_match,
            });
        }

        let delta = IgnoreDelta {
            added_patterns: added,
            removed_patterns: removed,
            security_changes,
            violations_resolved,
            new_exposures,
            global_exceptions_matched,
        };
        self.log_delta(&delta)?;
        Ok(delta)
    }

    pub fn update_baseline(&self) -> Result<()> {
        if !self.ignore_path.exists() {
            let _ = std::fs::remove_file(&self.baseline_path);
            let _ = std::fs::remove_file(&self.hash_path);
            return Ok(());
        }
        if let Some(parent) = self.baseline_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&self.ignore_path, &self.baseline_path)
            .with_context(|| format!("copying {} to baseline", self.ignore_path.display()))?;
        let hash = hash_file(&self.ignore_path)?;
        std::fs::write(&self.hash_path, hash).context("writing baseline hash")?;
        Ok(())
    }

    pub fn global_exception_matches(&self, path: &str) -> (bool, Option<String>) {
        let exceptions = self.global_exceptions().unwrap_or_default();
        for pattern in &exceptions {
            if glob_matches(pattern, path) {
                return (true, Some(pattern.clone()));
            }
        }
        (false, None)
    }

    pub fn global_exceptions(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(&self.global_exceptions_path) {
            Ok(raw) => {
                let file: GlobalExceptionsFile = serde_json::from_str(&raw)
                    .context("parsing global_exceptions.json")?;
                Ok(file.patterns)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(pattern_catalog::default_global_exceptions())
            }
            Err(err) => Err(err).context("reading global_exceptions.json"),
        }
    }

    pub fn add_global_exception(&self, pattern: &str) -> Result<()> {
        let mut exceptions = self.global_exceptions()?;
        if !exceptions.iter().any(|p| p == pattern) {
            exceptions.push(pattern.to_string());
        }
        self.save_global_exceptions(&exceptions)
    }

    pub fn remove_global_exception(&self, pattern: &str) -> Result<()> {
        let mut exceptions = self.global_exceptions()?;
        exceptions.retain(|p| p != pattern);
        self.save_global_exceptions(&exceptions)
    }

    fn save_global_exceptions(&self, patterns: &[String]) -> Result<()> {
        let file = GlobalExceptionsFile {
            patterns: patterns.to_vec(),
            last_updated: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        gitup_config::write_atomic_with_backup(&self.global_exceptions_path, json.as_bytes())
    }

    /// Always returns `can_proceed = true`; the enforcer, not the monitor,
    /// decides blocking.
    pub fn pre_operation_check(&self) -> Result<(bool, IgnoreDelta)> {
        let delta = self.analyze_delta()?;
        for change in &delta.security_changes {
            match change.impact {
                SecurityImpact::ResolvesViolations => {
                    tracing::info!(pattern = %change.pattern, "ignore pattern added, resolves a security category");
                }
                SecurityImpact::CreatesExposures => {
                    tracing::warn!(pattern = %change.pattern, "ignore pattern removed, creates a security exposure");
                }
                SecurityImpact::Neutral => {}
            }
        }
        Ok((true, delta))
    }

    fn log_delta(&self, delta: &IgnoreDelta) -> Result<()> {
        if delta.added_patterns.is_empty() && delta.removed_patterns.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.delta_log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "added": delta.added_patterns.len(),
            "removed": delta.removed_patterns.len(),
            "violations_resolved": delta.violations_resolved,
            "new_exposures": delta.new_exposures,
            "delta": delta,
        });
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.delta_log_path)
            .with_context(|| format!("opening {}", self.delta_log_path.display()))?;
        use std::io::Write;
        writeln!(file, "{}", serde_json::to_string(&line)?)?;
        Ok(())
    }
}

fn hash_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Blank lines and comment lines (leading `#`) are dropped; a leading `./` is
/// stripped; trailing whitespace is stripped. Missing files parse to an empty set.
fn parse_patterns(path: &Path) -> BTreeSet<String> {
    std::fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .map(|l| l.trim_end())
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(|l| l.strip_prefix("./").unwrap_or(l).to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn matches_any_category(pattern: &str, catalog: &[pattern_catalog::PatternEntry]) -> bool {
    catalog.iter().any(|entry| {
        glob_matches(entry.glob, pattern) || glob_matches(pattern, entry.glob)
    })
}

pub fn glob_matches(pattern: &str, candidate: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(candidate))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_ignore_no_baseline_reports_no_ignore() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), dir.path());
        let (changed, reason) = monitor.detect_changes().unwrap();
        assert!(!changed);
        assert_eq!(reason, ChangeReason::NoIgnore);
    }

    #[test]
    fn first_scan_then_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), dir.path());

        let (changed, reason) = monitor.detect_changes().unwrap();
        assert!(changed);
        assert_eq!(reason, ChangeReason::FirstScan);

        monitor.update_baseline().unwrap();
        let (changed, reason) = monitor.detect_changes().unwrap();
        assert!(!changed);
        assert_eq!(reason, ChangeReason::Unchanged);
    }

    #[test]
    fn analyze_delta_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), dir.path());
        monitor.update_baseline().unwrap();

        let delta1 = monitor.analyze_delta().unwrap();
        assert!(!delta1.has_changes());
        let delta2 = monitor.analyze_delta().unwrap();
        assert!(!delta2.has_changes());
    }

    #[test]
    fn adding_security_pattern_resolves_violation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "").unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), dir.path());
        monitor.update_baseline().unwrap();

        std::fs::write(dir.path().join(".gitignore"), "*.env\n").unwrap();
        let delta = monitor.analyze_delta().unwrap();
        assert_eq!(delta.violations_resolved, 1);
        assert_eq!(delta.added_patterns, vec!["*.env".to_string()]);
    }

    #[test]
    fn global_exceptions_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), dir.path());
        let exceptions = monitor.global_exceptions().unwrap();
        assert!(exceptions.contains(&"*.bak".to_string()));
    }

    #[test]
    fn add_and_remove_global_exception_persists() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), dir.path());
        monitor.add_global_exception("*.sample").unwrap();
        assert!(monitor.global_exceptions().unwrap().contains(&"*.sample".to_string()));
        monitor.remove_global_exception("*.sample").unwrap();
        assert!(!monitor.global_exceptions().unwrap().contains(&"*.sample".to_string()));
    }
}
