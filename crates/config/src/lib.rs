//! Project configuration, state, and the shared atomic-write primitive used by
//! every file the project store owns.

mod atomic;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use atomic::{write_atomic, write_atomic_with_backup};

/// `security_level` governs both blocking thresholds and default scan depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Strict,
    Moderate,
    Relaxed,
}

impl Default for SecurityLevel {
    fn default() -> Self {
        SecurityLevel::Moderate
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityLevel::Strict => "strict",
            SecurityLevel::Moderate => "moderate",
            SecurityLevel::Relaxed => "relaxed",
        };
        f.write_str(s)
    }
}

impl FromStr for SecurityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(SecurityLevel::Strict),
            "moderate" => Ok(SecurityLevel::Moderate),
            "relaxed" => Ok(SecurityLevel::Relaxed),
            other => anyhow::bail!("unknown security level: {other} (use strict, moderate, or relaxed)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanDepth {
    Basic,
    Standard,
    Deep,
}

impl Default for ScanDepth {
    fn default() -> Self {
        ScanDepth::Standard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceVerdict {
    Compliant,
    PartialCompliance,
    RiskDetected,
    Unknown,
}

impl Default for ComplianceVerdict {
    fn default() -> Self {
        ComplianceVerdict::Unknown
    }
}

impl fmt::Display for ComplianceVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComplianceVerdict::Compliant => "compliant",
            ComplianceVerdict::PartialCompliance => "partial_compliance",
            ComplianceVerdict::RiskDetected => "risk_detected",
            ComplianceVerdict::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Declarative, project-scoped settings. Owned exclusively by the project store;
/// everything else receives read-only copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub security_level: SecurityLevel,
    #[serde(default = "default_true")]
    pub block_on_critical: bool,
    #[serde(default)]
    pub block_on_high: bool,
    #[serde(default)]
    pub block_on_medium: bool,
    #[serde(default = "default_true")]
    pub auto_remediation: bool,
    #[serde(default)]
    pub scan_depth: ScanDepth,
    #[serde(default = "default_true")]
    pub audit_enabled: bool,
    #[serde(default = "default_true")]
    pub compliance_checks: bool,
    #[serde(default)]
    pub template_type: Option<String>,
    #[serde(default)]
    pub user_preferences: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            security_level: SecurityLevel::default(),
            block_on_critical: true,
            block_on_high: false,
            block_on_medium: false,
            auto_remediation: true,
            scan_depth: ScanDepth::default(),
            audit_enabled: true,
            compliance_checks: true,
            template_type: None,
            user_preferences: HashMap::new(),
        }
    }
}

impl ProjectConfig {
    /// Defaults appropriate for a project state-detector recommendation. The
    /// recommendation only ever sets `security_level`; every other field keeps its
    /// own default regardless of recommended level, since blocking thresholds are a
    /// deliberate, separate user choice and must not be silently overridden by a
    /// level recommendation made at `init` time.
    pub fn recommended(level: SecurityLevel) -> Self {
        Self {
            security_level: level,
            ..Self::default()
        }
    }
}

/// Snapshot of last-verified project state, persisted to `state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    #[serde(default)]
    pub last_vcs_head: Option<String>,
    #[serde(default)]
    pub last_ignore_hash: Option<String>,
    #[serde(default)]
    pub compliance_status: ComplianceVerdict,
    pub init_timestamp: String,
    #[serde(default)]
    pub last_audit: Option<String>,
    #[serde(default)]
    pub cached_analysis: Option<serde_json::Value>,
}

impl ProjectState {
    pub fn new(init_timestamp: String) -> Self {
        Self {
            last_vcs_head: None,
            last_ignore_hash: None,
            compliance_status: ComplianceVerdict::default(),
            init_timestamp,
            last_audit: None,
            cached_analysis: None,
        }
    }
}

fn config_path(store_dir: &Path) -> std::path::PathBuf {
    store_dir.join("config.yaml")
}

fn state_path(store_dir: &Path) -> std::path::PathBuf {
    store_dir.join("state.json")
}

impl ProjectConfig {
    /// Missing file yields defaults. A corrupt primary falls back to the `.backup`
    /// sibling, then to defaults — never a hard failure.
    pub fn load(store_dir: &Path) -> Result<Self> {
        let path = config_path(store_dir);
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_yaml::from_str(&raw) {
                Ok(cfg) => Ok(cfg),
                Err(err) => {
                    tracing::warn!(error = %err, path = %path.display(), "config.yaml is corrupt, trying backup");
                    load_backup_or_default(&path)
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn save(&self, store_dir: &Path) -> Result<()> {
        let path = config_path(store_dir);
        let yaml = serde_yaml::to_string(self).context("serializing project config")?;
        write_atomic_with_backup(&path, yaml.as_bytes())
    }
}

fn load_backup_or_default<T>(primary: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    let backup = backup_path(primary);
    match std::fs::read_to_string(&backup) {
        Ok(raw) => serde_yaml::from_str(&raw)
            .or_else(|_| serde_json::from_str(&raw))
            .or_else(|_: serde_json::Error| Ok(T::default())),
        Err(_) => Ok(T::default()),
    }
}

fn backup_path(primary: &Path) -> std::path::PathBuf {
    let mut name = primary
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".backup");
    primary.with_file_name(name)
}

impl ProjectState {
    pub fn load(store_dir: &Path, init_timestamp: impl FnOnce() -> String) -> Result<Self> {
        let path = state_path(store_dir);
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => Ok(state),
                Err(err) => {
                    tracing::warn!(error = %err, path = %path.display(), "state.json is corrupt, trying backup");
                    match load_backup_state(&path) {
                        Some(state) => Ok(state),
                        None => Ok(Self::new(init_timestamp())),
                    }
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(init_timestamp())),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    pub fn save(&self, store_dir: &Path) -> Result<()> {
        let path = state_path(store_dir);
        let json = serde_json::to_string_pretty(self).context("serializing project state")?;
        write_atomic_with_backup(&path, json.as_bytes())
    }
}

fn load_backup_state(primary: &Path) -> Option<ProjectState> {
    let backup = backup_path(primary);
    let raw = std::fs::read_to_string(&backup).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Root directory for any future global (non project-scoped) GitUp preferences.
/// Not consulted by the enforcement core itself; exposed for a front-end to use,
/// matching the `dirs::config_dir()`-rooted convention used elsewhere in this
/// workspace.
pub fn global_config_dir() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("gitup"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_blocks_only_critical() {
        let cfg = ProjectConfig::default();
        assert!(cfg.block_on_critical);
        assert!(!cfg.block_on_high);
        assert!(!cfg.block_on_medium);
    }

    #[test]
    fn security_level_round_trips_through_str() {
        assert_eq!(SecurityLevel::from_str("strict").unwrap(), SecurityLevel::Strict);
        assert!(SecurityLevel::from_str("bogus").is_err());
    }

    #[test]
    fn load_missing_config_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.security_level, SecurityLevel::Moderate);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ProjectConfig::default();
        cfg.security_level = SecurityLevel::Strict;
        cfg.template_type = Some("python-cli".to_string());
        cfg.save(dir.path()).unwrap();

        let loaded = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.security_level, SecurityLevel::Strict);
        assert_eq!(loaded.template_type.as_deref(), Some("python-cli"));
    }

    #[test]
    fn corrupt_config_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = ProjectConfig::default();
        cfg.security_level = SecurityLevel::Strict;
        cfg.save(dir.path()).unwrap();

        // A second save leaves a readable .backup sibling with the first value,
        // then corrupt the primary directly to simulate a torn write.
        cfg.security_level = SecurityLevel::Relaxed;
        cfg.save(dir.path()).unwrap();
        std::fs::write(config_path(dir.path()), b"not: [valid yaml").unwrap();

        let loaded = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.security_level, SecurityLevel::Strict);
    }

    #[test]
    fn state_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let state = ProjectState::new("2026-01-01T00:00:00Z".to_string());
        state.save(dir.path()).unwrap();
        let loaded = ProjectState::load(dir.path(), || unreachable!()).unwrap();
        assert_eq!(loaded.init_timestamp, "2026-01-01T00:00:00Z");
        assert_eq!(loaded.compliance_status, ComplianceVerdict::Unknown);
    }
}
