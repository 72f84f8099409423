//! Gate that turns a set of unresolved blocking violations into a hard stop
//! for a named operation. Persists the last-known violation set to
//! `violations.json` so a later `gitup security review` can recall what
//! blocked an operation without re-scanning.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::GitUpError;
use crate::risk::SecurityRisk;

#[derive(Debug, Serialize, Deserialize)]
struct ViolationsFile {
    timestamp: String,
    security_level: gitup_config::SecurityLevel,
    violations: Vec<SecurityRisk>,
}

pub struct Enforcer {
    violations_path: PathBuf,
}

impl Enforcer {
    pub fn new(store_dir: &Path) -> Self {
        Self {
            violations_path: store_dir.join("violations.json"),
        }
    }

    pub fn check_violations(&self) -> Result<Vec<SecurityRisk>> {
        match std::fs::read_to_string(&self.violations_path) {
            Ok(raw) => {
                let file: ViolationsFile = serde_json::from_str(&raw).context("parsing violations.json")?;
                Ok(file.violations)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err).with_context(|| format!("reading {}", self.violations_path.display())),
        }
    }

    pub fn save_violations(&self, violations: &[SecurityRisk], security_level: gitup_config::SecurityLevel) -> Result<()> {
        let file = ViolationsFile {
            timestamp: chrono::Utc::now().to_rfc3339(),
            security_level,
            violations: violations.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file).context("serializing violations")?;
        gitup_config::write_atomic_with_backup(&self.violations_path, json.as_bytes())
    }

    /// Removes `violations.json` entirely rather than persisting an empty set,
    /// so a later `check_violations` sees the same "nothing recorded yet"
    /// state as a project that was never scanned.
    pub fn clear_violations(&self) -> Result<()> {
        match std::fs::remove_file(&self.violations_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("removing {}", self.violations_path.display())),
        }
    }

    /// Blocks `operation` if there are any persisted violations. The caller is
    /// expected to have just run a fresh scan and called [`Self::save_violations`]
    /// with its blocking subset before calling this.
    pub fn enforce(&self, operation: &str) -> Result<(), GitUpError> {
        let violations = self.check_violations().unwrap_or_default();
        if violations.is_empty() {
            return Ok(());
        }
        tracing::warn!(operation, count = violations.len(), "operation blocked by unresolved security violations");
        Err(GitUpError::SecurityViolation {
            operation: operation.to_string(),
            count: violations.len(),
            violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{SecurityRiskLevel, SecurityRiskType};

    fn sample_risk() -> SecurityRisk {
        SecurityRisk::new(
            ".env".to_string(),
            "*.env".to_string(),
            SecurityRiskType::SecretFile,
            false,
            "looks like a secret".to_string(),
            "ignore it".to_string(),
            10,
            None,
        )
    }

    #[test]
    fn no_violations_allows_operation() {
        let dir = tempfile::tempdir().unwrap();
        let enforcer = Enforcer::new(dir.path());
        assert!(enforcer.enforce("commit").is_ok());
    }

    #[test]
    fn persisted_violations_block_operation() {
        let dir = tempfile::tempdir().unwrap();
        let enforcer = Enforcer::new(dir.path());
        enforcer
            .save_violations(&[sample_risk()], gitup_config::SecurityLevel::Strict)
            .unwrap();

        let err = enforcer.enforce("commit").unwrap_err();
        assert_eq!(err.violations().unwrap().len(), 1);
    }

    #[test]
    fn clear_violations_unblocks() {
        let dir = tempfile::tempdir().unwrap();
        let enforcer = Enforcer::new(dir.path());
        enforcer
            .save_violations(&[sample_risk()], gitup_config::SecurityLevel::Strict)
            .unwrap();
        enforcer.clear_violations().unwrap();
        assert!(enforcer.enforce("push").is_ok());
        assert!(!dir.path().join("violations.json").exists());
    }

    #[test]
    fn risk_level_is_preserved_through_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let enforcer = Enforcer::new(dir.path());
        enforcer
            .save_violations(&[sample_risk()], gitup_config::SecurityLevel::Strict)
            .unwrap();
        let loaded = enforcer.check_violations().unwrap();
        assert_eq!(loaded[0].risk_level, SecurityRiskLevel::Critical);
    }
}
