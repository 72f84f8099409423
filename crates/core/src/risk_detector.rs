//! Full security scan pipeline: enumerate candidate files, classify each
//! against the pattern catalog and credential regexes, apply the severity
//! upgrade rule, then drop anything the user or the project has already
//! resolved. Assembles the result into a [`SecurityAssessment`].

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

use crate::decision_ledger::DecisionLedger;
use crate::ignore_monitor::IgnoreMonitor;
use crate::pattern_catalog::{
    self, CredentialPattern, MAX_CONTENT_SCAN_BYTES, MAX_SCAN_SIZE_BYTES,
};
use crate::risk::{SecurityAssessment, SecurityRisk, SecurityRiskType};
use crate::vcs::VcsAdapter;

const SKIP_DIRS: &[&str] = &[
    ".git", ".gitup", "node_modules", ".venv", "venv", "__pycache__", ".pytest_cache",
    ".mypy_cache", "build", "dist", "target", ".gradle", ".idea", "cache",
];

pub struct RiskDetector<'a> {
    pub root: &'a Path,
    pub vcs: &'a dyn VcsAdapter,
    pub ignore_monitor: &'a IgnoreMonitor,
    pub ledger: &'a DecisionLedger,
    pub security_level: gitup_config::SecurityLevel,
}

impl<'a> RiskDetector<'a> {
    /// Runs the full pipeline: refreshes the ignore baseline delta, walks the
    /// tree, classifies every scannable file, applies severity upgrades,
    /// filters resolved risks, and computes the blocking subset.
    pub fn scan(&self) -> Result<SecurityAssessment> {
        // Refresh the change-tracking baseline so the next `detect_changes`
        // call sees today's patterns as the starting point. Resolution
        // filtering below reads both ignore files' current contents directly
        // through `is_path_ignored`, independent of this baseline.
        let (_, _delta) = self.ignore_monitor.pre_operation_check()?;
        self.ignore_monitor.update_baseline()?;

        let mut catalog_patterns = pattern_catalog::credential_patterns();
        catalog_patterns.extend(pattern_catalog::manifest_credential_patterns(self.root));
        let credential_patterns: Vec<(CredentialPattern, Regex)> = catalog_patterns
            .into_iter()
            .filter_map(|p| Regex::new(p.regex).ok().map(|re| (p, re)))
            .collect();
        let catalog = pattern_catalog::catalog();
        let decisions = self.ledger.all().unwrap_or_default();

        let mut risks = Vec::new();
        for entry in walkdir::WalkDir::new(self.root)
            .into_iter()
            .filter_entry(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| !SKIP_DIRS.contains(&name))
                    .unwrap_or(true)
            })
        {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let rel_path = entry
                .path()
                .strip_prefix(self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");

            if self.is_resolved(&rel_path, &decisions) {
                continue;
            }

            if entry.path_is_symlink() {
                if let Some(risk) = self.classify_symlink(entry.path(), &rel_path) {
                    risks.push(risk);
                }
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.len() > MAX_SCAN_SIZE_BYTES {
                continue;
            }

            let is_tracked = self.vcs.is_tracked(self.root, &rel_path);
            let last_modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64);

            if let Some(risk) = self.classify_by_name(&rel_path, &catalog, is_tracked, metadata.len(), last_modified) {
                risks.push(risk);
            } else if metadata.len() > pattern_catalog::LARGE_FILE_THRESHOLD_BYTES {
                risks.push(SecurityRisk::new(
                    rel_path.clone(),
                    format!(">{} bytes", pattern_catalog::LARGE_FILE_THRESHOLD_BYTES),
                    SecurityRiskType::LargeBinary,
                    is_tracked,
                    format!("{rel_path} exceeds the large-file threshold"),
                    "consider git-lfs or excluding this file".to_string(),
                    metadata.len(),
                    last_modified,
                ));
            } else if metadata.len() <= MAX_CONTENT_SCAN_BYTES {
                if let Some(risk) = self.classify_by_content(
                    entry.path(),
                    &rel_path,
                    &credential_patterns,
                    is_tracked,
                    metadata.len(),
                    last_modified,
                ) {
                    risks.push(risk);
                }
            }
        }

        risks = self.filter_resolved(risks, &decisions);

        let blocking_levels = pattern_catalog::blocking_thresholds(self.security_level);
        let blocking_violations: Vec<SecurityRisk> = risks
            .iter()
            .filter(|r| blocking_levels.contains(&r.risk_level))
            .cloned()
            .collect();

        let mut assessment = SecurityAssessment {
            project_path: self.root.to_string_lossy().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            critical_risks: 0,
            high_risks: 0,
            medium_risks: 0,
            low_risks: 0,
            info_risks: 0,
            risks,
            blocking_violations,
            security_level: self.security_level,
            enforcement_active: true,
        };
        tally(&mut assessment);
        assessment
            .risks
            .sort_by(|a, b| b.risk_level.cmp(&a.risk_level));
        Ok(assessment)
    }

    fn is_resolved(&self, rel_path: &str, decisions: &std::collections::HashMap<String, crate::decision::UserDecision>) -> bool {
        if self.ignore_monitor.global_exception_matches(rel_path).0 {
            return true;
        }
        if self.ignore_monitor.is_path_ignored(rel_path) {
            return true;
        }
        decisions.values().any(|d| {
            d.matches_path(rel_path)
                && !d.is_expired(chrono::Utc::now())
                && matches!(
                    d.decision,
                    crate::decision::DecisionKind::Safe
                        | crate::decision::DecisionKind::IgnorePermanently
                        | crate::decision::DecisionKind::IgnoreTemporarily
                        | crate::decision::DecisionKind::AddToShadowIgnore
                        | crate::decision::DecisionKind::AddToUserIgnore
                )
        })
    }

    fn classify_symlink(&self, abs_path: &Path, rel_path: &str) -> Option<SecurityRisk> {
        let target = std::fs::read_link(abs_path).ok()?;
        let target_str = target.to_string_lossy();
        let suspicious = pattern_catalog::suspicious_symlink_targets();
        let matched = suspicious
            .iter()
            .find(|pat| crate::ignore_monitor::glob_matches(pat, &target_str))?;
        Some(SecurityRisk::new(
            rel_path.to_string(),
            matched.to_string(),
            SecurityRiskType::SecretFile,
            self.vcs.is_tracked(self.root, rel_path),
            format!("{rel_path} is a symlink pointing at a suspicious target ({target_str})"),
            "verify the symlink target and remove it if it leaks a secret path".to_string(),
            0,
            None,
        ))
    }

    fn classify_by_name(
        &self,
        rel_path: &str,
        catalog: &[pattern_catalog::PatternEntry],
        is_tracked: bool,
        size: u64,
        last_modified: Option<i64>,
    ) -> Option<SecurityRisk> {
        let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        let matched = catalog
            .iter()
            .find(|entry| crate::ignore_monitor::glob_matches(entry.glob, rel_path) || crate::ignore_monitor::glob_matches(entry.glob, file_name))?;
        Some(SecurityRisk::new(
            rel_path.to_string(),
            matched.glob.to_string(),
            matched.risk_type,
            is_tracked,
            format!("{rel_path} matches pattern {}", matched.glob),
            recommendation_for(matched.risk_type),
            size,
            last_modified,
        ))
    }

    fn classify_by_content(
        &self,
        abs_path: &Path,
        rel_path: &str,
        patterns: &[(CredentialPattern, Regex)],
        is_tracked: bool,
        size: u64,
        last_modified: Option<i64>,
    ) -> Option<SecurityRisk> {
        let content = std::fs::read(abs_path).ok()?;
        if content.iter().take(8000).any(|&b| b == 0) {
            return None; // binary, skip content scan
        }
        let text = String::from_utf8_lossy(&content);
        for (pattern, regex) in patterns {
            if let Some(m) = regex.find(&text) {
                let line_start = text[..m.start()].lines().next_back().unwrap_or("");
                if line_start.trim_start().starts_with('#') || line_start.trim_start().starts_with("//") {
                    continue;
                }
                let risk_type = if pattern.is_api_key {
                    SecurityRiskType::ApiKeyPattern
                } else {
                    SecurityRiskType::CredentialPattern
                };
                return Some(SecurityRisk::new(
                    rel_path.to_string(),
                    pattern.name.to_string(),
                    risk_type,
                    is_tracked,
                    format!("{rel_path} contains a value matching the {} pattern", pattern.name),
                    "move this value into an environment variable or secret store".to_string(),
                    size,
                    last_modified,
                ));
            }
        }
        None
    }

    fn filter_resolved(
        &self,
        risks: Vec<SecurityRisk>,
        decisions: &std::collections::HashMap<String, crate::decision::UserDecision>,
    ) -> Vec<SecurityRisk> {
        risks
            .into_iter()
            .filter(|risk| {
                let resolved_by_decision = decisions.values().any(|d| {
                    d.matches_path(&risk.file_path)
                        && !d.is_expired(chrono::Utc::now())
                        && matches!(
                            d.decision,
                            crate::decision::DecisionKind::Safe
                                | crate::decision::DecisionKind::IgnorePermanently
                                | crate::decision::DecisionKind::IgnoreTemporarily
                        )
                });
                let resolved_by_exception = self.ignore_monitor.global_exception_matches(&risk.file_path).0;
                let resolved_by_ignore_file = self.ignore_monitor.is_path_ignored(&risk.file_path);
                !resolved_by_decision && !resolved_by_exception && !resolved_by_ignore_file
            })
            .collect()
    }
}

fn recommendation_for(risk_type: SecurityRiskType) -> String {
    use SecurityRiskType::*;
    match risk_type {
        SecretFile | CredentialPattern | ApiKeyPattern => {
            "add this to .gitignore and rotate any credential it may contain".to_string()
        }
        SensitiveConfig => "verify this file has no embedded credentials before committing".to_string(),
        LargeBinary => "consider git-lfs or excluding this file".to_string(),
        DatabaseFile => "database files should rarely be committed; add to .gitignore".to_string(),
        BackupFile => "backup files are usually safe to ignore".to_string(),
        LogFile => "log files should typically be ignored".to_string(),
        TemporaryFile => "temporary files should typically be ignored".to_string(),
        IdeConfig | SystemFile => "editor/OS metadata is usually safe to ignore".to_string(),
    }
}

fn tally(assessment: &mut SecurityAssessment) {
    use crate::risk::SecurityRiskLevel::*;
    for risk in &assessment.risks {
        match risk.risk_level {
            Critical => assessment.critical_risks += 1,
            High => assessment.high_risks += 1,
            Medium => assessment.medium_risks += 1,
            Low => assessment.low_risks += 1,
            Info => assessment.info_risks += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::GitAdapter;

    #[test]
    fn env_file_is_flagged_critical() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "API_KEY=x").unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), dir.path());
        let ledger = DecisionLedger::new(dir.path(), dir.path());
        let d = RiskDetector {
            root: dir.path(),
            vcs: &GitAdapter,
            ignore_monitor: &monitor,
            ledger: &ledger,
            security_level: gitup_config::SecurityLevel::Strict,
        };
        let assessment = d.scan().unwrap();
        assert!(assessment.risks.iter().any(|r| r.file_path == ".env"));
        assert!(assessment.critical_risks >= 1);
    }

    #[test]
    fn global_exception_suppresses_risk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("template.env"), "x").unwrap();
        let store = dir.path().join(".gitup");
        std::fs::create_dir_all(&store).unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), &store);
        let ledger = DecisionLedger::new(&store, dir.path());
        let d = RiskDetector {
            root: dir.path(),
            vcs: &GitAdapter,
            ignore_monitor: &monitor,
            ledger: &ledger,
            security_level: gitup_config::SecurityLevel::Strict,
        };
        let assessment = d.scan().unwrap();
        assert!(!assessment.risks.iter().any(|r| r.file_path == "template.env"));
    }

    #[test]
    fn user_ignore_entry_resolves_risk_on_next_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("secrets.env"), "API_KEY=x").unwrap();
        let store = dir.path().join(".gitup");
        std::fs::create_dir_all(&store).unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), &store);
        let ledger = DecisionLedger::new(&store, dir.path());
        let d = RiskDetector {
            root: dir.path(),
            vcs: &GitAdapter,
            ignore_monitor: &monitor,
            ledger: &ledger,
            security_level: gitup_config::SecurityLevel::Strict,
        };
        assert!(d.scan().unwrap().risks.iter().any(|r| r.file_path == "secrets.env"));

        std::fs::write(dir.path().join(".gitignore"), "*.env\n").unwrap();
        assert!(!d.scan().unwrap().risks.iter().any(|r| r.file_path == "secrets.env"));
    }

    #[test]
    fn shadow_ignore_entry_resolves_risk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("internal.key"), "x").unwrap();
        let store = dir.path().join(".gitup");
        std::fs::create_dir_all(&store).unwrap();
        std::fs::write(store.join("shadow_ignore"), "*.key\n").unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), &store);
        let ledger = DecisionLedger::new(&store, dir.path());
        let d = RiskDetector {
            root: dir.path(),
            vcs: &GitAdapter,
            ignore_monitor: &monitor,
            ledger: &ledger,
            security_level: gitup_config::SecurityLevel::Strict,
        };
        assert!(!d.scan().unwrap().risks.iter().any(|r| r.file_path == "internal.key"));
    }

    #[test]
    fn credential_in_comment_is_not_flagged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "# api_key = \"abcdefghijklmnop\"\n").unwrap();
        let store = dir.path().join(".gitup");
        std::fs::create_dir_all(&store).unwrap();
        let monitor = IgnoreMonitor::new(dir.path(), &store);
        let ledger = DecisionLedger::new(&store, dir.path());
        let d = RiskDetector {
            root: dir.path(),
            vcs: &GitAdapter,
            ignore_monitor: &monitor,
            ledger: &ledger,
            security_level: gitup_config::SecurityLevel::Strict,
        };
        let assessment = d.scan().unwrap();
        assert!(!assessment.risks.iter().any(|r| r.file_path == "notes.txt"));
    }
}
