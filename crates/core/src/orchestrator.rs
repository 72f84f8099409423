//! Drives a review session end to end: scan, ask a [`DecisionProvider`] what
//! to do with each residual risk, apply the decision, reassess, and hand the
//! residual blocking set to the [`Enforcer`]. Independent of presentation —
//! a CLI, TUI, or test harness all implement the same trait.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};

use crate::decision::{AuditAction, DecisionKind};
use crate::decision_ledger::DecisionLedger;
use crate::enforcer::Enforcer;
use crate::ignore_monitor::IgnoreMonitor;
use crate::risk::{SecurityAssessment, SecurityRisk};
use crate::risk_detector::RiskDetector;
use crate::vcs::VcsAdapter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    Safe,
    IgnorePermanently,
    IgnoreTemporarily { expires_at: String },
    AddToUserIgnore,
    AddToShadowIgnore,
    RemoveFile,
    EncryptFile,
    ReviewLater,
    Skip,
}

/// Presentation-agnostic callback interface. Implementors decide how each
/// risk is shown and how the user's answer is collected.
pub trait DecisionProvider {
    fn decide(&mut self, risk: &SecurityRisk) -> RiskDecision;
    /// Consulted only for [`RiskDecision::RemoveFile`]; the spec calls for a
    /// double confirmation before deleting anything.
    fn confirm_delete(&mut self, risk: &SecurityRisk) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Clean,
    ViolationsDetected,
    Completed,
}

#[derive(Debug, serde::Serialize)]
pub struct ReviewOutcome {
    pub status: ReviewStatus,
    pub resolved_count: usize,
    pub skipped_count: usize,
    pub residual: Vec<SecurityRisk>,
}

pub struct ReviewOrchestrator<'a> {
    pub root: &'a Path,
    pub store_dir: &'a Path,
    pub vcs: &'a dyn VcsAdapter,
    pub ignore_monitor: &'a IgnoreMonitor,
    pub ledger: &'a DecisionLedger,
    pub enforcer: &'a Enforcer,
    pub security_level: gitup_config::SecurityLevel,
}

impl<'a> ReviewOrchestrator<'a> {
    fn detector(&self) -> RiskDetector<'_> {
        RiskDetector {
            root: self.root,
            vcs: self.vcs,
            ignore_monitor: self.ignore_monitor,
            ledger: self.ledger,
            security_level: self.security_level,
        }
    }

    pub fn run(&self, interactive: bool, provider: Option<&mut dyn DecisionProvider>) -> Result<ReviewOutcome> {
        let assessment = self.detector().scan()?;
        if assessment.total_risks() == 0 {
            self.enforcer.clear_violations()?;
            return Ok(ReviewOutcome {
                status: ReviewStatus::Clean,
                resolved_count: 0,
                skipped_count: 0,
                residual: Vec::new(),
            });
        }

        if !interactive {
            self.enforcer.save_violations(&assessment.blocking_violations, self.security_level)?;
            return Ok(ReviewOutcome {
                status: ReviewStatus::ViolationsDetected,
                resolved_count: 0,
                skipped_count: 0,
                residual: assessment.blocking_violations,
            });
        }

        let provider = provider.context("interactive review requires a decision provider")?;
        let mut resolved_count = 0usize;
        let mut skipped_count = 0usize;

        for risk in &assessment.risks {
            let decision = provider.decide(risk);
            match self.apply(risk, decision, provider) {
                Applied::Resolved => resolved_count += 1,
                Applied::Skipped => skipped_count += 1,
            }
        }

        let residual_assessment = self.detector().scan()?;
        self.enforcer.save_violations(&residual_assessment.blocking_violations, self.security_level)?;

        Ok(ReviewOutcome {
            status: ReviewStatus::Completed,
            resolved_count,
            skipped_count,
            residual: residual_assessment.blocking_violations,
        })
    }

    /// Applies every matching risk in `risks` against `decision` in one
    /// transaction, per the bulk-action contract in SPEC_FULL.md §4.9.
    pub fn apply_bulk(&self, risks: &[SecurityRisk], decision: RiskDecision) -> Result<usize> {
        let mut count = 0;
        for risk in risks {
            if let Applied::Resolved = self.apply_non_interactive(risk, decision.clone())? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn apply(
        &self,
        risk: &SecurityRisk,
        decision: RiskDecision,
        provider: &mut dyn DecisionProvider,
    ) -> Applied {
        if let RiskDecision::RemoveFile = decision {
            if !provider.confirm_delete(risk) {
                return Applied::Skipped;
            }
        }
        self.apply_non_interactive(risk, decision)
            .unwrap_or(Applied::Skipped)
    }

    fn apply_non_interactive(&self, risk: &SecurityRisk, decision: RiskDecision) -> Result<Applied> {
        match decision {
            RiskDecision::Safe => {
                self.ledger
                    .add(&risk.file_path, DecisionKind::Safe, "marked safe in review", 1.0, None, None, vec![])?;
                Ok(Applied::Resolved)
            }
            RiskDecision::IgnorePermanently => {
                self.ledger.add(
                    &risk.file_path,
                    DecisionKind::IgnorePermanently,
                    "ignored in review",
                    1.0,
                    None,
                    None,
                    vec![],
                )?;
                Ok(Applied::Resolved)
            }
            RiskDecision::IgnoreTemporarily { expires_at } => {
                self.ledger.add(
                    &risk.file_path,
                    DecisionKind::IgnoreTemporarily,
                    "temporarily ignored in review",
                    1.0,
                    None,
                    Some(expires_at),
                    vec![],
                )?;
                Ok(Applied::Resolved)
            }
            RiskDecision::AddToUserIgnore => {
                self.append_user_ignore(&risk.file_path)?;
                self.ledger.add(
                    &risk.file_path,
                    DecisionKind::AddToUserIgnore,
                    "added to user ignore file in review",
                    1.0,
                    None,
                    None,
                    vec![],
                )?;
                Ok(Applied::Resolved)
            }
            RiskDecision::AddToShadowIgnore => {
                self.append_shadow_ignore(&risk.file_path)?;
                self.ledger.add(
                    &risk.file_path,
                    DecisionKind::AddToShadowIgnore,
                    "added to shadow ignore file in review",
                    1.0,
                    None,
                    None,
                    vec![],
                )?;
                Ok(Applied::Resolved)
            }
            RiskDecision::RemoveFile => {
                let abs = self.root.join(&risk.file_path);
                std::fs::remove_file(&abs).with_context(|| format!("removing {}", abs.display()))?;
                self.ledger.audit(
                    AuditAction::DecisionAdded,
                    serde_json::json!({ "removed_file": true, "file_path": risk.file_path }),
                )?;
                Ok(Applied::Resolved)
            }
            RiskDecision::EncryptFile => {
                self.ledger.add(
                    &risk.file_path,
                    DecisionKind::EncryptFile,
                    "flagged for encryption",
                    1.0,
                    None,
                    None,
                    vec![],
                )?;
                Ok(Applied::Resolved)
            }
            RiskDecision::ReviewLater => {
                self.ledger.add(
                    &risk.file_path,
                    DecisionKind::ReviewLater,
                    "deferred",
                    0.5,
                    None,
                    None,
                    vec![],
                )?;
                Ok(Applied::Skipped)
            }
            RiskDecision::Skip => Ok(Applied::Skipped),
        }
    }

    fn append_user_ignore(&self, file_path: &str) -> Result<()> {
        let pattern = generate_smart_pattern(file_path);
        let ignore_path = self.root.join(".gitignore");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&ignore_path)
            .with_context(|| format!("opening {}", ignore_path.display()))?;
        writeln!(file, "\n# added by GitUp security review\n{pattern}")?;
        self.ignore_monitor.update_baseline()
    }

    fn append_shadow_ignore(&self, file_path: &str) -> Result<()> {
        let pattern = generate_smart_pattern(file_path);
        let shadow_path = self.store_dir.join("shadow_ignore");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&shadow_path)
            .with_context(|| format!("opening {}", shadow_path.display()))?;
        writeln!(file, "{pattern}")?;
        Ok(())
    }
}

enum Applied {
    Resolved,
    Skipped,
}

const BACKUP_EXTENSIONS: &[&str] = &["bak", "backup", "old", "orig"];
const TEMP_EXTENSIONS: &[&str] = &["tmp", "temp", "swp", "swo"];
const IDE_DIRS: &[&str] = &[".idea", ".vscode", ".eclipse", ".settings"];

/// Chooses the narrowest globally-useful glob for a file path, per
/// SPEC_FULL.md §4.9's smart-pattern-synthesis rules, falling through each
/// category in order and defaulting to the literal path.
pub fn generate_smart_pattern(file_path: &str) -> String {
    let file_name = file_path.rsplit('/').next().unwrap_or(file_path);
    let ext = file_name.rsplit('.').next().filter(|e| *e != file_name);
    let first_segment = file_path.split('/').next().unwrap_or(file_path);

    if matches!(ext, Some("env") | Some("key") | Some("pem")) || file_name.contains("secret") {
        if let Some(ext) = ext {
            return format!("*.{ext}");
        }
        return "*secret*".to_string();
    }
    if file_path.contains("config/") {
        if let Some(ext) = ext {
            return format!("**/config/*.{ext}");
        }
    }
    if matches!(ext, Some("db") | Some("sqlite") | Some("sqlite3")) {
        return "*.db".to_string();
    }
    if let Some(ext) = ext {
        if BACKUP_EXTENSIONS.contains(&ext) {
            return format!("*.{ext}");
        }
    }
    if ext == Some("log") {
        return "*.log".to_string();
    }
    if IDE_DIRS.contains(&first_segment) {
        return format!("{first_segment}/");
    }
    if let Some(ext) = ext {
        if TEMP_EXTENSIONS.contains(&ext) {
            return format!("*.{ext}");
        }
    }
    file_path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::GitAdapter;

    struct ScriptedProvider {
        decisions: Vec<RiskDecision>,
        idx: usize,
    }

    impl DecisionProvider for ScriptedProvider {
        fn decide(&mut self, _risk: &SecurityRisk) -> RiskDecision {
            let d = self.decisions.get(self.idx).cloned().unwrap_or(RiskDecision::Skip);
            self.idx += 1;
            d
        }
        fn confirm_delete(&mut self, _risk: &SecurityRisk) -> bool {
            true
        }
    }

    fn setup(dir: &Path) -> (IgnoreMonitor, DecisionLedger, Enforcer) {
        let store = dir.join(".gitup");
        std::fs::create_dir_all(&store).unwrap();
        (
            IgnoreMonitor::new(dir, &store),
            DecisionLedger::new(&store, dir),
            Enforcer::new(&store),
        )
    }

    #[test]
    fn clean_project_reports_clean_and_clears_enforcer() {
        let dir = tempfile::tempdir().unwrap();
        let (monitor, ledger, enforcer) = setup(dir.path());
        let orchestrator = ReviewOrchestrator {
            root: dir.path(),
            store_dir: &dir.path().join(".gitup"),
            vcs: &GitAdapter,
            ignore_monitor: &monitor,
            ledger: &ledger,
            enforcer: &enforcer,
            security_level: gitup_config::SecurityLevel::Strict,
        };
        let outcome = orchestrator.run(true, None).unwrap();
        assert_eq!(outcome.status, ReviewStatus::Clean);
    }

    #[test]
    fn non_interactive_run_persists_blocking_set() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "API_KEY=x").unwrap();
        let (monitor, ledger, enforcer) = setup(dir.path());
        let orchestrator = ReviewOrchestrator {
            root: dir.path(),
            store_dir: &dir.path().join(".gitup"),
            vcs: &GitAdapter,
            ignore_monitor: &monitor,
            ledger: &ledger,
            enforcer: &enforcer,
            security_level: gitup_config::SecurityLevel::Strict,
        };
        let outcome = orchestrator.run(false, None).unwrap();
        assert_eq!(outcome.status, ReviewStatus::ViolationsDetected);
        assert!(!outcome.residual.is_empty());
        assert!(orchestrator.enforcer.enforce("commit").is_err());
    }

    #[test]
    fn interactive_ignore_permanently_resolves_risk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "API_KEY=x").unwrap();
        let (monitor, ledger, enforcer) = setup(dir.path());
        let orchestrator = ReviewOrchestrator {
            root: dir.path(),
            store_dir: &dir.path().join(".gitup"),
            vcs: &GitAdapter,
            ignore_monitor: &monitor,
            ledger: &ledger,
            enforcer: &enforcer,
            security_level: gitup_config::SecurityLevel::Strict,
        };
        let mut provider = ScriptedProvider {
            decisions: vec![RiskDecision::IgnorePermanently],
            idx: 0,
        };
        let outcome = orchestrator.run(true, Some(&mut provider)).unwrap();
        assert_eq!(outcome.status, ReviewStatus::Completed);
        assert_eq!(outcome.resolved_count, 1);
        assert!(outcome.residual.is_empty());
        assert!(orchestrator.enforcer.enforce("commit").is_ok());
    }

    #[test]
    fn add_to_user_ignore_writes_audit_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.log"), "log line").unwrap();
        let (monitor, ledger, enforcer) = setup(dir.path());
        let orchestrator = ReviewOrchestrator {
            root: dir.path(),
            store_dir: &dir.path().join(".gitup"),
            vcs: &GitAdapter,
            ignore_monitor: &monitor,
            ledger: &ledger,
            enforcer: &enforcer,
            security_level: gitup_config::SecurityLevel::Strict,
        };
        let mut provider = ScriptedProvider {
            decisions: vec![RiskDecision::AddToUserIgnore],
            idx: 0,
        };
        orchestrator.run(true, Some(&mut provider)).unwrap();
        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains("*.log"));
        let stats = ledger.statistics().unwrap();
        assert!(stats.actions_by_kind.contains_key("DecisionAdded"));
        assert!(stats.decisions_by_kind.contains_key("AddToUserIgnore"));

        // The risk must not reappear on a rescan now that it's covered by the
        // ignore file this decision just wrote to.
        let rescan = orchestrator.detector().scan().unwrap();
        assert!(!rescan.risks.iter().any(|r| r.file_path == "app.log"));
    }

    #[test]
    fn smart_pattern_for_env_file_is_extension_glob() {
        assert_eq!(generate_smart_pattern(".env"), "*.env");
        assert_eq!(generate_smart_pattern("app.log"), "*.log");
        assert_eq!(generate_smart_pattern(".idea/workspace.xml"), ".idea/");
        assert_eq!(generate_smart_pattern("notes.txt"), "notes.txt");
    }
}
