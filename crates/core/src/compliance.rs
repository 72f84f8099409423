//! Rolls a fresh scan, the decision ledger's statistics, and a handful of
//! presence checks into a single compliance verdict, persisted alongside the
//! project's other managed state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gitup_config::ComplianceVerdict;
use serde::{Deserialize, Serialize};

use crate::decision::AuditEntry;
use crate::decision_ledger::DecisionLedger;
use crate::ignore_monitor::IgnoreMonitor;
use crate::risk::SecurityAssessment;
use crate::vcs::VcsAdapter;

#[derive(Debug, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub verdict: ComplianceVerdict,
    pub timestamp: String,
    pub potential_secrets: usize,
    pub blocking_violations: usize,
    pub has_ignore_file: bool,
    pub has_shadow_ignore: bool,
    pub has_vcs: bool,
    pub decision_count: usize,
    pub due_for_review: usize,
    pub recent_audit: Vec<AuditEntry>,
}

pub struct ComplianceEvaluator<'a> {
    pub root: &'a Path,
    pub store_dir: &'a Path,
    pub vcs: &'a dyn VcsAdapter,
    pub ignore_monitor: &'a IgnoreMonitor,
    pub ledger: &'a DecisionLedger,
}

const RECENT_AUDIT_SLICE: usize = 10;

impl<'a> ComplianceEvaluator<'a> {
    pub fn evaluate(&self, assessment: &SecurityAssessment) -> Result<ComplianceReport> {
        let stats = self.ledger.statistics()?;
        let has_shadow_ignore = self.store_dir.join("shadow_ignore").exists();
        let has_ignore_file = self.root.join(".gitignore").exists();
        let has_vcs = self.vcs.is_repository(self.root);

        let potential_secrets = assessment
            .risks
            .iter()
            .filter(|r| {
                matches!(
                    r.risk_type,
                    crate::risk::SecurityRiskType::SecretFile
                        | crate::risk::SecurityRiskType::CredentialPattern
                        | crate::risk::SecurityRiskType::ApiKeyPattern
                )
            })
            .count();

        let verdict = determine_verdict(potential_secrets, has_ignore_file || has_shadow_ignore);

        let report = ComplianceReport {
            verdict,
            timestamp: chrono::Utc::now().to_rfc3339(),
            potential_secrets,
            blocking_violations: assessment.blocking_violations.len(),
            has_ignore_file,
            has_shadow_ignore,
            has_vcs,
            decision_count: stats.total_decisions,
            due_for_review: stats.due_for_review_count,
            recent_audit: self.recent_audit(),
        };

        self.save(&report)?;
        Ok(report)
    }

    fn save(&self, report: &ComplianceReport) -> Result<()> {
        let path = self.compliance_path();
        let json = serde_json::to_string_pretty(report).context("serializing compliance report")?;
        gitup_config::write_atomic_with_backup(&path, json.as_bytes())
    }

    pub fn load_last(&self) -> Result<Option<ComplianceReport>> {
        match std::fs::read_to_string(self.compliance_path()) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw).context("parsing compliance.json")?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).context("reading compliance.json"),
        }
    }

    fn compliance_path(&self) -> PathBuf {
        self.store_dir.join("compliance.json")
    }

    /// Reads the newline-delimited audit log and returns its last
    /// [`RECENT_AUDIT_SLICE`] entries, oldest first. Missing or unreadable log
    /// yields an empty slice rather than a hard error, since a fresh project
    /// has no audit history yet.
    fn recent_audit(&self) -> Vec<AuditEntry> {
        let path = self.store_dir.join("audit.log");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        let mut entries: Vec<AuditEntry> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        if entries.len() > RECENT_AUDIT_SLICE {
            let excess = entries.len() - RECENT_AUDIT_SLICE;
            entries.drain(0..excess);
        }
        entries
    }
}

/// `risk_detected` outranks `partial_compliance`: any potential secret is
/// worse than a merely-missing ignore mechanism.
fn determine_verdict(potential_secrets: usize, has_ignore_mechanism: bool) -> ComplianceVerdict {
    if potential_secrets > 0 {
        ComplianceVerdict::RiskDetected
    } else if !has_ignore_mechanism {
        ComplianceVerdict::PartialCompliance
    } else {
        ComplianceVerdict::Compliant
    }
}
