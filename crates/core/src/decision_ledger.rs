//! Append-only decision journal plus audit trail, persisted to
//! `shadow_ignore.meta`. Integrity-checked with a `.backup` copy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::decision::{current_user, AuditAction, AuditEntry, DecisionKind, UserDecision};

const AUDIT_RETENTION: usize = 1000;
const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerFile {
    pub version: u32,
    pub created: String,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub user_decisions: HashMap<String, UserDecision>,
    #[serde(default)]
    pub audit_trail: Vec<AuditEntry>,
    pub last_updated: String,
}

impl LedgerFile {
    fn new() -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            version: 1,
            created: now.clone(),
            project_type: None,
            user_decisions: HashMap::new(),
            audit_trail: Vec::new(),
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    Overwrite,
    Merge,
    Append,
}

#[derive(Debug, Default, Serialize)]
pub struct LedgerStatistics {
    pub total_decisions: usize,
    pub decisions_by_kind: HashMap<String, usize>,
    pub actions_by_kind: HashMap<String, usize>,
    pub expired_count: usize,
    pub due_for_review_count: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub issues: Vec<String>,
}

pub struct DecisionLedger {
    path: PathBuf,
    project_path: PathBuf,
}

impl DecisionLedger {
    pub fn new(store_dir: &Path, project_path: &Path) -> Self {
        Self {
            path: store_dir.join("shadow_ignore.meta"),
            project_path: project_path.to_path_buf(),
        }
    }

    fn load(&self) -> Result<LedgerFile> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).or_else(|err| {
                tracing::warn!(error = %err, "shadow_ignore.meta is corrupt, trying backup");
                self.load_backup()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(LedgerFile::new()),
            Err(err) => Err(err).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    fn load_backup(&self) -> Result<LedgerFile> {
        let backup = self.path.with_extension("meta.backup");
        match std::fs::read_to_string(&backup) {
            Ok(raw) => serde_json::from_str(&raw).context("parsing backup ledger"),
            Err(_) => Ok(LedgerFile::new()),
        }
    }

    fn save(&self, mut ledger: LedgerFile) -> Result<()> {
        ledger.last_updated = chrono::Utc::now().to_rfc3339();
        if ledger.audit_trail.len() > AUDIT_RETENTION {
            let excess = ledger.audit_trail.len() - AUDIT_RETENTION;
            ledger.audit_trail.drain(0..excess);
        }
        let json = serde_json::to_string_pretty(&ledger).context("serializing ledger")?;
        gitup_config::write_atomic_with_backup(&self.path, json.as_bytes())
    }

    fn append_audit(&self, ledger: &mut LedgerFile, action: AuditAction, details: serde_json::Value) {
        ledger.audit_trail.push(AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_id: current_user(),
            details,
            tool_version: TOOL_VERSION.to_string(),
            project_hash: crate::decision::project_hash(&self.project_path),
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &self,
        pattern: &str,
        decision: DecisionKind,
        reason: &str,
        confidence: f32,
        auto_review_at: Option<String>,
        expires_at: Option<String>,
        tags: Vec<String>,
    ) -> Result<String> {
        let mut ledger = self.load()?;
        let id = uuid::Uuid::new_v4().to_string();
        let entry = UserDecision {
            id: id.clone(),
            pattern: pattern.to_string(),
            decision,
            reason: reason.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            user_id: current_user(),
            confidence,
            auto_review_at,
            expires_at,
            tags,
        };
        ledger.user_decisions.insert(id.clone(), entry);
        self.append_audit(
            &mut ledger,
            AuditAction::DecisionAdded,
            serde_json::json!({ "id": id, "pattern": pattern, "decision": decision }),
        );
        self.save(ledger)?;
        Ok(id)
    }

    /// Returns the matching non-expired decision for `file_path`. Exact-path
    /// decisions take precedence over glob decisions; among glob decisions the
    /// longest pattern wins the tiebreak.
    pub fn get_by_pattern(&self, file_path: &str) -> Result<Option<UserDecision>> {
        let mut ledger = self.load()?;
        let now = chrono::Utc::now();

        let mut expired_ids = Vec::new();
        let mut best: Option<UserDecision> = None;
        for decision in ledger.user_decisions.values() {
            if !decision.matches_path(file_path) {
                continue;
            }
            if decision.is_expired(now) {
                expired_ids.push(decision.id.clone());
                continue;
            }
            best = Some(match best {
                None => decision.clone(),
                Some(current) => pick_better_match(current, decision.clone()),
            });
        }

        if !expired_ids.is_empty() {
            for id in &expired_ids {
                if let Some(d) = ledger.user_decisions.remove(id) {
                    self.append_audit(
                        &mut ledger,
                        AuditAction::Expired,
                        serde_json::json!({ "id": d.id, "pattern": d.pattern }),
                    );
                }
            }
            self.save(ledger)?;
        }

        Ok(best)
    }

    pub fn all(&self) -> Result<HashMap<String, UserDecision>> {
        let ledger = self.load()?;
        Ok(ledger.user_decisions)
    }

    pub fn update(&self, id: &str, mutate: impl FnOnce(&mut UserDecision)) -> Result<bool> {
        let mut ledger = self.load()?;
        let Some(decision) = ledger.user_decisions.get_mut(id) else {
            return Ok(false);
        };
        mutate(decision);
        decision.timestamp = chrono::Utc::now().to_rfc3339();
        self.append_audit(
            &mut ledger,
            AuditAction::Updated,
            serde_json::json!({ "id": id, "updated_fields": true }),
        );
        self.save(ledger)?;
        Ok(true)
    }

    /// Soft deletion: removed from the active set, retained in the audit trail.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut ledger = self.load()?;
        let Some(decision) = ledger.user_decisions.remove(id) else {
            return Ok(false);
        };
        self.append_audit(
            &mut ledger,
            AuditAction::Updated,
            serde_json::json!({ "id": id, "pattern": decision.pattern, "deleted": true }),
        );
        self.save(ledger)?;
        Ok(true)
    }

    /// Records a standalone audit entry in the same file the ledger's own
    /// mutations use, without adding or touching a decision. Used when a
    /// caller mutates state outside the ledger (e.g. the user ignore file)
    /// but still owes a same-transaction audit record.
    pub fn audit(&self, action: AuditAction, details: serde_json::Value) -> Result<()> {
        let mut ledger = self.load()?;
        self.append_audit(&mut ledger, action, details);
        self.save(ledger)
    }

    pub fn expired(&self) -> Result<Vec<UserDecision>> {
        let ledger = self.load()?;
        let now = chrono::Utc::now();
        Ok(ledger
            .user_decisions
            .into_values()
            .filter(|d| d.is_expired(now))
            .collect())
    }

    pub fn due_for_review(&self) -> Result<Vec<UserDecision>> {
        let ledger = self.load()?;
        let now = chrono::Utc::now();
        Ok(ledger
            .user_decisions
            .into_values()
            .filter(|d| {
                d.auto_review_at
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|due| due.with_timezone(&chrono::Utc) <= now)
                    .unwrap_or(false)
            })
            .collect())
    }

    pub fn export(&self, dest: &Path) -> Result<()> {
        let mut ledger = self.load()?;
        let json = serde_json::to_string_pretty(&ledger).context("serializing export")?;
        std::fs::write(dest, json).with_context(|| format!("writing {}", dest.display()))?;
        self.append_audit(
            &mut ledger,
            AuditAction::Exported,
            serde_json::json!({ "path": dest.display().to_string() }),
        );
        self.save(ledger)
    }

    pub fn import(&self, src: &Path, strategy: ImportStrategy) -> Result<()> {
        let raw = std::fs::read_to_string(src).with_context(|| format!("reading {}", src.display()))?;
        let incoming: LedgerFile = serde_json::from_str(&raw).context("parsing import file")?;

        let mut ledger = match strategy {
            ImportStrategy::Overwrite => incoming.clone(),
            ImportStrategy::Merge | ImportStrategy::Append => self.load()?,
        };

        match strategy {
            ImportStrategy::Overwrite => {}
            ImportStrategy::Merge => {
                for (id, decision) in incoming.user_decisions {
                    ledger.user_decisions.insert(id, decision);
                }
            }
            ImportStrategy::Append => {
                for (_, decision) in incoming.user_decisions {
                    let id = uuid::Uuid::new_v4().to_string();
                    let mut decision = decision;
                    decision.id = id.clone();
                    ledger.user_decisions.insert(id, decision);
                }
            }
        }

        self.append_audit(
            &mut ledger,
            AuditAction::Imported,
            serde_json::json!({ "path": src.display().to_string(), "strategy": format!("{strategy:?}") }),
        );
        self.save(ledger)
    }

    pub fn statistics(&self) -> Result<LedgerStatistics> {
        let ledger = self.load()?;
        let now = chrono::Utc::now();
        let mut decisions_by_kind = HashMap::new();
        let mut expired_count = 0;
        let mut due_for_review_count = 0;
        for decision in ledger.user_decisions.values() {
            *decisions_by_kind
                .entry(format!("{:?}", decision.decision))
                .or_insert(0) += 1;
            if decision.is_expired(now) {
                expired_count += 1;
            }
            if decision
                .auto_review_at
                .as_deref()
                .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                .map(|due| due.with_timezone(&chrono::Utc) <= now)
                .unwrap_or(false)
            {
                due_for_review_count += 1;
            }
        }
        let mut actions_by_kind = HashMap::new();
        for entry in &ledger.audit_trail {
            *actions_by_kind.entry(format!("{:?}", entry.action)).or_insert(0) += 1;
        }
        Ok(LedgerStatistics {
            total_decisions: ledger.user_decisions.len(),
            decisions_by_kind,
            actions_by_kind,
            expired_count,
            due_for_review_count,
        })
    }

    pub fn validate_integrity(&self) -> Result<IntegrityReport> {
        let ledger = self.load()?;
        let mut issues = Vec::new();
        if ledger.version == 0 {
            issues.push("missing version".to_string());
        }
        if ledger.created.is_empty() {
            issues.push("missing created timestamp".to_string());
        }
        for (id, decision) in &ledger.user_decisions {
            if decision.pattern.is_empty() {
                issues.push(format!("decision {id} has an empty pattern"));
            }
            if decision.user_id.is_empty() {
                issues.push(format!("decision {id} has no user_id"));
            }
            if decision.timestamp.is_empty() {
                issues.push(format!("decision {id} has no timestamp"));
            }
        }
        Ok(IntegrityReport {
            valid: issues.is_empty(),
            issues,
        })
    }
}

/// Exact-path decisions shadow glob decisions; among equals, the longer pattern
/// wins as the more specific match.
fn pick_better_match(a: UserDecision, b: UserDecision) -> UserDecision {
    match (a.is_exact_path(), b.is_exact_path()) {
        (true, false) => a,
        (false, true) => b,
        _ => {
            if b.pattern.len() > a.pattern.len() {
                b
            } else {
                a
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(dir: &Path) -> DecisionLedger {
        DecisionLedger::new(dir, dir)
    }

    #[test]
    fn add_then_get_by_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let l = ledger(dir.path());
        l.add("*.log", DecisionKind::IgnorePermanently, "noisy", 0.9, None, None, vec![])
            .unwrap();
        let found = l.get_by_pattern("app.log").unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().pattern, "*.log");
    }

    #[test]
    fn expired_decision_is_dropped_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        let l = ledger(dir.path());
        let past = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        l.add(
            "*.log",
            DecisionKind::IgnoreTemporarily,
            "temp",
            1.0,
            None,
            Some(past),
            vec![],
        )
        .unwrap();

        assert!(l.get_by_pattern("app.log").unwrap().is_none());
        assert_eq!(l.expired().unwrap().len(), 0); // already moved to audit trail
        let ledger_file = l.load().unwrap();
        assert!(ledger_file
            .audit_trail
            .iter()
            .any(|e| matches!(e.action, AuditAction::Expired)));
    }

    #[test]
    fn delete_is_soft_and_keeps_audit_entry() {
        let dir = tempfile::tempdir().unwrap();
        let l = ledger(dir.path());
        let id = l
            .add("*.tmp", DecisionKind::Safe, "fine", 1.0, None, None, vec![])
            .unwrap();
        assert!(l.delete(&id).unwrap());
        assert!(l.all().unwrap().get(&id).is_none());
        let ledger_file = l.load().unwrap();
        assert!(ledger_file.audit_trail.len() >= 2);
    }

    #[test]
    fn export_import_round_trip_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let l = ledger(dir.path());
        l.add("*.log", DecisionKind::Safe, "ok", 1.0, None, None, vec![])
            .unwrap();
        let export_path = dir.path().join("export.json");
        l.export(&export_path).unwrap();

        let dir2 = tempfile::tempdir().unwrap();
        let l2 = ledger(dir2.path());
        l2.import(&export_path, ImportStrategy::Overwrite).unwrap();

        let decisions1: Vec<_> = l.all().unwrap().into_values().map(|d| d.pattern).collect();
        let decisions2: Vec<_> = l2.all().unwrap().into_values().map(|d| d.pattern).collect();
        assert_eq!(decisions1, decisions2);
    }

    #[test]
    fn exact_path_decision_shadows_glob_decision() {
        let dir = tempfile::tempdir().unwrap();
        let l = ledger(dir.path());
        l.add("*.env", DecisionKind::IgnorePermanently, "glob", 1.0, None, None, vec![])
            .unwrap();
        l.add(
            "app/.env",
            DecisionKind::ReviewLater,
            "exact",
            1.0,
            None,
            None,
            vec![],
        )
        .unwrap();

        let found = l.get_by_pattern("app/.env").unwrap().unwrap();
        assert_eq!(found.reason, "exact");
    }

    #[test]
    fn audit_trail_grows_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let l = ledger(dir.path());
        let before = l.load().unwrap().audit_trail.len();
        l.add("*.db", DecisionKind::Safe, "ok", 1.0, None, None, vec![])
            .unwrap();
        let after = l.load().unwrap().audit_trail.len();
        assert!(after > before);
    }
}
