use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Safe,
    IgnorePermanently,
    IgnoreTemporarily,
    AddToUserIgnore,
    AddToShadowIgnore,
    RemoveFile,
    EncryptFile,
    ReviewLater,
    Rename,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    DecisionAdded,
    Reviewed,
    Expired,
    Imported,
    Exported,
    ViolationBlocked,
    IgnoreDelta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDecision {
    pub id: String,
    pub pattern: String,
    pub decision: DecisionKind,
    pub reason: String,
    pub timestamp: String,
    pub user_id: String,
    pub confidence: f32,
    #[serde(default)]
    pub auto_review_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl UserDecision {
    /// A decision matches a risk iff the risk's path matches `pattern` under
    /// shell-style glob semantics (`fnmatch` equivalent).
    pub fn matches_path(&self, file_path: &str) -> bool {
        crate::ignore_monitor::glob_matches(&self.pattern, file_path)
    }

    pub fn is_exact_path(&self) -> bool {
        !self.pattern.contains(['*', '?', '[']) && self.pattern == self.pattern.trim_start_matches("**/")
    }

    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at
            .as_deref()
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map(|expiry| expiry.with_timezone(&chrono::Utc) < now)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub action: AuditAction,
    pub timestamp: String,
    pub user_id: String,
    pub details: serde_json::Value,
    pub tool_version: String,
    pub project_hash: String,
}

pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn project_hash(project_path: &std::path::Path) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(project_path.to_string_lossy().as_bytes());
    hex::encode(&digest[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_decision_matches_extension() {
        let decision = UserDecision {
            id: "1".into(),
            pattern: "*.log".into(),
            decision: DecisionKind::IgnorePermanently,
            reason: "noisy".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            user_id: "tester".into(),
            confidence: 0.9,
            auto_review_at: None,
            expires_at: None,
            tags: vec![],
        };
        assert!(decision.matches_path("app.log"));
        assert!(!decision.matches_path("app.txt"));
    }

    #[test]
    fn exact_path_is_detected() {
        let exact = UserDecision {
            id: "1".into(),
            pattern: "app/config.json".into(),
            decision: DecisionKind::Safe,
            reason: String::new(),
            timestamp: String::new(),
            user_id: String::new(),
            confidence: 1.0,
            auto_review_at: None,
            expires_at: None,
            tags: vec![],
        };
        assert!(exact.is_exact_path());
    }

    #[test]
    fn expiry_is_relative_to_now() {
        let past = chrono::Utc::now() - chrono::Duration::hours(1);
        let decision = UserDecision {
            id: "1".into(),
            pattern: "*.log".into(),
            decision: DecisionKind::IgnoreTemporarily,
            reason: String::new(),
            timestamp: String::new(),
            user_id: String::new(),
            confidence: 1.0,
            auto_review_at: None,
            expires_at: Some(past.to_rfc3339()),
            tags: vec![],
        };
        assert!(decision.is_expired(chrono::Utc::now()));
    }
}
