use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityRiskType {
    SecretFile,
    SensitiveConfig,
    LargeBinary,
    CredentialPattern,
    ApiKeyPattern,
    DatabaseFile,
    BackupFile,
    LogFile,
    TemporaryFile,
    IdeConfig,
    SystemFile,
}

impl SecurityRiskType {
    /// Baseline severity before the tracked/location upgrades in §4.5 of
    /// SPEC_FULL.md are applied.
    pub fn base_level(self) -> SecurityRiskLevel {
        use SecurityRiskLevel::*;
        use SecurityRiskType::*;
        match self {
            SecretFile | CredentialPattern | ApiKeyPattern => Critical,
            SensitiveConfig | DatabaseFile => High,
            LargeBinary | BackupFile => Medium,
            LogFile | TemporaryFile => Low,
            IdeConfig | SystemFile => Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityRiskLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl SecurityRiskLevel {
    /// Saturating one-step upgrade, used for both the tracked-by-VCS bump and the
    /// sensitive-path-keyword bump.
    pub fn upgrade(self) -> Self {
        match self {
            SecurityRiskLevel::Info => SecurityRiskLevel::Low,
            SecurityRiskLevel::Low => SecurityRiskLevel::Medium,
            SecurityRiskLevel::Medium => SecurityRiskLevel::High,
            SecurityRiskLevel::High => SecurityRiskLevel::Critical,
            SecurityRiskLevel::Critical => SecurityRiskLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRisk {
    pub file_path: String,
    pub pattern_matched: String,
    pub risk_type: SecurityRiskType,
    pub risk_level: SecurityRiskLevel,
    pub description: String,
    pub recommendation: String,
    pub file_size: u64,
    pub last_modified: Option<i64>,
    pub is_tracked_by_vcs: bool,
    #[serde(default)]
    pub user_decision: Option<String>,
    #[serde(default)]
    pub decision_timestamp: Option<String>,
    #[serde(default)]
    pub decision_reason: Option<String>,
}

impl SecurityRisk {
    /// `risk_level` is a pure function of `(risk_type, is_tracked_by_vcs, path)`,
    /// computed once at construction time per the data-model invariant.
    pub fn new(
        file_path: String,
        pattern_matched: String,
        risk_type: SecurityRiskType,
        is_tracked_by_vcs: bool,
        description: String,
        recommendation: String,
        file_size: u64,
        last_modified: Option<i64>,
    ) -> Self {
        let risk_level = determine_risk_level(risk_type, is_tracked_by_vcs, &file_path);
        Self {
            file_path,
            pattern_matched,
            risk_type,
            risk_level,
            description,
            recommendation,
            file_size,
            last_modified,
            is_tracked_by_vcs,
            user_decision: None,
            decision_timestamp: None,
            decision_reason: None,
        }
    }
}

const SENSITIVE_PATH_KEYWORDS: [&str; 4] = ["config", "secret", "credential", "auth"];

/// Severity upgrade rule from SPEC_FULL.md §4.5 step 4: tracked-by-VCS bumps one
/// step; a sensitive-path keyword bumps high/medium baselines one further step.
/// Both upgrades can stack.
pub fn determine_risk_level(
    risk_type: SecurityRiskType,
    is_tracked_by_vcs: bool,
    file_path: &str,
) -> SecurityRiskLevel {
    let mut level = risk_type.base_level();
    if is_tracked_by_vcs {
        level = level.upgrade();
    }
    let path_lower = file_path.to_lowercase();
    if matches!(level, SecurityRiskLevel::High | SecurityRiskLevel::Medium)
        && SENSITIVE_PATH_KEYWORDS.iter().any(|kw| path_lower.contains(kw))
    {
        level = level.upgrade();
    }
    level
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAssessment {
    pub project_path: String,
    pub timestamp: String,
    pub critical_risks: usize,
    pub high_risks: usize,
    pub medium_risks: usize,
    pub low_risks: usize,
    pub info_risks: usize,
    pub risks: Vec<SecurityRisk>,
    pub blocking_violations: Vec<SecurityRisk>,
    pub security_level: gitup_config::SecurityLevel,
    pub enforcement_active: bool,
}

impl SecurityAssessment {
    pub fn total_risks(&self) -> usize {
        self.risks.len()
    }
}
